use crate::options::{ConvertOptions, GeneColumns, GoColumns, OutputNaming, TableKind};
use crate::reader::{GeneRecord, GoAnnotation, ParseStats, ParsedGeneFile};
use crate::tritryp_utils::{file_name_of, LENGTH_FIELDS};
use anyhow::Context;
use polars::prelude::*;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Timestamp layout of the `Generated from` preamble line.
pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

// temporary tie-breaker used while sorting the gene table
const ENCOUNTER_ORDER: &str = "encounter_order";

/// Column-wise storage of the gene records, in input order.
struct GeneTableColumns {
    gene_id: Vec<String>,
    chromosome: Vec<i64>,
    start: Vec<i64>,
    stop: Vec<i64>,
    strand: Vec<String>,
    gene_type: Vec<String>,
    transcript_length: Vec<i64>,
    cds_length: Vec<Option<i64>>,
    pseudogene: Vec<i32>,
    description: Vec<String>,
}

impl GeneTableColumns {
    fn with_capacity(n: usize) -> GeneTableColumns {
        GeneTableColumns {
            gene_id: Vec::with_capacity(n),
            chromosome: Vec::with_capacity(n),
            start: Vec::with_capacity(n),
            stop: Vec::with_capacity(n),
            strand: Vec::with_capacity(n),
            gene_type: Vec::with_capacity(n),
            transcript_length: Vec::with_capacity(n),
            cds_length: Vec::with_capacity(n),
            pseudogene: Vec::with_capacity(n),
            description: Vec::with_capacity(n),
        }
    }

    fn push(&mut self, gene: GeneRecord) {
        self.gene_id.push(gene.gene_id.into_inner());
        self.chromosome.push(gene.chromosome);
        self.start.push(gene.start);
        self.stop.push(gene.stop);
        self.strand.push(gene.strand.to_string());
        self.gene_type.push(gene.gene_type);
        self.transcript_length.push(gene.transcript_length);
        self.cds_length.push(gene.cds_length);
        self.pseudogene.push(i32::from(gene.is_pseudo));
        self.description.push(gene.description);
    }
}

/// Column-wise storage of the GO annotations, in input order.
struct GoTableColumns {
    gene_id: Vec<String>,
    transcript_length: Vec<Option<i64>>,
    go_id: Vec<String>,
    ontology: Vec<String>,
    go_term_name: Vec<String>,
    source: Vec<String>,
    evidence_code: Vec<String>,
}

impl GoTableColumns {
    fn with_capacity(n: usize) -> GoTableColumns {
        GoTableColumns {
            gene_id: Vec::with_capacity(n),
            transcript_length: Vec::with_capacity(n),
            go_id: Vec::with_capacity(n),
            ontology: Vec::with_capacity(n),
            go_term_name: Vec::with_capacity(n),
            source: Vec::with_capacity(n),
            evidence_code: Vec::with_capacity(n),
        }
    }

    fn push(&mut self, go: GoAnnotation) {
        self.gene_id.push(go.gene_id.into_inner());
        self.transcript_length.push(go.transcript_length);
        self.go_id.push(go.go_id);
        self.ontology.push(go.ontology);
        self.go_term_name.push(go.go_term_name);
        self.source.push(go.source);
        self.evidence_code.push(go.evidence_code);
    }
}

/// The gene, gene length and GO term tables of one gene information file.
///
/// The gene table is ordered by `(chromosome, start)` unless
/// [ConvertOptions::sort_genes] is `false`; ties keep the input order. The gene
/// length and GO term tables are always in input order.
///
/// # Examples
///
/// ```rust
/// use tritrypdb::options::ConvertOptions;
/// use tritrypdb::reader::ParsedGeneFile;
/// use tritrypdb::tables::AnnotationTables;
///
/// let parsed: ParsedGeneFile = "Gene ID: a\nChromosome: Not Assigned\n---\n".parse()?;
/// let tables = AnnotationTables::from_parsed(parsed, &ConvertOptions::default())?;
/// assert_eq!(tables.genes().height(), 0);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub struct AnnotationTables {
    genes: DataFrame,
    gene_lengths: DataFrame,
    go_terms: DataFrame,
}

impl AnnotationTables {
    /// Lays out parsed records as Polars data frames according to `options`.
    pub fn from_parsed(
        parsed: ParsedGeneFile,
        options: &ConvertOptions,
    ) -> anyhow::Result<AnnotationTables> {
        let ParsedGeneFile {
            genes,
            go_annotations,
            stats: _,
        } = parsed;

        let mut gene_cols = GeneTableColumns::with_capacity(genes.len());
        genes.into_iter().for_each(|g| gene_cols.push(g));
        let mut go_cols = GoTableColumns::with_capacity(go_annotations.len());
        go_annotations.into_iter().for_each(|g| go_cols.push(g));

        // the length table shares the id and length columns of the gene table
        // before any sorting
        let gene_lengths = DataFrame::new(vec![
            Series::new(LENGTH_FIELDS[0], &gene_cols.gene_id),
            Series::new(LENGTH_FIELDS[1], &gene_cols.transcript_length),
        ])?;

        let mut genes = gene_table(gene_cols, options.gene_columns)?;
        if options.sort_genes {
            genes = sort_by_location(&genes)?;
        }

        let go_terms = go_table(go_cols, options.go_columns)?;

        Ok(AnnotationTables {
            genes,
            gene_lengths,
            go_terms,
        })
    }

    /// The gene table, one row per gene assigned to a chromosome.
    pub fn genes(&self) -> &DataFrame {
        &self.genes
    }

    /// The gene length table, with `gene_id` and `transcript_length` in input order.
    pub fn gene_lengths(&self) -> &DataFrame {
        &self.gene_lengths
    }

    /// The GO term table, one row per GO line in the input.
    pub fn go_terms(&self) -> &DataFrame {
        &self.go_terms
    }

    /// All three tables, tagged with their kind, in the order they are written.
    pub fn tables(&self) -> [(TableKind, &DataFrame); 3] {
        [
            (TableKind::Genes, &self.genes),
            (TableKind::GeneLengths, &self.gene_lengths),
            (TableKind::GoTerms, &self.go_terms),
        ]
    }
}

fn gene_table(cols: GeneTableColumns, layout: GeneColumns) -> anyhow::Result<DataFrame> {
    let mut df_vec = vec![
        Series::new("gene_id", cols.gene_id),
        Series::new("chromosome", cols.chromosome),
        Series::new("start", cols.start),
        Series::new("stop", cols.stop),
        Series::new("strand", cols.strand),
        Series::new("type", cols.gene_type),
        Series::new("transcript_length", cols.transcript_length),
    ];
    if layout.is_extended() {
        df_vec.push(Series::new("cds_length", cols.cds_length));
        df_vec.push(Series::new("pseudogene", cols.pseudogene));
    }
    df_vec.push(Series::new("description", cols.description));

    let df = DataFrame::new(df_vec)?;
    debug_assert_eq!(df.get_column_names(), layout.header());
    Ok(df)
}

fn go_table(cols: GoTableColumns, layout: GoColumns) -> anyhow::Result<DataFrame> {
    let mut df_vec = Vec::with_capacity(7);
    df_vec.push(Series::new("gene_id", cols.gene_id));
    if layout == GoColumns::WithTranscriptLength {
        df_vec.push(Series::new("transcript_length", cols.transcript_length));
    }
    df_vec.extend([
        Series::new("go_id", cols.go_id),
        Series::new("ontology", cols.ontology),
        Series::new("go_term_name", cols.go_term_name),
        Series::new("source", cols.source),
        Series::new("evidence_code", cols.evidence_code),
    ]);

    let df = DataFrame::new(df_vec)?;
    debug_assert_eq!(df.get_column_names(), layout.header());
    Ok(df)
}

/// Orders the gene table by `(chromosome, start)` ascending. Rows that tie keep
/// their input order, enforced through a temporary row index column.
fn sort_by_location(df: &DataFrame) -> anyhow::Result<DataFrame> {
    let mut df = df.clone();
    let order: Vec<u32> = (0..df.height() as u32).collect();
    df.with_column(Series::new(ENCOUNTER_ORDER, order))?;

    let sorted = df
        .sort(
            &["chromosome", "start", ENCOUNTER_ORDER],
            vec![false, false, false],
            true,
        )
        .with_context(|| "Could not sort the gene table by chromosome and start.")?;
    Ok(sorted.drop(ENCOUNTER_ORDER)?)
}

/// The four comment lines at the top of every output table:
///
/// ```text
/// #
/// # TriTrypDB <title>: <species>
/// # Generated from <source file> on <timestamp>
/// #
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TablePreamble {
    pub title: String,
    pub species: String,
    pub source_name: String,
    pub generated_on: String,
}

impl TablePreamble {
    /// Creates a preamble stamped with the current local time.
    pub fn new<T: ToString>(title: T, species: T, source_name: T) -> TablePreamble {
        TablePreamble {
            title: title.to_string(),
            species: species.to_string(),
            source_name: source_name.to_string(),
            generated_on: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writeln!(writer, "#")?;
        writeln!(writer, "# TriTrypDB {}: {}", self.title, self.species)?;
        writeln!(
            writer,
            "# Generated from {} on {}",
            self.source_name, self.generated_on
        )?;
        writeln!(writer, "#")
    }
}

/// Writes one table as a tab-delimited file: the preamble, a header row, then
/// one row per record. Missing values are written as empty fields.
pub fn write_table<T: AsRef<Path>>(
    df: &DataFrame,
    file_path: T,
    preamble: &TablePreamble,
) -> anyhow::Result<()> {
    let file_path = file_path.as_ref();
    let file = fs::File::create(file_path)
        .with_context(|| format!("Could not create the output file {:?}", file_path))?;
    let mut file = BufWriter::with_capacity(4194304, file);

    preamble.write(&mut file)?;

    let mut out_df = df.clone();
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b'\t')
        .with_null_value(String::new())
        .finish(&mut out_df)
        .with_context(|| format!("Could not write the table to {:?}", file_path))?;
    file.flush()?;

    Ok(())
}

/// Writes all three tables into `output_dir`, named after `naming`.
///
/// Every table is first written to a hidden temporary file next to its final
/// path; the temporary files are renamed into place only after all three were
/// written. If a rename fails, the tables already moved into place are removed
/// again, so a failed run leaves no partial tables behind. Tables they replaced
/// from an earlier run are gone at that point. The output directory is created
/// if needed.
///
/// Returns the paths of the written tables.
pub fn write_tables<T: AsRef<Path>>(
    tables: &AnnotationTables,
    output_dir: T,
    naming: &OutputNaming,
    source_name: &str,
) -> anyhow::Result<Vec<PathBuf>> {
    let output_dir = output_dir.as_ref();
    fs::create_dir_all(output_dir).with_context(|| {
        format!(
            "Could not create the output directory {:?}",
            output_dir.as_os_str()
        )
    })?;

    let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(3);
    for (kind, df) in tables.tables() {
        let final_path = naming.table_path(output_dir, kind);
        let tmp_path = temporary_path(&final_path);
        let preamble = TablePreamble::new(kind.title(), naming.species.as_str(), source_name);

        let written = write_table(df, &tmp_path, &preamble);
        staged.push((tmp_path, final_path));
        if let Err(e) = written {
            discard_staged(&staged);
            return Err(e);
        }
        debug!("Staged the {} table ({} rows).", kind, df.height());
    }

    for (idx, (tmp_path, final_path)) in staged.iter().enumerate() {
        if let Err(e) = fs::rename(tmp_path, final_path) {
            discard_staged(&staged);
            discard_moved(&staged[..idx]);
            return Err(e).with_context(|| format!("Could not move the output into {:?}", final_path));
        }
        info!("Wrote {:?}", final_path);
    }

    Ok(staged.into_iter().map(|(_, final_path)| final_path).collect())
}

/// What one conversion produced.
#[derive(Clone, Debug)]
pub struct ConvertSummary {
    pub stats: ParseStats,
    pub n_genes: usize,
    pub n_go_terms: usize,
    pub written: Vec<PathBuf>,
}

/// Converts one gene information file into its three tables.
///
/// The whole input is parsed before anything is written, so a malformed input
/// produces no output files.
pub fn convert_gene_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output_dir: Q,
    naming: &OutputNaming,
    options: &ConvertOptions,
) -> anyhow::Result<ConvertSummary> {
    let input = input.as_ref();
    info!("Parsing {:?}", input);
    let parsed = ParsedGeneFile::from_path(input)
        .with_context(|| format!("Failed to parse the gene file {:?}", input))?;
    let stats = parsed.stats;

    let tables = AnnotationTables::from_parsed(parsed, options)?;
    let written = write_tables(&tables, output_dir, naming, &file_name_of(input))?;

    Ok(ConvertSummary {
        stats,
        n_genes: tables.genes().height(),
        n_go_terms: tables.go_terms().height(),
        written,
    })
}

fn temporary_path(final_path: &Path) -> PathBuf {
    let name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    final_path.with_file_name(format!(".{}.tmp", name))
}

fn discard_staged(staged: &[(PathBuf, PathBuf)]) {
    for (tmp_path, _) in staged {
        if tmp_path.exists() {
            if let Err(e) = fs::remove_file(tmp_path) {
                warn!("Could not remove the temporary file {:?}: {}", tmp_path, e);
            }
        }
    }
}

fn discard_moved(moved: &[(PathBuf, PathBuf)]) {
    for (_, final_path) in moved {
        if let Err(e) = fs::remove_file(final_path) {
            warn!("Could not remove the partial output {:?}: {}", final_path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENE_FILE: &str = "Gene ID: g3
Chromosome: 2
Genomic Location: 500 - 900 (-)
Gene Type: protein coding
Product Description: third
Transcript Length: 401
CDS Length: null
Is Pseudo: Yes
GO:0000001\tbiological_process\tp1\tcurated\tIEA
---
Gene ID: g1
Chromosome: 1
Genomic Location: 1,000 - 2,000 (+)
Gene Type: protein coding
Product Description: first
Transcript Length: 1001
CDS Length: 900
Is Pseudo: No
GO:0000002\tmolecular_function\tf1\tcurated\tIEA
GO:0000003\tmolecular_function\tf2\tcurated\tISS
---
Gene ID: g0
Chromosome: Not Assigned
GO:0000004\tcellular_component\tc1\tcomputed\tIEA
---
Gene ID: g2
Chromosome: 1
Genomic Location: 1,000 - 1,500 (+)
Gene Type: ncRNA
Product Description: second
Transcript Length: 501
---
";

    fn str_column(df: &DataFrame, name: &str) -> Vec<String> {
        df.column(name)
            .unwrap()
            .str()
            .unwrap()
            .into_no_null_iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn i64_column(df: &DataFrame, name: &str) -> Vec<Option<i64>> {
        df.column(name).unwrap().i64().unwrap().into_iter().collect()
    }

    #[test]
    fn test_sorted_gene_table() {
        let parsed: ParsedGeneFile = GENE_FILE.parse().unwrap();
        let tables = AnnotationTables::from_parsed(parsed, &ConvertOptions::default()).unwrap();

        let genes = tables.genes();
        assert_eq!(genes.get_column_names(), GeneColumns::Standard.header());
        // g1 and g2 tie on (1, 1000) and keep their input order
        assert_eq!(str_column(genes, "gene_id"), vec!["g1", "g2", "g3"]);
        assert_eq!(i64_column(genes, "start"), vec![Some(1000), Some(1000), Some(500)]);
        assert_eq!(str_column(genes, "strand"), vec!["+", "+", "-"]);

        // lengths keep the input order and skip the unassigned gene
        let lengths = tables.gene_lengths();
        assert_eq!(str_column(lengths, "gene_id"), vec!["g3", "g1", "g2"]);
        assert_eq!(
            i64_column(lengths, "transcript_length"),
            vec![Some(401), Some(1001), Some(501)]
        );

        // GO rows keep the input order, including the unassigned gene
        let go = tables.go_terms();
        assert_eq!(go.get_column_names(), GoColumns::Standard.header());
        assert_eq!(str_column(go, "gene_id"), vec!["g3", "g1", "g1", "g0"]);
        assert_eq!(
            str_column(go, "go_id"),
            vec!["GO:0000001", "GO:0000002", "GO:0000003", "GO:0000004"]
        );
    }

    #[test]
    fn test_unsorted_extended_layouts() {
        let parsed: ParsedGeneFile = GENE_FILE.parse().unwrap();
        let options = ConvertOptions::new(GeneColumns::Extended, GoColumns::WithTranscriptLength, false);
        let tables = AnnotationTables::from_parsed(parsed, &options).unwrap();

        let genes = tables.genes();
        assert_eq!(genes.get_column_names(), GeneColumns::Extended.header());
        assert_eq!(str_column(genes, "gene_id"), vec!["g3", "g1", "g2"]);
        assert_eq!(i64_column(genes, "cds_length"), vec![None, Some(900), None]);
        let pseudo: Vec<Option<i32>> = genes
            .column("pseudogene")
            .unwrap()
            .i32()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(pseudo, vec![Some(1), Some(0), Some(0)]);

        let go = tables.go_terms();
        assert_eq!(go.get_column_names(), GoColumns::WithTranscriptLength.header());
        assert_eq!(
            i64_column(go, "transcript_length"),
            vec![Some(401), Some(1001), Some(1001), None]
        );
    }

    #[test]
    fn test_write_table() {
        let parsed: ParsedGeneFile = GENE_FILE.parse().unwrap();
        let tables = AnnotationTables::from_parsed(parsed, &ConvertOptions::default()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lengths.csv");
        let preamble = TablePreamble {
            title: String::from("gene lengths"),
            species: String::from("Tb427"),
            source_name: String::from("TriTrypDB-5.0_Tb427Gene.txt"),
            generated_on: String::from("2026/10/19 08:30:00"),
        };
        write_table(tables.gene_lengths(), &path, &preamble).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            "#\n\
             # TriTrypDB gene lengths: Tb427\n\
             # Generated from TriTrypDB-5.0_Tb427Gene.txt on 2026/10/19 08:30:00\n\
             #\n\
             gene_id\ttranscript_length\n\
             g3\t401\n\
             g1\t1001\n\
             g2\t501\n"
        );
    }

    #[test]
    fn test_write_tables_names_and_cleans_up() {
        let parsed: ParsedGeneFile = GENE_FILE.parse().unwrap();
        let tables = AnnotationTables::from_parsed(parsed, &ConvertOptions::default()).unwrap();
        let naming = OutputNaming::new("Tb427", "5.0");

        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("nested").join("out");
        let written = write_tables(&tables, &out_dir, &naming, "input.txt").unwrap();

        assert_eq!(
            written,
            vec![
                out_dir.join("Tb427_5.0_genes.csv"),
                out_dir.join("Tb427_5.0_gene_lengths.csv"),
                out_dir.join("Tb427_5.0_go_terms.csv"),
            ]
        );
        let mut entries: Vec<String> = fs::read_dir(&out_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        entries.sort();
        // no temporary files are left behind
        assert_eq!(
            entries,
            vec![
                "Tb427_5.0_gene_lengths.csv",
                "Tb427_5.0_genes.csv",
                "Tb427_5.0_go_terms.csv"
            ]
        );

        let genes = fs::read_to_string(&written[0]).unwrap();
        let lines: Vec<&str> = genes.lines().collect();
        assert_eq!(lines[1], "# TriTrypDB gene list: Tb427");
        assert!(lines[2].starts_with("# Generated from input.txt on "));
        assert_eq!(
            lines[4],
            "gene_id\tchromosome\tstart\tstop\tstrand\ttype\ttranscript_length\tdescription"
        );
        assert_eq!(lines[5], "g1\t1\t1000\t2000\t+\tprotein coding\t1001\tfirst");
        assert_eq!(lines.len(), 8);
    }

    #[test]
    fn test_write_tables_rolls_back_on_rename_failure() {
        let parsed: ParsedGeneFile = GENE_FILE.parse().unwrap();
        let tables = AnnotationTables::from_parsed(parsed, &ConvertOptions::default()).unwrap();
        let naming = OutputNaming::new("Tb427", "5.0");

        // a non-empty directory at the last table's path makes its rename fail
        let dir = tempfile::tempdir().unwrap();
        let blocker = naming.table_path(dir.path(), TableKind::GoTerms);
        fs::create_dir_all(&blocker).unwrap();
        fs::write(blocker.join("keep"), "x").unwrap();

        assert!(write_tables(&tables, dir.path(), &naming, "input.txt").is_err());

        let entries: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries, vec!["Tb427_5.0_go_terms.csv"]);
        assert!(blocker.join("keep").exists());
    }

    #[test]
    fn test_temporary_path() {
        assert_eq!(
            temporary_path(Path::new("/out/a_genes.csv")),
            PathBuf::from("/out/.a_genes.csv.tmp")
        );
    }
}
