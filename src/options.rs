use crate::error::ConvertError;
use crate::tritryp_utils::{
    file_name_of, EXTENDED_GENE_FIELDS, GENE_FIELDS, GO_FIELDS, GO_FIELDS_WITH_LENGTH,
};
use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};

lazy_static! {
    static ref FILE_NAME_RE: Regex =
        Regex::new(r"^TriTrypDB-(?P<version>\d+\.\d+)_(?P<species>\w+)").unwrap();
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
/// The column layout of the gene table.
///
/// * `Standard` - gene_id, chromosome, start, stop, strand, type, transcript_length, description.
/// * `Extended` - the standard columns plus cds_length and pseudogene, placed before description.
pub enum GeneColumns {
    #[default]
    Standard,
    Extended,
}

impl GeneColumns {
    /// Creates a `GeneColumns` layout from a boolean flag.
    ///
    /// # Arguments
    ///
    /// * `is_extended`: Whether the cds_length and pseudogene columns should be written.
    ///
    /// # Returns
    ///
    /// `Extended` if `is_extended` is `true`, otherwise `Standard`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use tritrypdb::options::GeneColumns;
    ///
    /// assert_eq!(GeneColumns::from(true), GeneColumns::Extended);
    /// assert_eq!(GeneColumns::from(false), GeneColumns::Standard);
    /// ```
    pub fn from(is_extended: bool) -> GeneColumns {
        if is_extended {
            GeneColumns::Extended
        } else {
            GeneColumns::Standard
        }
    }

    /// Returns `true` for the `Extended` layout.
    pub fn is_extended(&self) -> bool {
        matches!(self, GeneColumns::Extended)
    }

    /// The header row for this layout.
    pub fn header(&self) -> &[&str] {
        match self {
            GeneColumns::Standard => GENE_FIELDS.as_ref(),
            GeneColumns::Extended => EXTENDED_GENE_FIELDS.as_ref(),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
/// The column layout of the GO term table. `WithTranscriptLength` adds the
/// transcript length of the owning gene right after gene_id.
pub enum GoColumns {
    #[default]
    Standard,
    WithTranscriptLength,
}

impl GoColumns {
    /// Creates a `GoColumns` layout from a boolean flag: `WithTranscriptLength`
    /// if `with_length` is `true`, otherwise `Standard`.
    pub fn from(with_length: bool) -> GoColumns {
        if with_length {
            GoColumns::WithTranscriptLength
        } else {
            GoColumns::Standard
        }
    }

    /// The header row for this layout.
    pub fn header(&self) -> &[&str] {
        match self {
            GoColumns::Standard => GO_FIELDS.as_ref(),
            GoColumns::WithTranscriptLength => GO_FIELDS_WITH_LENGTH.as_ref(),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
/// Options controlling how parsed records are laid out as tables.
///
/// # Fields
///
/// * `gene_columns`: The layout of the gene table.
/// * `go_columns`: The layout of the GO term table.
/// * `sort_genes`: If `true`, the gene table is ordered by `(chromosome, start)`,
///   keeping the input order for ties. If `false`, it keeps the input order.
///
/// The gene length and GO term tables always keep the input order.
pub struct ConvertOptions {
    pub gene_columns: GeneColumns,
    pub go_columns: GoColumns,
    pub sort_genes: bool,
}

impl Default for ConvertOptions {
    fn default() -> ConvertOptions {
        ConvertOptions {
            gene_columns: GeneColumns::Standard,
            go_columns: GoColumns::Standard,
            sort_genes: true,
        }
    }
}

impl ConvertOptions {
    /// Creates a `ConvertOptions` instance.
    ///
    /// # Arguments
    ///
    /// * `gene_columns`: The layout of the gene table.
    /// * `go_columns`: The layout of the GO term table.
    /// * `sort_genes`: Whether the gene table is ordered by `(chromosome, start)`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use tritrypdb::options::{ConvertOptions, GeneColumns, GoColumns};
    ///
    /// let options = ConvertOptions::new(GeneColumns::Extended, GoColumns::Standard, false);
    /// assert!(options.gene_columns.is_extended());
    /// assert!(!options.sort_genes);
    /// ```
    pub fn new(gene_columns: GeneColumns, go_columns: GoColumns, sort_genes: bool) -> ConvertOptions {
        ConvertOptions {
            gene_columns,
            go_columns,
            sort_genes,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// The three tables written for every input file.
pub enum TableKind {
    Genes,
    GeneLengths,
    GoTerms,
}

impl TableKind {
    /// The file name suffix of the table.
    pub fn suffix(&self) -> &'static str {
        match self {
            TableKind::Genes => "genes",
            TableKind::GeneLengths => "gene_lengths",
            TableKind::GoTerms => "go_terms",
        }
    }

    /// The descriptive title written to the table preamble.
    pub fn title(&self) -> &'static str {
        match self {
            TableKind::Genes => "gene list",
            TableKind::GeneLengths => "gene lengths",
            TableKind::GoTerms => "GO terms",
        }
    }
}

impl std::fmt::Display for TableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.suffix())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// The species and release tokens used to name output files.
///
/// TriTrypDB names its gene files `TriTrypDB-<version>_<species>Gene.txt`, e.g.
/// `TriTrypDB-4.2_TcruziEsmeraldo-LikeGene.txt`, which yields species
/// `TcruziEsmeraldo` and version `4.2`.
///
/// ```rust
/// use tritrypdb::options::{OutputNaming, TableKind};
///
/// let naming = OutputNaming::from_input_path("data/TriTrypDB-4.2_TcruziEsmeraldo-LikeGene.txt")?;
/// assert_eq!(naming.species, "TcruziEsmeraldo");
/// assert_eq!(
///     naming.table_path("out", TableKind::GoTerms),
///     std::path::PathBuf::from("out/TcruziEsmeraldo_4.2_go_terms.csv")
/// );
/// # Ok::<(), tritrypdb::error::ConvertError>(())
/// ```
pub struct OutputNaming {
    pub species: String,
    pub version: String,
}

impl OutputNaming {
    pub fn new<T: ToString>(species: T, version: T) -> OutputNaming {
        OutputNaming {
            species: species.to_string(),
            version: version.to_string(),
        }
    }

    /// Derives the naming tokens from the base name of the input file.
    ///
    /// # Errors
    ///
    /// [ConvertError::UnrecognizedFileName] if the base name does not follow the
    /// TriTrypDB naming pattern.
    pub fn from_input_path<T: AsRef<Path>>(input: T) -> Result<OutputNaming, ConvertError> {
        let name = file_name_of(input);
        let caps = FILE_NAME_RE
            .captures(&name)
            .ok_or_else(|| ConvertError::UnrecognizedFileName(name.clone()))?;
        Ok(OutputNaming::new(&caps["species"], &caps["version"]))
    }

    /// Like [OutputNaming::from_input_path], but explicit tokens take precedence
    /// and the file name only needs to match when one of them is missing.
    pub fn resolve<T: AsRef<Path>>(
        input: T,
        species: Option<&str>,
        version: Option<&str>,
    ) -> Result<OutputNaming, ConvertError> {
        match (species, version) {
            (Some(s), Some(v)) => Ok(OutputNaming::new(s, v)),
            _ => {
                let derived = OutputNaming::from_input_path(input)?;
                Ok(OutputNaming {
                    species: species.map(str::to_string).unwrap_or(derived.species),
                    version: version.map(str::to_string).unwrap_or(derived.version),
                })
            }
        }
    }

    /// `<dir>/<species>_<version>_<table>.csv`
    pub fn table_path<T: AsRef<Path>>(&self, output_dir: T, table: TableKind) -> PathBuf {
        output_dir.as_ref().join(format!(
            "{}_{}_{}.csv",
            self.species,
            self.version,
            table.suffix()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_naming_from_input_path() {
        let naming =
            OutputNaming::from_input_path("/data/TriTrypDB-5.0_TbruceiLister427Gene.txt").unwrap();
        assert_eq!(naming, OutputNaming::new("TbruceiLister427Gene", "5.0"));

        let naming = OutputNaming::from_input_path("TriTrypDB-4.2_TcruziEsmeraldo-LikeGene.txt").unwrap();
        assert_eq!(naming, OutputNaming::new("TcruziEsmeraldo", "4.2"));

        let naming = OutputNaming::from_input_path("TriTrypDB-68_x.txt");
        assert!(matches!(naming, Err(ConvertError::UnrecognizedFileName(_))));
    }

    #[test]
    fn test_naming_resolve() {
        let naming = OutputNaming::resolve("genes.txt", Some("Tbrucei"), Some("9.0")).unwrap();
        assert_eq!(naming, OutputNaming::new("Tbrucei", "9.0"));

        let naming =
            OutputNaming::resolve("TriTrypDB-4.2_TcruziEsmeraldo-LikeGene.txt", Some("Tcruzi"), None)
                .unwrap();
        assert_eq!(naming, OutputNaming::new("Tcruzi", "4.2"));

        assert!(OutputNaming::resolve("genes.txt", None, Some("9.0")).is_err());
    }

    #[test]
    fn test_table_path() {
        let naming = OutputNaming::new("LmajorFriedlin", "5.0");
        assert_eq!(
            naming.table_path("/tmp/out", TableKind::GeneLengths),
            PathBuf::from("/tmp/out/LmajorFriedlin_5.0_gene_lengths.csv")
        );
    }

    #[test]
    fn test_layout_headers() {
        assert_eq!(GeneColumns::default().header().len(), 8);
        assert_eq!(GeneColumns::from(true).header()[7], "cds_length");
        assert_eq!(GoColumns::from(true).header()[1], "transcript_length");
        let options = ConvertOptions::default();
        assert!(options.sort_genes);
        assert!(!options.gene_columns.is_extended());
    }
}
