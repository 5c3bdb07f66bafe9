use crate::error::ConvertError;
use crate::tritryp_utils::open_gene_file;
use lazy_static::lazy_static;
use nutype::nutype;
use regex::Regex;
use std::io::BufRead;
use std::path::Path;
use tracing::{debug, info, warn};

lazy_static! {
    // "<start> - <stop> (<strand>)", coordinates may carry thousands separators
    static ref LOCATION_RE: Regex =
        Regex::new(r"([0-9][0-9,]*) - ([0-9][0-9,]*) \(([-+])\)").unwrap();
}

const CHROMOSOME_NOT_ASSIGNED: &str = "Chromosome: Not Assigned";
const CDS_LENGTH_NULL: &str = "null";

#[nutype(derive(Debug, Clone, PartialEq, Eq, Display))]
/// The identifier of a gene record, e.g. `Tb427.01.100`.
pub struct GeneId(String);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
/// The strand a gene is annotated on.
pub enum Strand {
    Positive,
    Negative,
}

impl std::fmt::Display for Strand {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Strand::Positive => write!(f, "+"),
            Strand::Negative => write!(f, "-"),
        }
    }
}

impl std::str::FromStr for Strand {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Strand> {
        match s {
            "+" => Ok(Strand::Positive),
            "-" => Ok(Strand::Negative),
            _ => anyhow::bail!("Cannot parse {:?} as a strand.", s),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
/// One finalized gene block of a TriTrypDB gene information file.
///
/// Only genes that are assigned to a chromosome are ever emitted, so
/// `chromosome` is always present here.
///
/// # Fields
///
/// * `gene_id`: The gene identifier taken from the `Gene ID` line.
/// * `chromosome`: The chromosome number.
/// * `start`, `stop`: 1-based inclusive genomic coordinates.
/// * `strand`: The strand of the gene.
/// * `gene_type`: Free-text classification, e.g. `protein coding`.
/// * `transcript_length`: Transcript length in bases.
/// * `cds_length`: CDS length in bases; `None` for the `null` sentinel or when the record has no `CDS Length` line.
/// * `is_pseudo`: Whether the record is flagged as a pseudogene.
/// * `description`: The product description, possibly empty.
pub struct GeneRecord {
    pub gene_id: GeneId,
    pub chromosome: i64,
    pub start: i64,
    pub stop: i64,
    pub strand: Strand,
    pub gene_type: String,
    pub transcript_length: i64,
    pub cds_length: Option<i64>,
    pub is_pseudo: bool,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq)]
/// One GO term association, owned by the gene that was open when its line was read.
///
/// `transcript_length` is the transcript length seen for that gene before the
/// GO line, if any.
pub struct GoAnnotation {
    pub gene_id: GeneId,
    pub go_id: String,
    pub ontology: String,
    pub go_term_name: String,
    pub source: String,
    pub evidence_code: String,
    pub transcript_length: Option<i64>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
/// The kind of a line in a gene information file, decided by its prefix.
pub enum LineKind {
    GeneId,
    Chromosome,
    GenomicLocation,
    GeneType,
    ProductDescription,
    TranscriptLength,
    CdsLength,
    IsPseudo,
    GoTerm,
    Terminator,
}

/// Prefixes in the order they are tested; the first match wins.
const LINE_PREFIXES: [(&str, LineKind); 10] = [
    ("Gene ID", LineKind::GeneId),
    ("Chromosome", LineKind::Chromosome),
    ("Genomic Location", LineKind::GenomicLocation),
    ("Gene Type", LineKind::GeneType),
    ("Product Description", LineKind::ProductDescription),
    ("Transcript Length:", LineKind::TranscriptLength),
    ("CDS Length", LineKind::CdsLength),
    ("Is Pseudo:", LineKind::IsPseudo),
    ("GO:", LineKind::GoTerm),
    ("---", LineKind::Terminator),
];

impl LineKind {
    /// Classifies a line by its prefix. Returns `None` for lines that carry
    /// no field we extract; those are skipped by the parser.
    pub fn classify(line: &str) -> Option<LineKind> {
        LINE_PREFIXES
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix))
            .map(|(_, kind)| *kind)
    }

    /// The field name reported in diagnostics.
    pub fn field_name(&self) -> &'static str {
        match self {
            LineKind::GeneId => "gene_id",
            LineKind::Chromosome => "chromosome",
            LineKind::GenomicLocation => "genomic_location",
            LineKind::GeneType => "type",
            LineKind::ProductDescription => "description",
            LineKind::TranscriptLength => "transcript_length",
            LineKind::CdsLength => "cds_length",
            LineKind::IsPseudo => "pseudogene",
            LineKind::GoTerm => "go_term",
            LineKind::Terminator => "terminator",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ChromosomeField {
    Assigned(i64),
    NotAssigned,
}

/// The fields seen since the most recent `Gene ID` line. Every field is
/// tracked as present or absent, so nothing from a previous record can leak
/// into the next one.
#[derive(Debug)]
struct RecordBuilder {
    gene_id: GeneId,
    chromosome: Option<ChromosomeField>,
    location: Option<(i64, i64, Strand)>,
    gene_type: Option<String>,
    description: Option<String>,
    transcript_length: Option<i64>,
    cds_length: Option<i64>,
    is_pseudo: Option<bool>,
}

impl RecordBuilder {
    fn new(gene_id: GeneId) -> RecordBuilder {
        RecordBuilder {
            gene_id,
            chromosome: None,
            location: None,
            gene_type: None,
            description: None,
            transcript_length: None,
            cds_length: None,
            is_pseudo: None,
        }
    }

    fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.chromosome.is_none() {
            missing.push(LineKind::Chromosome.field_name());
        }
        if self.location.is_none() {
            missing.push(LineKind::GenomicLocation.field_name());
        }
        if self.gene_type.is_none() {
            missing.push(LineKind::GeneType.field_name());
        }
        if self.transcript_length.is_none() {
            missing.push(LineKind::TranscriptLength.field_name());
        }
        if self.description.is_none() {
            missing.push(LineKind::ProductDescription.field_name());
        }
        missing
    }

    /// Freezes the accumulated fields at a terminator. Returns `Ok(None)`
    /// for genes that are not assigned to a chromosome, regardless of their
    /// other fields.
    fn finish(self, line_number: usize) -> Result<Option<GeneRecord>, ConvertError> {
        if self.chromosome == Some(ChromosomeField::NotAssigned) {
            return Ok(None);
        }

        let missing = self.missing_fields();
        match self {
            RecordBuilder {
                gene_id,
                chromosome: Some(ChromosomeField::Assigned(chromosome)),
                location: Some((start, stop, strand)),
                gene_type: Some(gene_type),
                description: Some(description),
                transcript_length: Some(transcript_length),
                cds_length,
                is_pseudo,
            } => Ok(Some(GeneRecord {
                gene_id,
                chromosome,
                start,
                stop,
                strand,
                gene_type,
                transcript_length,
                cds_length,
                is_pseudo: is_pseudo.unwrap_or(false),
                description,
            })),
            RecordBuilder { gene_id, .. } => Err(ConvertError::IncompleteRecord {
                line_number,
                gene_id: Some(gene_id.into_inner()),
                missing,
            }),
        }
    }
}

#[derive(Debug)]
enum ParserState {
    AwaitingGeneId,
    Accumulating(RecordBuilder),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
/// Counters collected during one parse.
///
/// * `n_lines`: Number of lines read.
/// * `n_records`: Number of terminated records, emitted or not.
/// * `n_unassigned`: Records discarded because their chromosome is "Not Assigned".
/// * `n_skipped_lines`: Lines that matched no known prefix.
/// * `n_unterminated`: Records dropped because a new `Gene ID` or the end of the input came before their terminator.
pub struct ParseStats {
    pub n_lines: usize,
    pub n_records: usize,
    pub n_unassigned: usize,
    pub n_skipped_lines: usize,
    pub n_unterminated: usize,
}

/// The outcome of parsing one gene information file. Both vectors are in
/// the order the records and GO lines appear in the input.
#[derive(Clone, Debug)]
pub struct ParsedGeneFile {
    pub genes: Vec<GeneRecord>,
    pub go_annotations: Vec<GoAnnotation>,
    pub stats: ParseStats,
}

/// A single-pass line classifier over a gene information file.
///
/// Lines are fed one at a time with [RecordParser::push_line]; the parser
/// keeps the fields of the currently open record and emits a [GeneRecord]
/// at every `---` terminator. [RecordParser::finish] hands back everything
/// that was collected.
///
/// # Examples
///
/// ```rust
/// use tritrypdb::reader::RecordParser;
///
/// let mut parser = RecordParser::new();
/// parser.push_line(1, "Gene ID: Tb427.01.100")?;
/// parser.push_line(2, "Chromosome: Not Assigned")?;
/// parser.push_line(3, "---")?;
/// let parsed = parser.finish();
/// assert!(parsed.genes.is_empty());
/// # Ok::<(), tritrypdb::error::ConvertError>(())
/// ```
#[derive(Debug)]
pub struct RecordParser {
    state: ParserState,
    genes: Vec<GeneRecord>,
    go_annotations: Vec<GoAnnotation>,
    stats: ParseStats,
}

impl Default for RecordParser {
    fn default() -> RecordParser {
        RecordParser::new()
    }
}

impl RecordParser {
    /// Creates a parser that is waiting for the first `Gene ID` line.
    ///
    /// # Returns
    ///
    /// A `RecordParser` with no open record and zeroed [ParseStats].
    pub fn new() -> RecordParser {
        RecordParser {
            state: ParserState::AwaitingGeneId,
            genes: Vec::with_capacity(10_000),
            go_annotations: Vec::with_capacity(10_000),
            stats: ParseStats::default(),
        }
    }

    /// Feeds one line to the parser. `line_number` is 1-based and is only
    /// used for diagnostics. A trailing `\r` is ignored.
    ///
    /// # Errors
    ///
    /// * [ConvertError::MalformedField] if a recognized field cannot be parsed.
    /// * [ConvertError::IncompleteRecord] if a terminator closes a record that lacks
    ///   required fields, or if a terminator or GO line appears with no open record.
    pub fn push_line(&mut self, line_number: usize, line: &str) -> Result<(), ConvertError> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        self.stats.n_lines += 1;

        let kind = match LineKind::classify(line) {
            Some(kind) => kind,
            None => {
                self.stats.n_skipped_lines += 1;
                return Ok(());
            }
        };

        match kind {
            LineKind::GeneId => {
                let gene_id = parse_gene_id(line, line_number)?;
                debug!("Processing gene {}: {}", self.stats.n_records + 1, gene_id);
                let previous = std::mem::replace(
                    &mut self.state,
                    ParserState::Accumulating(RecordBuilder::new(gene_id)),
                );
                if let ParserState::Accumulating(dropped) = previous {
                    self.stats.n_unterminated += 1;
                    warn!(
                        "Gene {} has no terminator before line {}; it is discarded.",
                        dropped.gene_id,
                        line_number
                    );
                }
            }
            LineKind::Terminator => {
                let state = std::mem::replace(&mut self.state, ParserState::AwaitingGeneId);
                let builder = match state {
                    ParserState::Accumulating(builder) => builder,
                    ParserState::AwaitingGeneId => {
                        return Err(ConvertError::IncompleteRecord {
                            line_number,
                            gene_id: None,
                            missing: vec![LineKind::GeneId.field_name()],
                        })
                    }
                };
                self.stats.n_records += 1;
                match builder.finish(line_number)? {
                    Some(gene) => self.genes.push(gene),
                    None => self.stats.n_unassigned += 1,
                }
            }
            LineKind::GoTerm => {
                let builder = match &self.state {
                    ParserState::Accumulating(builder) => builder,
                    ParserState::AwaitingGeneId => {
                        return Err(ConvertError::IncompleteRecord {
                            line_number,
                            gene_id: None,
                            missing: vec![LineKind::GeneId.field_name()],
                        })
                    }
                };
                let annotation = parse_go_term(line, line_number, builder)?;
                self.go_annotations.push(annotation);
            }
            _ => match &mut self.state {
                ParserState::Accumulating(builder) => {
                    apply_field(builder, kind, line, line_number)?;
                }
                ParserState::AwaitingGeneId => {
                    debug!(
                        "Line {} holds a {} field outside of any gene record; skipped.",
                        line_number,
                        kind.field_name()
                    );
                    self.stats.n_skipped_lines += 1;
                }
            },
        }
        Ok(())
    }

    /// Ends the parse and returns the collected records.
    ///
    /// A record that is still open here never saw its `---` terminator. It is
    /// dropped without an error; TriTrypDB files end every record with a
    /// terminator, so this only happens with truncated input.
    pub fn finish(mut self) -> ParsedGeneFile {
        if let ParserState::Accumulating(builder) = self.state {
            self.stats.n_unterminated += 1;
            warn!(
                "The input ended before the terminator of gene {}; it is discarded.",
                builder.gene_id
            );
        }

        info!(
            "Finished parsing the input file. Found {} records, {} genes on assigned chromosomes and {} GO terms.",
            self.stats.n_records,
            self.genes.len(),
            self.go_annotations.len()
        );
        if self.stats.n_unassigned > 0 {
            info!(
                "{} records are not assigned to a chromosome and were left out of the gene tables.",
                self.stats.n_unassigned
            );
        }

        ParsedGeneFile {
            genes: self.genes,
            go_annotations: self.go_annotations,
            stats: self.stats,
        }
    }
}

impl ParsedGeneFile {
    /// Parses a TriTrypDB gene information file. Plain text and gzipped files
    /// are both accepted.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use tritrypdb::reader::ParsedGeneFile;
    ///
    /// let parsed = ParsedGeneFile::from_path("TriTrypDB-5.0_TbruceiLister427Gene.txt")?;
    /// println!("{} genes", parsed.genes.len());
    /// # Ok::<(), tritrypdb::error::ConvertError>(())
    /// ```
    pub fn from_path<T: AsRef<Path>>(file_path: T) -> Result<ParsedGeneFile, ConvertError> {
        let file_path = file_path.as_ref();
        let rdr = open_gene_file(file_path)?;
        ParsedGeneFile::_from_reader(rdr, file_path)
    }

    /// Parses gene information records from any buffered reader.
    pub fn from_reader<R: BufRead>(rdr: R) -> Result<ParsedGeneFile, ConvertError> {
        ParsedGeneFile::_from_reader(rdr, Path::new("<reader>"))
    }

    fn _from_reader<R: BufRead>(rdr: R, origin: &Path) -> Result<ParsedGeneFile, ConvertError> {
        let mut parser = RecordParser::new();
        for (idx, l) in rdr.lines().enumerate() {
            let line = l.map_err(|source| ConvertError::UnreadableInput {
                path: origin.to_path_buf(),
                source,
            })?;
            parser.push_line(idx + 1, &line)?;
        }
        Ok(parser.finish())
    }
}

impl std::str::FromStr for ParsedGeneFile {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<ParsedGeneFile, ConvertError> {
        ParsedGeneFile::from_reader(s.as_bytes())
    }
}

fn after_first<'a>(line: &'a str, sep: &str) -> Option<&'a str> {
    line.split_once(sep).map(|(_, v)| v.trim())
}

fn after_last<'a>(line: &'a str, sep: &str) -> Option<&'a str> {
    line.rsplit_once(sep).map(|(_, v)| v.trim())
}

fn parse_int(value: Option<&str>, kind: LineKind, line: &str, line_number: usize) -> Result<i64, ConvertError> {
    value
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or_else(|| ConvertError::malformed(kind.field_name(), line_number, line))
}

/// Like [parse_int], but zero and negative values are malformed too.
fn parse_positive(value: Option<&str>, kind: LineKind, line: &str, line_number: usize) -> Result<i64, ConvertError> {
    match parse_int(value, kind, line, line_number)? {
        n if n > 0 => Ok(n),
        _ => Err(ConvertError::malformed(kind.field_name(), line_number, line)),
    }
}

fn parse_gene_id(line: &str, line_number: usize) -> Result<GeneId, ConvertError> {
    match after_first(line, ": ") {
        Some(id) if !id.is_empty() => Ok(GeneId::new(id.to_string())),
        _ => Err(ConvertError::malformed(
            LineKind::GeneId.field_name(),
            line_number,
            line,
        )),
    }
}

fn parse_location(line: &str, line_number: usize) -> Result<(i64, i64, Strand), ConvertError> {
    let malformed = || ConvertError::malformed(LineKind::GenomicLocation.field_name(), line_number, line);
    let caps = LOCATION_RE.captures(line).ok_or_else(malformed)?;

    let coordinate = |i: usize| -> Result<i64, ConvertError> {
        caps[i].replace(',', "").parse::<i64>().map_err(|_| malformed())
    };
    let start = coordinate(1)?;
    let stop = coordinate(2)?;
    let strand = caps[3].parse::<Strand>().map_err(|_| malformed())?;
    Ok((start, stop, strand))
}

fn parse_go_term(
    line: &str,
    line_number: usize,
    builder: &RecordBuilder,
) -> Result<GoAnnotation, ConvertError> {
    let mut fields = line.split('\t');
    let mut next = || {
        fields
            .next()
            .map(|f| f.to_string())
            .ok_or_else(|| ConvertError::malformed(LineKind::GoTerm.field_name(), line_number, line))
    };
    Ok(GoAnnotation {
        gene_id: builder.gene_id.clone(),
        go_id: next()?,
        ontology: next()?,
        go_term_name: next()?,
        source: next()?,
        evidence_code: next()?,
        transcript_length: builder.transcript_length,
    })
}

/// Merges one field line into the open record.
fn apply_field(
    builder: &mut RecordBuilder,
    kind: LineKind,
    line: &str,
    line_number: usize,
) -> Result<(), ConvertError> {
    match kind {
        LineKind::Chromosome => {
            builder.chromosome = if line.starts_with(CHROMOSOME_NOT_ASSIGNED) {
                Some(ChromosomeField::NotAssigned)
            } else {
                let n = parse_positive(after_last(line, ":"), kind, line, line_number)?;
                Some(ChromosomeField::Assigned(n))
            };
        }
        LineKind::GenomicLocation => {
            builder.location = Some(parse_location(line, line_number)?);
        }
        LineKind::GeneType => {
            builder.gene_type = Some(after_first(line, ":").unwrap_or_default().to_string());
        }
        LineKind::ProductDescription => {
            builder.description = Some(after_first(line, ":").unwrap_or_default().to_string());
        }
        LineKind::TranscriptLength => {
            builder.transcript_length =
                Some(parse_positive(after_first(line, ":"), kind, line, line_number)?);
        }
        LineKind::CdsLength => {
            let value = after_first(line, ":");
            builder.cds_length = if value == Some(CDS_LENGTH_NULL) {
                None
            } else {
                Some(parse_int(value, kind, line, line_number)?)
            };
        }
        LineKind::IsPseudo => {
            builder.is_pseudo = Some(after_first(line, ":") == Some("Yes"));
        }
        // record boundaries are handled by RecordParser::push_line
        LineKind::GeneId | LineKind::GoTerm | LineKind::Terminator => {}
    }
    Ok(())
}
