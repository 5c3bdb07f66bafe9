//! Error types raised while converting a TriTrypDB gene file.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort the conversion of one input file.
///
/// None of these are recoverable: a file either converts completely or
/// produces no output at all.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// A field line was recognized but its value could not be parsed.
    #[error("malformed {field} field on line {line_number}: {line:?}")]
    MalformedField {
        field: &'static str,
        line_number: usize,
        line: String,
    },

    /// A record terminator (or a GO line) was reached without the fields
    /// needed to build a gene record.
    #[error("incomplete record {} ending on line {line_number}: missing {}", .gene_id.as_deref().unwrap_or("<no gene id>"), .missing.join(", "))]
    IncompleteRecord {
        line_number: usize,
        gene_id: Option<String>,
        missing: Vec<&'static str>,
    },

    /// The input could not be opened or read.
    #[error("could not read {}", .path.display())]
    UnreadableInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The input file name carries no species/version tokens.
    #[error("cannot derive species and version from file name {0:?}; expected TriTrypDB-<version>_<species>...")]
    UnrecognizedFileName(String),
}

impl ConvertError {
    pub(crate) fn malformed(field: &'static str, line_number: usize, line: &str) -> ConvertError {
        ConvertError::MalformedField {
            field,
            line_number,
            line: line.to_string(),
        }
    }
}
