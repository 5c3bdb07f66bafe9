use crate::error::ConvertError;
use flate2::bufread::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::info;

/// Type alias for a line reader over a TriTrypDB gene file. It is used to
/// allow reading from either a compressed or uncompressed file.
pub type GeneFileReader = Box<dyn BufRead>;

pub(crate) const GENE_FIELDS: [&str; 8] = [
    "gene_id",
    "chromosome",
    "start",
    "stop",
    "strand",
    "type",
    "transcript_length",
    "description",
];

pub(crate) const EXTENDED_GENE_FIELDS: [&str; 10] = [
    "gene_id",
    "chromosome",
    "start",
    "stop",
    "strand",
    "type",
    "transcript_length",
    "cds_length",
    "pseudogene",
    "description",
];

pub(crate) const LENGTH_FIELDS: [&str; 2] = ["gene_id", "transcript_length"];

pub(crate) const GO_FIELDS: [&str; 6] = [
    "gene_id",
    "go_id",
    "ontology",
    "go_term_name",
    "source",
    "evidence_code",
];

pub(crate) const GO_FIELDS_WITH_LENGTH: [&str; 7] = [
    "gene_id",
    "transcript_length",
    "go_id",
    "ontology",
    "go_term_name",
    "source",
    "evidence_code",
];

/// Tests if the stream underlying the [BufReader] `reader` is gzipped or not by examining the
/// first 2 bytes for the magic header. This function *requires*, but does not check, that
/// none of the stream has yet been consumed. It fills the buffer to examine the first two
/// bytes, but does not consume them.
///
/// Returns [Ok]`(true)` for a gzipped stream, [Ok]`(false)` otherwise, and the relevant
/// [std::io::Error] if the first bytes could not be read.
pub fn is_gzipped<T: BufRead>(reader: &mut T) -> std::io::Result<bool> {
    const GZIP_MAGIC_NUMBER: [u8; 2] = [0x1f, 0x8b];

    let src = reader.fill_buf()?;
    Ok(src.get(..2) == Some(&GZIP_MAGIC_NUMBER))
}

/// Opens a gene information file for line-by-line reading. Gzip compressed input is
/// detected from its magic bytes and decompressed on the fly.
///
/// Any failure to open or peek into the file is reported as
/// [ConvertError::UnreadableInput].
pub fn open_gene_file<T: AsRef<Path>>(file_path: T) -> Result<GeneFileReader, ConvertError> {
    let file_path = file_path.as_ref();
    let unreadable = |source| ConvertError::UnreadableInput {
        path: file_path.to_path_buf(),
        source,
    };

    let file = File::open(file_path).map_err(unreadable)?;
    let mut inner_rdr = BufReader::new(file);
    if is_gzipped(&mut inner_rdr).map_err(unreadable)? {
        info!("auto-detected gzipped file - reading via decompression");
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(inner_rdr))))
    } else {
        Ok(Box::new(inner_rdr))
    }
}

/// Returns the final path component as a `String`, or the whole path if
/// there is none.
pub fn file_name_of<T: AsRef<Path>>(file_path: T) -> String {
    let file_path = file_path.as_ref();
    file_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::{Read, Write};

    #[test]
    fn test_is_gzipped() {
        let mut plain = BufReader::new(&b"Gene ID: x\n"[..]);
        assert!(!is_gzipped(&mut plain).unwrap());
        // nothing was consumed
        let mut s = String::new();
        plain.read_to_string(&mut s).unwrap();
        assert_eq!(s, "Gene ID: x\n");

        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"Gene ID: x\n").unwrap();
        let bytes = enc.finish().unwrap();
        let mut gz = BufReader::new(&bytes[..]);
        assert!(is_gzipped(&mut gz).unwrap());

        let mut empty = BufReader::new(&b""[..]);
        assert!(!is_gzipped(&mut empty).unwrap());
    }

    #[test]
    fn test_open_gene_file_plain_and_gzipped() {
        let dir = tempfile::tempdir().unwrap();

        let plain_path = dir.path().join("plain.txt");
        std::fs::write(&plain_path, "Gene ID: a\n---\n").unwrap();
        let lines: Vec<String> = open_gene_file(&plain_path)
            .unwrap()
            .lines()
            .map(|l| l.unwrap())
            .collect();
        assert_eq!(lines, vec!["Gene ID: a", "---"]);

        let gz_path = dir.path().join("packed.txt.gz");
        let mut enc = GzEncoder::new(File::create(&gz_path).unwrap(), Compression::default());
        enc.write_all(b"Gene ID: b\n---\n").unwrap();
        enc.finish().unwrap();
        let lines: Vec<String> = open_gene_file(&gz_path)
            .unwrap()
            .lines()
            .map(|l| l.unwrap())
            .collect();
        assert_eq!(lines, vec!["Gene ID: b", "---"]);
    }

    #[test]
    fn test_open_missing_file() {
        let err = open_gene_file("/definitely/not/here.txt").err().unwrap();
        assert!(matches!(err, ConvertError::UnreadableInput { .. }));
    }

    #[test]
    fn test_file_name_of() {
        assert_eq!(
            file_name_of("/data/TriTrypDB-5.0_TbruceiLister427Gene.txt"),
            "TriTrypDB-5.0_TbruceiLister427Gene.txt"
        );
    }
}
