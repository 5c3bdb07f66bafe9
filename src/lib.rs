//! `tritrypdb` converts [TriTrypDB](https://tritrypdb.org/) gene information files into
//! tab-delimited tables: a gene list ordered by genomic location, a gene length table and a
//! gene to GO term mapping. The gene information file is a flat text dump in which every gene
//! is a block of `Label: value` lines closed by a `---` line. [reader] walks those blocks,
//! [tables] lays the records out as [Polars](https://pola.rs/) data frames and writes them.

pub mod error;
pub mod options;
pub mod reader;
pub mod tables;
pub mod tritryp_utils;
pub use error::ConvertError;
pub use options::{ConvertOptions, OutputNaming};
pub use reader::{GeneRecord, GoAnnotation, ParsedGeneFile};
pub use tables::{convert_gene_file, AnnotationTables};
