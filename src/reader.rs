pub mod genefile;
pub use genefile::{
    GeneId, GeneRecord, GoAnnotation, LineKind, ParseStats, ParsedGeneFile, RecordParser, Strand,
};
