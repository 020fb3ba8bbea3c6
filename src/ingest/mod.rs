pub mod chunker;
pub mod document;
pub mod extract;

pub use chunker::{plan, split, stitch, Chunk, Chunks};
pub use document::{media_type_for_name, DocumentSource, UploadedDocument};
pub use extract::{extract, extract_blocking, DocumentKind, ExtractedText};
