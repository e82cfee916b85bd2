pub mod chunker;
pub mod formats;
mod native;
pub mod parser;

pub use chunker::{Chunk, Chunker};
pub use formats::FormatFamily;
pub use parser::{DocumentParser, MultimodalExtractor, ParsedDocument};
