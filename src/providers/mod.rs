//! External capabilities: extractors, embedders and the vector index

pub mod embedder;
pub mod extractor;
pub mod vector_index;

pub use embedder::{Embedder, HashEmbedder, HttpEmbedder};
pub use extractor::{Extractor, ExtractorSet, PdfExtractor, PlainTextExtractor};
pub use vector_index::{LocalVectorIndex, PointPayload, ScoredPoint, VectorIndex, VectorPoint};
