pub mod embeddings;
pub mod json_extraction;
pub mod parrotbox;
pub mod util;

pub use embeddings::{EmbeddingTask, EmbeddingsClient, TextEmbedder, DEFAULT_EMBEDDINGS_URL};
pub use parrotbox::{Digest, InsightExtractor, KeyConcept, ParrotboxClient};
