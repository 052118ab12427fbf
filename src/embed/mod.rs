//! Embedding pipelines over a pre-trained multimodal model.
//!
//! Two independent pipelines share one named model: image → vector and
//! text → vector. Encoder files are fetched on demand into the configured
//! models directory.

mod pipeline;

pub use pipeline::{cosine_similarity, Embedding, EmbeddingPipeline};

use serde::{Deserialize, Serialize};

/// Which encoder of the multimodal model a pipeline or trainable handle is
/// bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Image,
    Text,
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Modality::Image => write!(f, "image"),
            Modality::Text => write!(f, "text"),
        }
    }
}
