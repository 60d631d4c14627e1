// Text chunking plus the model seams used by ingestion and reply generation

pub mod chunking;
pub mod ollama;

use async_trait::async_trait;

pub use chunking::{ChunkingConfig, normalize_text, split_text};
pub use ollama::OllamaClient;

/// Turns text into fixed-dimension vectors, one per input and in input order
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>>;

    /// Embed a single string
    #[inline]
    async fn embed_one(&self, text: &str) -> crate::Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| crate::SupportError::Embedding("model returned no vector".to_string()))
    }
}

/// Produces a single completion from a system prompt and one user turn
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> crate::Result<String>;
}
