// LanceDB vector database module
// Holds chunk embeddings and answers tenant-scoped similarity queries

#[cfg(test)]
mod tests;

pub mod vector_store;

use serde::{Deserialize, Serialize};

pub use vector_store::VectorStore;

/// One chunk embedding as stored in LanceDB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkVector {
    /// Vector id, mirrored in the SQLite `chunks.vector_id` column
    pub id: String,
    pub tenant_id: i64,
    pub document_id: i64,
    /// Position of the chunk within its document
    pub chunk_index: u32,
    pub content: String,
    /// Free-form provenance tag, e.g. `{"source":"tickets"}`
    pub metadata: Option<String>,
    pub vector: Vec<f32>,
}

/// A chunk returned by similarity search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMatch {
    pub id: String,
    pub tenant_id: i64,
    pub document_id: i64,
    pub chunk_index: u32,
    pub content: String,
    pub metadata: Option<String>,
    /// Cosine similarity clamped to 0..=1
    pub similarity: f32,
}

impl VectorMatch {
    /// Similarity as a whole percentage
    #[inline]
    pub fn similarity_percent(&self) -> u8 {
        let percent = (self.similarity.clamp(0.0, 1.0) * 100.0).round();
        // Clamped above, so the cast cannot truncate
        percent as u8
    }
}

/// Convert a LanceDB cosine distance into a similarity in 0..=1
#[inline]
pub fn cosine_similarity_from_distance(distance: f32) -> f32 {
    if distance.is_nan() {
        return 0.0;
    }
    (1.0 - distance).clamp(0.0, 1.0)
}
