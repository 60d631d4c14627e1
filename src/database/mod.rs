// Dual storage: SQLite for tenants, documents and chunk rows; LanceDB for vectors

pub mod lancedb;
pub mod sqlite;

pub use self::lancedb::{ChunkVector, VectorMatch, VectorStore};
pub use sqlite::*;
