// In-memory fakes for the model and vector-store seams

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

use crate::database::sqlite::models::{NewTenant, Tenant};
use crate::database::{ChunkVector, Database, VectorMatch};
use crate::embeddings::{ChatModel, Embedder};
use crate::knowledge::KnowledgeIndex;
use crate::{Result, SupportError};

/// Keywords that each own one embedding dimension; the last dimension is a constant bias
pub const KEYWORDS: [&str; 5] = ["refund", "shipping", "size", "zipper", "warranty"];

pub fn keyword_vector(text: &str) -> Vec<f32> {
    let lowered = text.to_lowercase();
    let mut vector: Vec<f32> = KEYWORDS
        .iter()
        .map(|k| lowered.matches(k).count() as f32)
        .collect();
    vector.push(1.0);
    vector
}

pub const DIMENSION: usize = KEYWORDS.len() + 1;

/// Embeds text as keyword counts so related texts land close together
#[derive(Default)]
pub struct KeywordEmbedder {
    pub calls: AtomicUsize,
    /// Fail every call once this many calls have succeeded
    pub fail_after: Option<usize>,
}

impl KeywordEmbedder {
    pub fn failing_after(calls: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_after: Some(calls),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let previous = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_after.is_some_and(|limit| previous >= limit) {
            return Err(SupportError::Embedding("embedding model unreachable".to_string()));
        }
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}

/// Vector index kept in a Vec with brute-force cosine search
#[derive(Default)]
pub struct MemoryIndex {
    pub records: Mutex<Vec<ChunkVector>>,
    pub fail_upsert: bool,
    pub fail_search: bool,
}

impl MemoryIndex {
    pub fn failing_upsert() -> Self {
        Self {
            fail_upsert: true,
            ..Self::default()
        }
    }

    pub fn failing_search() -> Self {
        Self {
            fail_search: true,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn document_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.document_id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl KnowledgeIndex for MemoryIndex {
    async fn upsert(&self, records: &[ChunkVector]) -> Result<()> {
        if self.fail_upsert {
            return Err(SupportError::Database("vector store is read-only".to_string()));
        }
        let mut stored = self.records.lock().unwrap();
        stored.retain(|r| !records.iter().any(|n| n.id == r.id));
        stored.extend_from_slice(records);
        Ok(())
    }

    async fn search(&self, tenant_id: i64, query: &[f32], limit: usize) -> Result<Vec<VectorMatch>> {
        if self.fail_search {
            return Err(SupportError::Database("vector store unreachable".to_string()));
        }
        let mut matches: Vec<VectorMatch> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.tenant_id == tenant_id)
            .map(|r| VectorMatch {
                id: r.id.clone(),
                tenant_id: r.tenant_id,
                document_id: r.document_id,
                chunk_index: r.chunk_index,
                content: r.content.clone(),
                metadata: r.metadata.clone(),
                similarity: cosine(&r.vector, query).clamp(0.0, 1.0),
            })
            .collect();
        matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn delete_document(&self, document_id: i64) -> Result<()> {
        self.records
            .lock()
            .unwrap()
            .retain(|r| r.document_id != document_id);
        Ok(())
    }
}

/// Chat model that records its prompts and answers from a script
#[derive(Default)]
pub struct ScriptedChat {
    pub prompts: Mutex<Vec<(String, String)>>,
    pub fail: bool,
}

impl ScriptedChat {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn last_system_prompt(&self) -> String {
        self.prompts
            .lock()
            .unwrap()
            .last()
            .map(|(system, _)| system.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        self.prompts
            .lock()
            .unwrap()
            .push((system.to_string(), user.to_string()));
        if self.fail {
            return Err(SupportError::Generation("model overloaded".to_string()));
        }
        Ok(format!("Thanks for reaching out about: {user}"))
    }
}

/// SQLite database in a temp dir plus one tenant
pub async fn database_with_tenant(new_tenant: NewTenant) -> (TempDir, Database, Tenant) {
    let dir = TempDir::new().expect("should create temp dir");
    let database = Database::new(dir.path().join("metadata.db"))
        .await
        .expect("should open database");
    let tenant = database
        .create_tenant(new_tenant)
        .await
        .expect("should create tenant");
    (dir, database, tenant)
}

pub fn named_tenant(name: &str) -> NewTenant {
    NewTenant {
        name: name.to_string(),
        ..NewTenant::default()
    }
}
