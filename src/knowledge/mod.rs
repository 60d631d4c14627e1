// Knowledge ingestion: chunk, embed and index documents for one tenant


use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{IngestionConfig, RetrievalConfig};
use crate::database::sqlite::models::{
    Document, DocumentSummary, LEARNED_DOCUMENT_PREFIX, NewChunk, Tenant,
};
use crate::database::{ChunkVector, Database, VectorMatch, VectorStore};
use crate::embeddings::{ChunkingConfig, Embedder, split_text};
use crate::{Result, SupportError};

/// Characters of the question kept in an incrementally learned document name
const LEARNED_NAME_CHARS: usize = 50;

/// Names that relearning would treat as its own output
fn is_reserved_name(name: &str) -> bool {
    name.trim()
        .get(..LEARNED_DOCUMENT_PREFIX.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(LEARNED_DOCUMENT_PREFIX))
}

/// Tenant-scoped vector index used by ingestion and retrieval
#[async_trait]
pub trait KnowledgeIndex: Send + Sync {
    async fn upsert(&self, records: &[ChunkVector]) -> Result<()>;

    /// Best `limit` matches for `tenant_id`, similarity non-increasing
    async fn search(&self, tenant_id: i64, query: &[f32], limit: usize) -> Result<Vec<VectorMatch>>;

    async fn delete_document(&self, document_id: i64) -> Result<()>;
}

#[async_trait]
impl KnowledgeIndex for VectorStore {
    #[inline]
    async fn upsert(&self, records: &[ChunkVector]) -> Result<()> {
        Self::upsert(self, records).await
    }

    #[inline]
    async fn search(&self, tenant_id: i64, query: &[f32], limit: usize) -> Result<Vec<VectorMatch>> {
        Self::search(self, tenant_id, query, limit).await
    }

    #[inline]
    async fn delete_document(&self, document_id: i64) -> Result<()> {
        Self::delete_document(self, document_id).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    pub document_id: i64,
    pub chunk_count: usize,
}

/// Result of learning a single question/answer pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum LearnOutcome {
    /// Existing knowledge already covers the interaction
    Duplicate { similarity: f32 },
    Learned(IngestOutcome),
}

fn db_error(error: &anyhow::Error) -> SupportError {
    SupportError::Database(format!("{error:#}"))
}

/// Provenance tag stored with every chunk
fn chunk_metadata(source: &str, document_name: &str) -> String {
    serde_json::json!({ "source": source, "document": document_name }).to_string()
}

pub struct KnowledgeService {
    database: Database,
    index: Arc<dyn KnowledgeIndex>,
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
    ingestion: IngestionConfig,
    learned_locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl KnowledgeService {
    #[inline]
    pub fn new(
        database: Database,
        index: Arc<dyn KnowledgeIndex>,
        embedder: Arc<dyn Embedder>,
        chunking: ChunkingConfig,
        ingestion: IngestionConfig,
    ) -> Self {
        Self {
            database,
            index,
            embedder,
            chunking,
            ingestion,
            learned_locks: Mutex::new(HashMap::new()),
        }
    }

    #[inline]
    pub fn database(&self) -> &Database {
        &self.database
    }

    #[inline]
    pub fn index(&self) -> &Arc<dyn KnowledgeIndex> {
        &self.index
    }

    #[inline]
    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Look up a tenant, mapping absence to `TenantNotFound`
    #[inline]
    pub async fn require_tenant(&self, tenant_id: i64) -> Result<Tenant> {
        self.database
            .get_tenant(tenant_id)
            .await
            .map_err(|e| db_error(&e))?
            .ok_or(SupportError::TenantNotFound(tenant_id))
    }

    /// Ingest a named document; either every chunk is indexed or nothing remains
    #[inline]
    pub async fn ingest(&self, tenant_id: i64, name: &str, content: &str) -> Result<IngestOutcome> {
        if is_reserved_name(name) {
            return Err(SupportError::Validation(format!(
                "document names starting with \"{LEARNED_DOCUMENT_PREFIX}\" are reserved for learned tickets"
            )));
        }
        self.ingest_with_limit(
            tenant_id,
            name,
            content,
            self.ingestion.max_document_bytes,
            "document",
        )
        .await
    }

    async fn ingest_with_limit(
        &self,
        tenant_id: i64,
        name: &str,
        content: &str,
        limit: usize,
        source: &str,
    ) -> Result<IngestOutcome> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SupportError::Validation("document name is required".to_string()));
        }
        if content.trim().is_empty() {
            return Err(SupportError::Validation("document content is required".to_string()));
        }
        if content.len() > limit {
            return Err(SupportError::ContentTooLarge {
                size: content.len(),
                limit,
            });
        }

        self.require_tenant(tenant_id).await?;

        let document = self
            .database
            .create_document(tenant_id, name, content)
            .await
            .map_err(|e| db_error(&e))?;
        debug!("Created document {} ({}) for tenant {}", document.id, name, tenant_id);

        match self.index_document(&document, source).await {
            Ok(chunk_count) => {
                info!(
                    "Indexed document {} for tenant {} with {} chunks",
                    document.id, tenant_id, chunk_count
                );
                Ok(IngestOutcome {
                    document_id: document.id,
                    chunk_count,
                })
            }
            Err(error) => {
                warn!("Indexing document {} failed, rolling back: {}", document.id, error);
                self.discard_document(document.id).await;
                Err(error)
            }
        }
    }

    async fn index_document(&self, document: &Document, source: &str) -> Result<usize> {
        let chunks = split_text(&document.content, &self.chunking);
        if chunks.is_empty() {
            return Err(SupportError::Validation("document has no indexable text".to_string()));
        }

        let embeddings = self.embedder.embed(&chunks).await?;
        if embeddings.len() != chunks.len() {
            return Err(SupportError::Embedding(format!(
                "expected {} embeddings, got {}",
                chunks.len(),
                embeddings.len()
            )));
        }

        let metadata = chunk_metadata(source, &document.name);
        let mut vectors = Vec::with_capacity(chunks.len());
        let mut rows = Vec::with_capacity(chunks.len());
        for (index, (content, vector)) in chunks.into_iter().zip(embeddings).enumerate() {
            let vector_id = Uuid::new_v4().to_string();
            let chunk_index = u32::try_from(index)
                .map_err(|_| SupportError::Validation("document has too many chunks".to_string()))?;
            rows.push(NewChunk {
                document_id: document.id,
                chunk_index: i64::from(chunk_index),
                content: content.clone(),
                vector_id: vector_id.clone(),
                metadata: Some(metadata.clone()),
            });
            vectors.push(ChunkVector {
                id: vector_id,
                tenant_id: document.tenant_id,
                document_id: document.id,
                chunk_index,
                content,
                metadata: Some(metadata.clone()),
                vector,
            });
        }

        self.index.upsert(&vectors).await?;
        self.database
            .insert_chunks(&rows)
            .await
            .map_err(|e| db_error(&e))
    }

    /// Compensation for a failed ingest; errors here are logged, not raised
    async fn discard_document(&self, document_id: i64) {
        if let Err(e) = self.index.delete_document(document_id).await {
            warn!("Failed to remove vectors of document {}: {}", document_id, e);
        }
        if let Err(e) = self.database.delete_document(document_id).await {
            warn!("Failed to remove document {}: {:#}", document_id, e);
        }
    }

    /// Delete a document with its vectors and chunk rows
    #[inline]
    pub async fn delete_document(&self, document_id: i64) -> Result<bool> {
        self.index.delete_document(document_id).await?;
        self.database
            .delete_document(document_id)
            .await
            .map_err(|e| db_error(&e))
    }

    #[inline]
    pub async fn list_documents(&self, tenant_id: i64) -> Result<Vec<DocumentSummary>> {
        self.require_tenant(tenant_id).await?;
        self.database
            .list_documents(tenant_id)
            .await
            .map_err(|e| db_error(&e))
    }

    fn tenant_lock(&self, tenant_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .learned_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(tenant_id).or_default())
    }

    /// Swap the tenant's ticket-learned knowledge for `content`.
    ///
    /// Runs under a per-tenant lock so two relearns never interleave their
    /// delete and insert steps.
    #[inline]
    pub async fn replace_learned(&self, tenant_id: i64, content: &str) -> Result<IngestOutcome> {
        let lock = self.tenant_lock(tenant_id);
        let _guard = lock.lock().await;

        self.require_tenant(tenant_id).await?;
        let previous = self
            .database
            .documents_with_prefix(tenant_id, LEARNED_DOCUMENT_PREFIX)
            .await
            .map_err(|e| db_error(&e))?;

        for document in &previous {
            debug!("Removing learned document {} ({})", document.id, document.name);
            self.delete_document(document.id).await?;
        }

        let name = format!(
            "{} ({})",
            LEARNED_DOCUMENT_PREFIX,
            Utc::now().format("%Y-%m-%d %H:%M UTC")
        );
        let outcome = self
            .ingest_with_limit(
                tenant_id,
                &name,
                content,
                self.ingestion.max_learned_document_bytes,
                "tickets",
            )
            .await?;

        info!(
            "Replaced {} learned documents for tenant {} with document {}",
            previous.len(),
            tenant_id,
            outcome.document_id
        );
        Ok(outcome)
    }

    /// Learn one question/answer pair unless the tenant already knows it
    #[inline]
    pub async fn learn_interaction(
        &self,
        tenant_id: i64,
        question: &str,
        answer: &str,
    ) -> Result<LearnOutcome> {
        let question = question.trim();
        let answer = answer.trim();
        if question.is_empty() || answer.is_empty() {
            return Err(SupportError::Validation(
                "both a question and an answer are required".to_string(),
            ));
        }
        self.require_tenant(tenant_id).await?;

        let text = format!("Customer question: {question}\nAgent answer: {answer}");
        let vector = self.embedder.embed_one(&text).await?;
        let best = self.index.search(tenant_id, &vector, 1).await?;

        if let Some(top) = best.first() {
            if top.similarity >= self.ingestion.duplicate_similarity {
                debug!(
                    "Skipping interaction for tenant {}: {:.2} similar to chunk {}",
                    tenant_id, top.similarity, top.id
                );
                return Ok(LearnOutcome::Duplicate {
                    similarity: top.similarity,
                });
            }
        }

        let prefix: String = question.chars().take(LEARNED_NAME_CHARS).collect();
        let outcome = self
            .ingest_with_limit(
                tenant_id,
                &format!("Learned: {prefix}"),
                &text,
                self.ingestion.max_document_bytes,
                "interaction",
            )
            .await?;
        Ok(LearnOutcome::Learned(outcome))
    }

    /// Embed `text` and return the tenant's best matches at or above the floor
    #[inline]
    pub async fn search_text(
        &self,
        tenant_id: i64,
        text: &str,
        retrieval: &RetrievalConfig,
    ) -> Result<Vec<VectorMatch>> {
        let vector = self.embedder.embed_one(text).await?;
        let mut matches = self.index.search(tenant_id, &vector, retrieval.top_k).await?;
        matches.retain(|m| m.similarity >= retrieval.min_similarity);
        Ok(matches)
    }
}
