// Long-lived clients wired together once and shared by every operation


use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use crate::config::Config;
use crate::database::{Database, VectorStore};
use crate::embeddings::{ChatModel, Embedder, OllamaClient};
use crate::harvester::{HarvestProgress, HarvestReport, Harvester, LearningCache};
use crate::helpdesk::{FreshdeskClient, HelpdeskApi, HelpdeskCredentials};
use crate::knowledge::{IngestOutcome, KnowledgeIndex, KnowledgeService, LearnOutcome};
use crate::reply::{GeneratedReply, ReplyGenerator, ReplyRequest};
use crate::storefront::{OrderLookup, OrderLookupResult, OrderSource, ShopifyClient};
use crate::{Result, SupportError};

/// External services the pipeline talks to
pub struct Collaborators {
    pub index: Arc<dyn KnowledgeIndex>,
    pub embedder: Arc<dyn Embedder>,
    pub chat: Arc<dyn ChatModel>,
    pub helpdesk: Arc<dyn HelpdeskApi>,
    pub orders: Arc<dyn OrderSource>,
}

pub struct Pipeline {
    config: Config,
    knowledge: Arc<KnowledgeService>,
    harvester: Arc<Harvester>,
    replies: ReplyGenerator,
    orders: OrderLookup,
}

impl Pipeline {
    /// Open the on-disk stores and build the HTTP clients described by `config`
    #[inline]
    pub async fn open(config: Config) -> Result<Self> {
        tokio::fs::create_dir_all(config.get_base_dir()).await?;
        let database = Database::new(config.database_path())
            .await
            .map_err(|e| SupportError::Database(format!("{e:#}")))?;

        let dimension = usize::try_from(config.ollama.embedding_dimension)
            .map_err(|e| SupportError::Config(format!("invalid embedding dimension: {e}")))?;
        let vector_store = VectorStore::new(&config.vector_database_path(), dimension).await?;

        let ollama = Arc::new(
            OllamaClient::new(&config.ollama).map_err(|e| SupportError::Config(format!("{e:#}")))?,
        );

        let collaborators = Collaborators {
            index: Arc::new(vector_store),
            embedder: Arc::clone(&ollama) as Arc<dyn Embedder>,
            chat: ollama,
            helpdesk: Arc::new(FreshdeskClient::new(&config.harvest)),
            orders: Arc::new(ShopifyClient::new(&config.storefront)),
        };

        info!("Pipeline ready at {}", config.get_base_dir().display());
        Ok(Self::from_parts(config, database, collaborators))
    }

    #[inline]
    pub fn from_parts(config: Config, database: Database, collaborators: Collaborators) -> Self {
        let knowledge = Arc::new(KnowledgeService::new(
            database,
            collaborators.index,
            collaborators.embedder,
            config.chunking.clone(),
            config.ingestion.clone(),
        ));

        let cache = Arc::new(LearningCache::new(Duration::from_secs(
            config.harvest.cache_ttl_seconds,
        )));
        let harvester = Arc::new(Harvester::new(
            collaborators.helpdesk,
            Arc::clone(&knowledge),
            cache,
            config.harvest.clone(),
            config.ingestion.max_learned_document_bytes,
        ));

        let orders = OrderLookup::new(collaborators.orders);
        let replies = ReplyGenerator::new(
            Arc::clone(&knowledge),
            collaborators.chat,
            config.retrieval.clone(),
        )
        .with_orders(orders.clone())
        .with_harvester(Arc::clone(&harvester));

        debug!("Pipeline components wired");
        Self {
            config,
            knowledge,
            harvester,
            replies,
            orders,
        }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn knowledge(&self) -> &KnowledgeService {
        &self.knowledge
    }

    #[inline]
    pub fn database(&self) -> &Database {
        self.knowledge.database()
    }

    #[inline]
    pub async fn ingest(&self, tenant_id: i64, name: &str, content: &str) -> Result<IngestOutcome> {
        self.knowledge.ingest(tenant_id, name, content).await
    }

    #[inline]
    pub async fn learn_interaction(
        &self,
        tenant_id: i64,
        question: &str,
        answer: &str,
    ) -> Result<LearnOutcome> {
        self.knowledge
            .learn_interaction(tenant_id, question, answer)
            .await
    }

    #[inline]
    pub async fn harvest(
        &self,
        tenant_id: i64,
        credentials: Option<HelpdeskCredentials>,
        target_count: usize,
        progress: Option<&UnboundedSender<HarvestProgress>>,
    ) -> Result<HarvestReport> {
        self.harvester
            .harvest(tenant_id, credentials, target_count, progress)
            .await
    }

    #[inline]
    pub async fn reply(&self, request: &ReplyRequest) -> Result<GeneratedReply> {
        self.replies.generate(request).await
    }

    /// Manual order search for a tenant's store
    #[inline]
    pub async fn lookup_order(&self, tenant_id: i64, search_query: &str) -> Result<OrderLookupResult> {
        let tenant = self.knowledge.require_tenant(tenant_id).await?;
        let credentials = tenant.storefront_credentials().ok_or_else(|| {
            SupportError::NotConfigured(format!("tenant {} has no storefront credentials", tenant.id))
        })?;
        self.orders.lookup(&credentials, search_query).await
    }
}
