// Reply generation: retrieve tenant context and draft one answer


pub mod prompt;
pub mod references;

use itertools::Itertools;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::RetrievalConfig;
use crate::database::VectorMatch;
use crate::database::sqlite::models::Tenant;
use crate::embeddings::ChatModel;
use crate::harvester::{Harvester, LearningRecord, match_records};
use crate::knowledge::KnowledgeService;
use crate::storefront::OrderLookup;
use crate::{Result, SupportError};

pub use prompt::{PromptContext, Tone, build_system_prompt};
pub use references::extract_order_references;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyRequest {
    pub tenant_id: i64,
    pub customer_message: String,
    pub tone: Tone,
    /// Overrides the tenant's stored guidelines when set
    pub custom_instructions: Option<String>,
    pub one_time_instructions: Option<String>,
}

/// A knowledge chunk the reply drew on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplySource {
    pub snippet: String,
    /// Whole-number percentage
    pub similarity: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedReply {
    pub reply: String,
    pub sources: Vec<ReplySource>,
    /// False when neither knowledge nor order data backed the reply
    pub has_knowledge_base: bool,
}

/// Shorten to at most `max_chars`, marking the cut with an ellipsis
#[inline]
pub fn truncate_snippet(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept.trim_end())
}

pub struct ReplyGenerator {
    knowledge: Arc<KnowledgeService>,
    chat: Arc<dyn ChatModel>,
    orders: Option<OrderLookup>,
    harvester: Option<Arc<Harvester>>,
    retrieval: RetrievalConfig,
}

impl ReplyGenerator {
    #[inline]
    pub fn new(
        knowledge: Arc<KnowledgeService>,
        chat: Arc<dyn ChatModel>,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            knowledge,
            chat,
            orders: None,
            harvester: None,
            retrieval,
        }
    }

    /// Enable live order enrichment for tenants with storefront credentials
    #[inline]
    pub fn with_orders(mut self, orders: OrderLookup) -> Self {
        self.orders = Some(orders);
        self
    }

    /// Enable similar-ticket matching from the learning cache
    #[inline]
    pub fn with_harvester(mut self, harvester: Arc<Harvester>) -> Self {
        self.harvester = Some(harvester);
        self
    }

    #[inline]
    pub async fn generate(&self, request: &ReplyRequest) -> Result<GeneratedReply> {
        let message = request.customer_message.trim();
        if message.is_empty() {
            return Err(SupportError::Validation(
                "customer message is required".to_string(),
            ));
        }

        let tenant = self.knowledge.require_tenant(request.tenant_id).await?;

        let order_text = self.order_context(&tenant, message).await;

        // Store failures are fatal: an empty context would look like "no knowledge"
        let knowledge = self
            .knowledge
            .search_text(tenant.id, message, &self.retrieval)
            .await?;

        let records = self.learning_records(&tenant);
        let learned = match_records(
            &records,
            message,
            self.retrieval.learned_matches,
            self.retrieval.learned_min_score,
        );

        let custom_instructions = request
            .custom_instructions
            .as_deref()
            .or_else(|| tenant.custom_instructions());

        let context = PromptContext {
            business_name: &tenant.name,
            website: tenant.website.as_deref(),
            tone: request.tone,
            one_time_instructions: request.one_time_instructions.as_deref(),
            custom_instructions,
            order_text: order_text.as_deref(),
            knowledge: &knowledge,
            learned: &learned,
        };
        let has_knowledge_base = context.has_context();
        let system_prompt = build_system_prompt(&context);

        debug!(
            "Generating reply for tenant {} with {} chunks, {} similar tickets, order data: {}",
            tenant.id,
            knowledge.len(),
            learned.len(),
            order_text.is_some()
        );

        let reply = self.chat.complete(&system_prompt, message).await?;

        info!(
            "Drafted reply for tenant {} ({} sources)",
            tenant.id,
            knowledge.len()
        );

        Ok(GeneratedReply {
            reply,
            sources: self.sources(&knowledge),
            has_knowledge_base,
        })
    }

    /// Formatted orders referenced in the message; lookup failures are skipped
    async fn order_context(&self, tenant: &Tenant, message: &str) -> Option<String> {
        let orders = self.orders.as_ref()?;
        let credentials = tenant.storefront_credentials()?;

        let references = extract_order_references(message, self.retrieval.max_order_references);
        if references.is_empty() {
            return None;
        }

        let mut blocks = Vec::new();
        for reference in references {
            match orders.lookup(&credentials, &format!("#{reference}")).await {
                Ok(result) if result.found => blocks.push(result.formatted_text),
                Ok(_) => debug!("Order #{} not found for tenant {}", reference, tenant.id),
                Err(e) => warn!(
                    "Order lookup for #{} failed for tenant {}: {}",
                    reference, tenant.id, e
                ),
            }
        }

        (!blocks.is_empty()).then(|| blocks.join("\n\n"))
    }

    fn learning_records(&self, tenant: &Tenant) -> Arc<Vec<LearningRecord>> {
        match &self.harvester {
            Some(harvester) => harvester.learning_records(tenant),
            None => Arc::new(Vec::new()),
        }
    }

    fn sources(&self, knowledge: &[VectorMatch]) -> Vec<ReplySource> {
        knowledge
            .iter()
            .sorted_by(|a, b| b.similarity.total_cmp(&a.similarity))
            .map(|chunk| ReplySource {
                snippet: truncate_snippet(&chunk.content, self.retrieval.snippet_chars),
                similarity: chunk.similarity_percent(),
            })
            .collect()
    }
}
