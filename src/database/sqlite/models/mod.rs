
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::helpdesk::HelpdeskCredentials;
use crate::storefront::StorefrontCredentials;

/// Name prefix shared by every document synthesised from resolved tickets
pub const LEARNED_DOCUMENT_PREFIX: &str = "Learned from tickets";

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub id: i64,
    pub name: String,
    pub helpdesk_domain: Option<String>,
    #[serde(skip_serializing)]
    pub helpdesk_api_key: Option<String>,
    pub storefront_domain: Option<String>,
    #[serde(skip_serializing)]
    pub storefront_token: Option<String>,
    pub website: Option<String>,
    pub custom_instructions: Option<String>,
    pub created_date: NaiveDateTime,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NewTenant {
    pub name: String,
    pub helpdesk_domain: Option<String>,
    pub helpdesk_api_key: Option<String>,
    pub storefront_domain: Option<String>,
    pub storefront_token: Option<String>,
    pub website: Option<String>,
    pub custom_instructions: Option<String>,
}

fn redacted(secret: Option<&String>) -> Option<&'static str> {
    secret.map(|_| "<redacted>")
}

impl std::fmt::Debug for Tenant {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tenant")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("helpdesk_domain", &self.helpdesk_domain)
            .field("helpdesk_api_key", &redacted(self.helpdesk_api_key.as_ref()))
            .field("storefront_domain", &self.storefront_domain)
            .field("storefront_token", &redacted(self.storefront_token.as_ref()))
            .field("website", &self.website)
            .field("custom_instructions", &self.custom_instructions)
            .field("created_date", &self.created_date)
            .finish()
    }
}

impl std::fmt::Debug for NewTenant {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewTenant")
            .field("name", &self.name)
            .field("helpdesk_domain", &self.helpdesk_domain)
            .field("helpdesk_api_key", &redacted(self.helpdesk_api_key.as_ref()))
            .field("storefront_domain", &self.storefront_domain)
            .field("storefront_token", &redacted(self.storefront_token.as_ref()))
            .field("website", &self.website)
            .field("custom_instructions", &self.custom_instructions)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub id: i64,
    pub tenant_id: i64,
    pub name: String,
    pub content: String,
    pub created_date: NaiveDateTime,
}

/// Listing row for a document, without its content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct DocumentSummary {
    pub id: i64,
    pub tenant_id: i64,
    pub name: String,
    pub content_bytes: i64,
    pub chunk_count: i64,
    pub created_date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct StoredChunk {
    pub id: i64,
    pub document_id: i64,
    pub chunk_index: i64,
    pub content: String,
    pub vector_id: String,
    pub metadata: Option<String>,
    pub created_date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewChunk {
    pub document_id: i64,
    pub chunk_index: i64,
    pub content: String,
    pub vector_id: String,
    pub metadata: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantStatistics {
    pub tenant: Tenant,
    pub document_count: i64,
    pub chunk_count: i64,
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

impl Tenant {
    /// Helpdesk credentials, when both domain and key are configured
    #[inline]
    pub fn helpdesk_credentials(&self) -> Option<HelpdeskCredentials> {
        let domain = non_blank(self.helpdesk_domain.as_ref())?;
        let api_key = non_blank(self.helpdesk_api_key.as_ref())?;
        Some(HelpdeskCredentials::new(domain, api_key))
    }

    /// Storefront credentials, when both shop domain and token are configured
    #[inline]
    pub fn storefront_credentials(&self) -> Option<StorefrontCredentials> {
        let shop_domain = non_blank(self.storefront_domain.as_ref())?;
        let access_token = non_blank(self.storefront_token.as_ref())?;
        Some(StorefrontCredentials::new(shop_domain, access_token))
    }

    #[inline]
    pub fn custom_instructions(&self) -> Option<&str> {
        non_blank(self.custom_instructions.as_ref())
    }
}

impl Document {
    #[inline]
    pub fn is_learned(&self) -> bool {
        self.name.starts_with(LEARNED_DOCUMENT_PREFIX)
    }
}
