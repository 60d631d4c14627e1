// Helpdesk collaborator: ticket records and the API seam the harvester drives


pub mod freshdesk;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use freshdesk::FreshdeskClient;

/// Freshdesk status code for a resolved ticket
pub const STATUS_RESOLVED: u8 = 4;
/// Freshdesk status code for a closed ticket
pub const STATUS_CLOSED: u8 = 5;

/// Connection details for one tenant's helpdesk account
#[derive(Clone, PartialEq, Eq)]
pub struct HelpdeskCredentials {
    base_url: String,
    api_key: String,
}

impl HelpdeskCredentials {
    /// Accepts `acme`, `acme.freshdesk.com` or a full URL
    #[inline]
    pub fn new(domain: &str, api_key: &str) -> Self {
        let domain = domain.trim().trim_end_matches('/');
        let base_url = if domain.starts_with("http://") || domain.starts_with("https://") {
            domain.to_string()
        } else if domain.contains('.') {
            format!("https://{domain}")
        } else {
            format!("https://{domain}.freshdesk.com")
        };

        Self {
            base_url,
            api_key: api_key.trim().to_string(),
        }
    }

    #[inline]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[inline]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl std::fmt::Debug for HelpdeskCredentials {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HelpdeskCredentials")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Dedicated list filters for finished tickets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketFilter {
    Closed,
    Resolved,
}

impl TicketFilter {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Resolved => "resolved",
        }
    }
}

impl std::fmt::Display for TicketFilter {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: u64,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub status: u8,
    #[serde(default)]
    pub description_text: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Ticket {
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.status == STATUS_RESOLVED || self.status == STATUS_CLOSED
    }
}

/// One message on a ticket after the initial description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(default)]
    pub body_text: String,
    /// Sent by the customer rather than an agent
    #[serde(default)]
    pub incoming: bool,
    /// Internal note, never shown to the customer
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Conversation {
    /// Public reply written by an agent
    #[inline]
    pub fn is_agent_reply(&self) -> bool {
        !self.incoming && !self.private && !self.body_text.trim().is_empty()
    }
}

/// A ticket together with its conversation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketThread {
    #[serde(flatten)]
    pub ticket: Ticket,
    #[serde(default)]
    pub conversations: Vec<Conversation>,
}

/// The helpdesk operations ticket learning relies on
#[async_trait]
pub trait HelpdeskApi: Send + Sync {
    /// One page of a dedicated status filter
    async fn filtered_tickets(
        &self,
        credentials: &HelpdeskCredentials,
        filter: TicketFilter,
        page: u32,
        per_page: u32,
    ) -> crate::Result<Vec<Ticket>>;

    /// One page of the search endpoint for a status code
    async fn search_by_status(
        &self,
        credentials: &HelpdeskCredentials,
        status: u8,
        page: u32,
    ) -> crate::Result<Vec<Ticket>>;

    /// One page of all tickets, most recently updated first
    async fn list_recent(
        &self,
        credentials: &HelpdeskCredentials,
        page: u32,
        per_page: u32,
    ) -> crate::Result<Vec<Ticket>>;

    async fn ticket_thread(
        &self,
        credentials: &HelpdeskCredentials,
        ticket_id: u64,
    ) -> crate::Result<TicketThread>;
}
