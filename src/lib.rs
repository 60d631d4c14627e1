use thiserror::Error;

pub type Result<T> = std::result::Result<T, SupportError>;

#[derive(Error, Debug)]
pub enum SupportError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Content is {size} bytes, exceeding the {limit} byte limit")]
    ContentTooLarge { size: usize, limit: usize },

    #[error("Tenant not found: {0}")]
    TenantNotFound(i64),

    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Helpdesk error: {0}")]
    Helpdesk(String),

    #[error("Storefront error: {0}")]
    Storefront(String),

    #[error(
        "Harvest failed after scanning {tickets_scanned} tickets ({conversations_learned} learned): {message}"
    )]
    Harvest {
        tickets_scanned: usize,
        conversations_learned: usize,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl SupportError {
    /// HTTP-equivalent status for an outer request surface
    #[inline]
    pub fn status_code(&self) -> u16 {
        match *self {
            Self::Validation(_) | Self::ContentTooLarge { .. } | Self::NotConfigured(_) => 400,
            Self::TenantNotFound(_) => 404,
            Self::Embedding(_) | Self::Generation(_) | Self::Helpdesk(_) | Self::Storefront(_) => {
                502
            }
            Self::Config(_)
            | Self::Database(_)
            | Self::Harvest { .. }
            | Self::Io(_)
            | Self::Other(_) => 500,
        }
    }
}

pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod harvester;
pub mod helpdesk;
pub mod knowledge;
pub mod pipeline;
pub mod reply;
pub mod storefront;

#[cfg(test)]
mod test_support;
