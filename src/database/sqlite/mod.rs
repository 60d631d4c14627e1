use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::database::sqlite::models::{
    Document, DocumentSummary, NewChunk, NewTenant, Tenant, TenantStatistics,
};
use crate::database::sqlite::queries::{ChunkQueries, DocumentQueries, TenantQueries};


pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    #[inline]
    pub async fn initialize_from_config_dir(config_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(config_dir.join("metadata.db")).await
    }

    // Tenant operations
    #[inline]
    pub async fn create_tenant(&self, tenant: NewTenant) -> Result<Tenant> {
        TenantQueries::create(&self.pool, tenant).await
    }

    #[inline]
    pub async fn get_tenant(&self, id: i64) -> Result<Option<Tenant>> {
        TenantQueries::get_by_id(&self.pool, id).await
    }

    #[inline]
    pub async fn list_tenants(&self) -> Result<Vec<Tenant>> {
        TenantQueries::list_all(&self.pool).await
    }

    #[inline]
    pub async fn tenant_statistics(&self, id: i64) -> Result<Option<TenantStatistics>> {
        TenantQueries::get_statistics(&self.pool, id).await
    }

    // Document operations
    #[inline]
    pub async fn create_document(&self, tenant_id: i64, name: &str, content: &str) -> Result<Document> {
        DocumentQueries::create(&self.pool, tenant_id, name, content).await
    }

    #[inline]
    pub async fn get_document(&self, id: i64) -> Result<Option<Document>> {
        DocumentQueries::get_by_id(&self.pool, id).await
    }

    #[inline]
    pub async fn list_documents(&self, tenant_id: i64) -> Result<Vec<DocumentSummary>> {
        DocumentQueries::list_by_tenant(&self.pool, tenant_id).await
    }

    #[inline]
    pub async fn documents_with_prefix(&self, tenant_id: i64, prefix: &str) -> Result<Vec<Document>> {
        DocumentQueries::list_by_name_prefix(&self.pool, tenant_id, prefix).await
    }

    #[inline]
    pub async fn delete_document(&self, id: i64) -> Result<bool> {
        DocumentQueries::delete(&self.pool, id).await
    }

    // Chunk operations
    #[inline]
    pub async fn insert_chunks(&self, chunks: &[NewChunk]) -> Result<usize> {
        ChunkQueries::insert_batch(&self.pool, chunks).await
    }

    #[inline]
    pub async fn count_chunks(&self, document_id: i64) -> Result<i64> {
        ChunkQueries::count_by_document(&self.pool, document_id).await
    }
}
