#[cfg(test)]
mod tests;

use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

pub struct TenantQueries;

impl TenantQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, new_tenant: NewTenant) -> Result<Tenant> {
        let now = Utc::now().naive_utc();
        let id = sqlx::query(
            r#"
            INSERT INTO tenants (name, helpdesk_domain, helpdesk_api_key, storefront_domain,
                                 storefront_token, website, custom_instructions, created_date)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&new_tenant.name)
        .bind(&new_tenant.helpdesk_domain)
        .bind(&new_tenant.helpdesk_api_key)
        .bind(&new_tenant.storefront_domain)
        .bind(&new_tenant.storefront_token)
        .bind(&new_tenant.website)
        .bind(&new_tenant.custom_instructions)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create tenant")?
        .last_insert_rowid();

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created tenant"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Tenant>> {
        let result = sqlx::query_as::<_, Tenant>(
            r#"
            SELECT id, name, helpdesk_domain, helpdesk_api_key, storefront_domain,
                   storefront_token, website, custom_instructions, created_date
            FROM tenants WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get tenant by id")?;

        Ok(result)
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Tenant>> {
        let tenants = sqlx::query_as::<_, Tenant>(
            r#"
            SELECT id, name, helpdesk_domain, helpdesk_api_key, storefront_domain,
                   storefront_token, website, custom_instructions, created_date
            FROM tenants ORDER BY id
            "#,
        )
        .fetch_all(pool)
        .await
        .context("Failed to list tenants")?;

        Ok(tenants)
    }

    #[inline]
    pub async fn get_statistics(
        pool: &SqlitePool,
        tenant_id: i64,
    ) -> Result<Option<TenantStatistics>> {
        let Some(tenant) = Self::get_by_id(pool, tenant_id).await? else {
            return Ok(None);
        };

        let document_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE tenant_id = ?")
                .bind(tenant_id)
                .fetch_one(pool)
                .await
                .context("Failed to get document count")?;

        let chunk_count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM chunks c
            JOIN documents d ON d.id = c.document_id
            WHERE d.tenant_id = ?
            "#,
        )
        .bind(tenant_id)
        .fetch_one(pool)
        .await
        .context("Failed to get chunk count")?;

        Ok(Some(TenantStatistics {
            tenant,
            document_count,
            chunk_count,
        }))
    }
}

pub struct DocumentQueries;

impl DocumentQueries {
    #[inline]
    pub async fn create(
        pool: &SqlitePool,
        tenant_id: i64,
        name: &str,
        content: &str,
    ) -> Result<Document> {
        let now = Utc::now().naive_utc();
        let id = sqlx::query(
            "INSERT INTO documents (tenant_id, name, content, created_date) VALUES (?, ?, ?, ?)",
        )
        .bind(tenant_id)
        .bind(name)
        .bind(content)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create document")?
        .last_insert_rowid();

        debug!("Created document {} '{}' for tenant {}", id, name, tenant_id);

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created document"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Document>> {
        let result = sqlx::query_as::<_, Document>(
            "SELECT id, tenant_id, name, content, created_date FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get document by id")?;

        Ok(result)
    }

    /// Newest first, with the number of chunk rows per document
    #[inline]
    pub async fn list_by_tenant(pool: &SqlitePool, tenant_id: i64) -> Result<Vec<DocumentSummary>> {
        let documents = sqlx::query_as::<_, DocumentSummary>(
            r#"
            SELECT d.id,
                   d.tenant_id,
                   d.name,
                   LENGTH(CAST(d.content AS BLOB)) AS content_bytes,
                   (SELECT COUNT(*) FROM chunks c WHERE c.document_id = d.id) AS chunk_count,
                   d.created_date
            FROM documents d
            WHERE d.tenant_id = ?
            ORDER BY d.created_date DESC, d.id DESC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(pool)
        .await
        .context("Failed to list documents for tenant")?;

        Ok(documents)
    }

    /// Documents of a tenant whose name starts with `prefix`, matched literally
    #[inline]
    pub async fn list_by_name_prefix(
        pool: &SqlitePool,
        tenant_id: i64,
        prefix: &str,
    ) -> Result<Vec<Document>> {
        let documents = sqlx::query_as::<_, Document>(
            r#"
            SELECT id, tenant_id, name, content, created_date
            FROM documents
            WHERE tenant_id = ? AND substr(name, 1, length(?)) = ?
            ORDER BY id
            "#,
        )
        .bind(tenant_id)
        .bind(prefix)
        .bind(prefix)
        .fetch_all(pool)
        .await
        .context("Failed to list documents by name prefix")?;

        Ok(documents)
    }

    /// Delete a document; its chunk rows cascade
    #[inline]
    pub async fn delete(pool: &SqlitePool, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to delete document")?;

        Ok(result.rows_affected() > 0)
    }
}

pub struct ChunkQueries;

impl ChunkQueries {
    /// Insert all chunks of a document in one transaction
    #[inline]
    pub async fn insert_batch(pool: &SqlitePool, chunks: &[NewChunk]) -> Result<usize> {
        let mut transaction = pool
            .begin()
            .await
            .context("Failed to begin transaction for chunk insert")?;

        let now = Utc::now().naive_utc();
        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (document_id, chunk_index, content, vector_id, metadata, created_date)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(&chunk.vector_id)
            .bind(&chunk.metadata)
            .bind(now)
            .execute(&mut *transaction)
            .await
            .with_context(|| {
                format!(
                    "Failed to insert chunk {} of document {}",
                    chunk.chunk_index, chunk.document_id
                )
            })?;
        }

        transaction
            .commit()
            .await
            .context("Failed to commit chunk insert transaction")?;

        Ok(chunks.len())
    }

    #[inline]
    pub async fn list_by_document(pool: &SqlitePool, document_id: i64) -> Result<Vec<StoredChunk>> {
        let chunks = sqlx::query_as::<_, StoredChunk>(
            r#"
            SELECT id, document_id, chunk_index, content, vector_id, metadata, created_date
            FROM chunks WHERE document_id = ? ORDER BY chunk_index
            "#,
        )
        .bind(document_id)
        .fetch_all(pool)
        .await
        .context("Failed to list chunks for document")?;

        Ok(chunks)
    }

    #[inline]
    pub async fn count_by_document(pool: &SqlitePool, document_id: i64) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .fetch_one(pool)
            .await
            .context("Failed to count chunks for document")?;

        Ok(count)
    }
}
