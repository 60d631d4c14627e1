use super::*;
use sqlx::sqlite::SqlitePoolOptions;
use tempfile::TempDir;

async fn create_test_pool() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("test.db");

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(
            sqlx::sqlite::SqliteConnectOptions::new()
                .filename(&db_path)
                .create_if_missing(true)
                .foreign_keys(true),
        )
        .await
        .expect("Failed to create test pool");

    sqlx::migrate!("src/database/sqlite/migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    (temp_dir, pool)
}

async fn create_tenant(pool: &SqlitePool, name: &str) -> Tenant {
    TenantQueries::create(
        pool,
        NewTenant {
            name: name.to_string(),
            ..NewTenant::default()
        },
    )
    .await
    .expect("Failed to create tenant")
}

fn new_chunk(document_id: i64, index: i64) -> NewChunk {
    NewChunk {
        document_id,
        chunk_index: index,
        content: format!("chunk {index}"),
        vector_id: format!("{document_id}-{index}"),
        metadata: None,
    }
}

#[tokio::test]
async fn tenant_crud_operations() {
    let (_temp_dir, pool) = create_test_pool().await;

    let created = TenantQueries::create(
        &pool,
        NewTenant {
            name: "Acme".to_string(),
            helpdesk_domain: Some("acme.freshdesk.com".to_string()),
            helpdesk_api_key: Some("key".to_string()),
            ..NewTenant::default()
        },
    )
    .await
    .expect("Failed to create tenant");

    assert_eq!(created.name, "Acme");
    assert!(created.helpdesk_credentials().is_some());

    let fetched = TenantQueries::get_by_id(&pool, created.id)
        .await
        .expect("Failed to get tenant")
        .expect("Tenant should exist");
    assert_eq!(fetched, created);

    create_tenant(&pool, "Globex").await;
    let all = TenantQueries::list_all(&pool)
        .await
        .expect("Failed to list tenants");
    assert_eq!(all.len(), 2);
    assert!(
        TenantQueries::get_by_id(&pool, 999)
            .await
            .expect("Failed to get tenant")
            .is_none()
    );
}

#[tokio::test]
async fn document_lifecycle_with_chunks() {
    let (_temp_dir, pool) = create_test_pool().await;
    let tenant = create_tenant(&pool, "Acme").await;

    let document = DocumentQueries::create(&pool, tenant.id, "Returns", "Return within 30 days.")
        .await
        .expect("Failed to create document");
    assert_eq!(document.tenant_id, tenant.id);
    assert_eq!(document.content, "Return within 30 days.");

    let chunks: Vec<NewChunk> = (0..3).map(|i| new_chunk(document.id, i)).collect();
    let inserted = ChunkQueries::insert_batch(&pool, &chunks)
        .await
        .expect("Failed to insert chunks");
    assert_eq!(inserted, 3);

    let stored = ChunkQueries::list_by_document(&pool, document.id)
        .await
        .expect("Failed to list chunks");
    let indices: Vec<i64> = stored.iter().map(|c| c.chunk_index).collect();
    assert_eq!(indices, vec![0, 1, 2]);

    let summaries = DocumentQueries::list_by_tenant(&pool, tenant.id)
        .await
        .expect("Failed to list documents");
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].chunk_count, 3);
    assert_eq!(summaries[0].content_bytes, 22);

    assert!(
        DocumentQueries::delete(&pool, document.id)
            .await
            .expect("Failed to delete document")
    );
    assert_eq!(
        ChunkQueries::count_by_document(&pool, document.id)
            .await
            .expect("Failed to count chunks"),
        0
    );
}

#[tokio::test]
async fn chunk_batch_is_atomic() {
    let (_temp_dir, pool) = create_test_pool().await;
    let tenant = create_tenant(&pool, "Acme").await;
    let document = DocumentQueries::create(&pool, tenant.id, "Doc", "content")
        .await
        .expect("Failed to create document");

    // Same chunk index twice violates the unique constraint on the second row
    let chunks = vec![new_chunk(document.id, 0), NewChunk {
        vector_id: "other".to_string(),
        ..new_chunk(document.id, 0)
    }];
    assert!(ChunkQueries::insert_batch(&pool, &chunks).await.is_err());

    assert_eq!(
        ChunkQueries::count_by_document(&pool, document.id)
            .await
            .expect("Failed to count chunks"),
        0
    );
}

#[tokio::test]
async fn name_prefix_is_tenant_scoped_and_literal() {
    let (_temp_dir, pool) = create_test_pool().await;
    let acme = create_tenant(&pool, "Acme").await;
    let globex = create_tenant(&pool, "Globex").await;

    for name in [
        "Learned from tickets (2024-01-01)",
        "Learned from tickets (2024-02-01)",
        "Learned: where is my order",
        "Shipping FAQ",
    ] {
        DocumentQueries::create(&pool, acme.id, name, "text")
            .await
            .expect("Failed to create document");
    }
    DocumentQueries::create(&pool, globex.id, "Learned from tickets (2024-01-01)", "text")
        .await
        .expect("Failed to create document");
    DocumentQueries::create(&pool, acme.id, "Learned_from%tickets", "text")
        .await
        .expect("Failed to create document");

    let learned = DocumentQueries::list_by_name_prefix(&pool, acme.id, LEARNED_DOCUMENT_PREFIX)
        .await
        .expect("Failed to list by prefix");

    assert_eq!(learned.len(), 2);
    assert!(learned.iter().all(|d| d.tenant_id == acme.id));
    assert!(learned.iter().all(Document::is_learned));
}

#[tokio::test]
async fn tenant_statistics_and_cascade() {
    let (_temp_dir, pool) = create_test_pool().await;
    let tenant = create_tenant(&pool, "Acme").await;

    for name in ["One", "Two"] {
        let document = DocumentQueries::create(&pool, tenant.id, name, "text")
            .await
            .expect("Failed to create document");
        let chunks: Vec<NewChunk> = (0..2).map(|i| new_chunk(document.id, i)).collect();
        ChunkQueries::insert_batch(&pool, &chunks)
            .await
            .expect("Failed to insert chunks");
    }

    let stats = TenantQueries::get_statistics(&pool, tenant.id)
        .await
        .expect("Failed to get statistics")
        .expect("Tenant should exist");
    assert_eq!(stats.document_count, 2);
    assert_eq!(stats.chunk_count, 4);

    assert!(
        TenantQueries::get_statistics(&pool, 999)
            .await
            .expect("Failed to get statistics")
            .is_none()
    );

    sqlx::query("DELETE FROM tenants WHERE id = ?")
        .bind(tenant.id)
        .execute(&pool)
        .await
        .expect("Failed to delete tenant");
    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(&pool)
        .await
        .expect("Failed to count chunks");
    assert_eq!(remaining, 0);
}

#[tokio::test]
async fn document_requires_existing_tenant() {
    let (_temp_dir, pool) = create_test_pool().await;
    assert!(
        DocumentQueries::create(&pool, 42, "Orphan", "text")
            .await
            .is_err()
    );
}
