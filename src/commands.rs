use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tracing::{error, info};

use crate::config::Config;
use crate::database::sqlite::models::NewTenant;
use crate::database::{Database, VectorStore};
use crate::embeddings::OllamaClient;
use crate::harvester::HarvestProgress;
use crate::knowledge::LearnOutcome;
use crate::pipeline::Pipeline;
use crate::reply::{ReplyRequest, Tone};

async fn load_config(config_dir: &Path) -> Result<Config> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;
    tokio::fs::create_dir_all(config.get_base_dir())
        .await
        .with_context(|| format!("Failed to create {}", config_dir.display()))?;
    Ok(config)
}

async fn open_pipeline(config_dir: &Path) -> Result<Pipeline> {
    let config = load_config(config_dir).await?;
    Pipeline::open(config)
        .await
        .context("Failed to initialize the support pipeline")
}

async fn open_database(config_dir: &Path) -> Result<Database> {
    let config = load_config(config_dir).await?;
    Database::new(config.database_path())
        .await
        .context("Failed to initialize database")
}

/// Register a new tenant
#[inline]
pub async fn add_tenant(config_dir: &Path, new_tenant: NewTenant) -> Result<()> {
    let database = open_database(config_dir).await?;
    let tenant = database
        .create_tenant(new_tenant)
        .await
        .context("Failed to create tenant")?;

    println!("Created tenant: {} (ID: {})", tenant.name, tenant.id);
    if let Some(credentials) = tenant.helpdesk_credentials() {
        println!("   Helpdesk: {}", credentials.base_url());
    }
    if let Some(credentials) = tenant.storefront_credentials() {
        println!("   Storefront: {}", credentials.base_url());
    }
    Ok(())
}

/// List tenants with their knowledge statistics
#[inline]
pub async fn list_tenants(config_dir: &Path) -> Result<()> {
    let database = open_database(config_dir).await?;
    let tenants = database.list_tenants().await.context("Failed to list tenants")?;

    if tenants.is_empty() {
        println!("No tenants have been added yet.");
        println!("Use 'support-rag tenant add <name>' to add one.");
        return Ok(());
    }

    println!("Tenants ({} total):", tenants.len());
    println!();

    for tenant in &tenants {
        println!("🏪 {} (ID: {})", tenant.name, tenant.id);
        println!(
            "   Helpdesk: {}",
            tenant
                .helpdesk_credentials()
                .map_or_else(|| "not configured".to_string(), |c| c.base_url().to_string())
        );
        println!(
            "   Storefront: {}",
            tenant
                .storefront_credentials()
                .map_or_else(|| "not configured".to_string(), |c| c.base_url().to_string())
        );
        if let Some(website) = &tenant.website {
            println!("   Website: {}", website);
        }

        match database.tenant_statistics(tenant.id).await {
            Ok(Some(stats)) => {
                println!("   Documents: {}", stats.document_count);
                println!("   Chunks: {}", stats.chunk_count);
            }
            Ok(None) => println!("   Statistics: Not available"),
            Err(e) => println!("   Statistics: Error - {}", e),
        }

        println!(
            "   Created: {}",
            tenant.created_date.format("%Y-%m-%d %H:%M:%S")
        );
        println!();
    }

    Ok(())
}

/// Ingest a plain-text file as a knowledge document
#[inline]
pub async fn ingest_file(
    config_dir: &Path,
    tenant_id: i64,
    file: &Path,
    name: Option<String>,
) -> Result<()> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let name = name.unwrap_or_else(|| {
        file.file_stem()
            .map_or_else(|| "Untitled".to_string(), |s| s.to_string_lossy().into_owned())
    });

    let pipeline = open_pipeline(config_dir).await?;
    info!("Ingesting {} for tenant {}", file.display(), tenant_id);
    let outcome = pipeline.ingest(tenant_id, &name, &content).await?;

    println!("✅ Ingested '{}' (document ID: {})", name, outcome.document_id);
    println!("   Chunks: {}", outcome.chunk_count);
    Ok(())
}

/// Record a single answered question, skipping ones the tenant already knows
#[inline]
pub async fn learn_interaction(
    config_dir: &Path,
    tenant_id: i64,
    question: &str,
    answer: &str,
) -> Result<()> {
    let pipeline = open_pipeline(config_dir).await?;
    match pipeline.learn_interaction(tenant_id, question, answer).await? {
        LearnOutcome::Duplicate { similarity } => {
            println!(
                "Already known ({:.0}% similar to existing knowledge), nothing stored",
                similarity * 100.0
            );
        }
        LearnOutcome::Learned(outcome) => {
            println!("✅ Learned interaction (document ID: {})", outcome.document_id);
        }
    }
    Ok(())
}

/// List a tenant's documents
#[inline]
pub async fn list_documents(config_dir: &Path, tenant_id: i64) -> Result<()> {
    let pipeline = open_pipeline(config_dir).await?;
    let documents = pipeline.knowledge().list_documents(tenant_id).await?;

    if documents.is_empty() {
        println!("Tenant {} has no documents yet.", tenant_id);
        return Ok(());
    }

    println!("Documents for tenant {} ({} total):", tenant_id, documents.len());
    for document in &documents {
        println!(
            "   [{}] {} - {} bytes, {} chunks, added {}",
            document.id,
            document.name,
            document.content_bytes,
            document.chunk_count,
            document.created_date.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

/// Delete a document with its vectors
#[inline]
pub async fn delete_document(config_dir: &Path, document_id: i64) -> Result<()> {
    let pipeline = open_pipeline(config_dir).await?;
    if pipeline.knowledge().delete_document(document_id).await? {
        println!("✓ Document {} deleted", document_id);
    } else {
        println!("Document {} not found", document_id);
    }
    Ok(())
}

fn progress_bar() -> ProgressBar {
    if console::user_attended_stderr() {
        ProgressBar::new(0).with_style(
            ProgressStyle::with_template("{spinner} [{pos}/{len}] {msg}")
                .expect("style template is valid"),
        )
    } else {
        ProgressBar::hidden()
    }
}

/// Learn from a tenant's resolved helpdesk tickets
#[inline]
pub async fn learn_from_tickets(config_dir: &Path, tenant_id: i64, target: usize) -> Result<()> {
    let pipeline = open_pipeline(config_dir).await?;
    let (sender, mut receiver) = tokio::sync::mpsc::unbounded_channel();

    let bar = progress_bar();
    let render = {
        let bar = bar.clone();
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                match event {
                    HarvestProgress::Discovered {
                        strategy,
                        found,
                        target,
                    } => {
                        bar.set_length(target as u64);
                        bar.set_position(found as u64);
                        bar.set_message(format!("Discovering tickets ({strategy})"));
                    }
                    HarvestProgress::Fetched { index, total } => {
                        bar.set_length(total as u64);
                        bar.set_position(index as u64);
                        bar.set_message("Fetching conversations");
                    }
                    HarvestProgress::Indexing { conversations } => {
                        bar.set_message(format!("Indexing {conversations} conversations"));
                    }
                }
            }
        })
    };

    let result = pipeline.harvest(tenant_id, None, target, Some(&sender)).await;
    drop(sender);
    if let Err(e) = render.await {
        error!("Progress display failed: {}", e);
    }
    bar.finish_and_clear();

    let report = result?;
    println!("✅ Ticket learning complete");
    println!("   Tickets scanned: {}", report.tickets_scanned);
    println!("   Conversations learned: {}", report.conversations_learned);
    println!("   Chunks created: {}", report.chunks_created);
    if let Some(document_id) = report.document_id {
        println!("   Document ID: {}", document_id);
    } else {
        println!("   No resolved conversations with usable content were found.");
    }
    Ok(())
}

/// Options for drafting a reply from the command line
#[derive(Debug, Clone, Default)]
pub struct ReplyOptions {
    pub tone: Tone,
    pub custom_instructions: Option<String>,
    pub one_time_instructions: Option<String>,
    pub json: bool,
}

/// Draft a reply to a customer message
#[inline]
pub async fn draft_reply(
    config_dir: &Path,
    tenant_id: i64,
    message: String,
    options: ReplyOptions,
) -> Result<()> {
    let pipeline = open_pipeline(config_dir).await?;
    let request = ReplyRequest {
        tenant_id,
        customer_message: message,
        tone: options.tone,
        custom_instructions: options.custom_instructions,
        one_time_instructions: options.one_time_instructions,
    };
    let reply = pipeline.reply(&request).await?;

    if options.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&reply).context("Failed to serialize reply")?
        );
        return Ok(());
    }

    println!("{}", reply.reply);
    println!();
    if !reply.has_knowledge_base {
        println!("⚠️  No matching knowledge or order data; review before sending.");
    }
    for source in &reply.sources {
        println!("   📄 {}% {}", source.similarity, source.snippet);
    }
    Ok(())
}

/// Look up orders by number or customer email
#[inline]
pub async fn lookup_order(config_dir: &Path, tenant_id: i64, query: &str) -> Result<()> {
    let pipeline = open_pipeline(config_dir).await?;
    let result = pipeline.lookup_order(tenant_id, query).await?;

    if result.found {
        println!("{}", result.formatted_text);
    } else {
        println!("No orders found for '{}'", query.trim());
    }
    Ok(())
}

/// Show connectivity and per-tenant knowledge statistics
#[inline]
pub async fn show_status(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).unwrap_or_else(|_| Config {
        base_dir: config_dir.to_path_buf(),
        ..Config::default()
    });

    println!("📊 Support RAG Status Report");
    println!("{}", "=".repeat(50));
    println!();

    println!("🤖 Ollama Status:");
    match OllamaClient::new(&config.ollama) {
        Ok(client) => match tokio::task::spawn_blocking(move || client.health_check()).await {
            Ok(Ok(())) => {
                println!(
                    "   ✅ Ollama: Connected ({}:{})",
                    config.ollama.host, config.ollama.port
                );
                println!("   📋 Embedding model: {}", config.ollama.embedding_model);
                println!("   💬 Chat model: {}", config.ollama.chat_model);
            }
            Ok(Err(e)) => println!("   ⚠️  Ollama: Unhealthy - {:#}", e),
            Err(e) => println!("   ❌ Ollama: Health check did not complete - {}", e),
        },
        Err(e) => println!("   ❌ Ollama: Invalid configuration - {:#}", e),
    }

    println!("🔍 Vector Database Status:");
    let dimension = usize::try_from(config.ollama.embedding_dimension).unwrap_or_default();
    let store = match VectorStore::new(&config.vector_database_path(), dimension).await {
        Ok(store) => {
            println!("   ✅ LanceDB: Connected ({} dimensions)", store.dimension());
            Some(store)
        }
        Err(e) => {
            println!("   ❌ LanceDB: Failed to open - {}", e);
            None
        }
    };

    println!("🗄️  Database Status:");
    let database = match Database::new(config.database_path()).await {
        Ok(database) => {
            println!("   ✅ SQLite: Connected");
            database
        }
        Err(e) => {
            println!("   ❌ SQLite: Failed to connect - {:#}", e);
            return Ok(());
        }
    };

    println!();
    println!("🏪 Tenants:");
    let tenants = database.list_tenants().await.context("Failed to list tenants")?;
    if tenants.is_empty() {
        println!("   📭 No tenants yet");
    }
    for tenant in &tenants {
        let stats = database.tenant_statistics(tenant.id).await.ok().flatten();
        let vectors = match &store {
            Some(store) => store
                .count(Some(tenant.id))
                .await
                .map_or_else(|e| format!("error: {e}"), |n| n.to_string()),
            None => "unavailable".to_string(),
        };
        println!(
            "   {} (ID: {}): {} documents, {} chunks, {} vectors",
            tenant.name,
            tenant.id,
            stats.as_ref().map_or(0, |s| s.document_count),
            stats.as_ref().map_or(0, |s| s.chunk_count),
            vectors
        );
    }

    Ok(())
}
