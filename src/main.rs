use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use support_rag::commands::{
    ReplyOptions, add_tenant, delete_document, draft_reply, ingest_file, learn_from_tickets,
    learn_interaction, list_documents, list_tenants, lookup_order, show_status,
};
use support_rag::config::{get_config_dir, run_interactive_config, show_config};
use support_rag::database::sqlite::models::NewTenant;
use support_rag::reply::Tone;

#[derive(Parser)]
#[command(name = "support-rag")]
#[command(about = "Tenant-scoped knowledge base and reply drafting for customer support")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and the databases
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Manage tenants
    Tenant {
        #[command(subcommand)]
        command: TenantCommands,
    },
    /// Ingest a plain-text file into a tenant's knowledge base
    Ingest {
        tenant: i64,
        file: PathBuf,
        /// Document name, defaults to the file name
        #[arg(long)]
        name: Option<String>,
    },
    /// List a tenant's documents
    Documents { tenant: i64 },
    /// Delete a document and its vectors
    DeleteDocument { document: i64 },
    /// Learn from resolved helpdesk tickets
    Learn {
        tenant: i64,
        /// Number of resolved tickets to aim for
        #[arg(long, default_value_t = 50)]
        target: usize,
    },
    /// Store one answered question unless it is already known
    Remember {
        tenant: i64,
        question: String,
        answer: String,
    },
    /// Draft a reply to a customer message
    Reply {
        tenant: i64,
        message: String,
        /// professional, friendly or concise
        #[arg(long, default_value = "professional")]
        tone: Tone,
        /// Guidelines replacing the tenant's stored ones
        #[arg(long)]
        instructions: Option<String>,
        /// Instructions for this reply only
        #[arg(long)]
        one_time: Option<String>,
        /// Print the reply as JSON
        #[arg(long)]
        json: bool,
    },
    /// Look up orders by number or customer email
    Order { tenant: i64, query: String },
    /// Show connectivity and knowledge statistics
    Status,
}

#[derive(Subcommand)]
enum TenantCommands {
    /// Register a new tenant
    Add {
        name: String,
        #[arg(long)]
        helpdesk_domain: Option<String>,
        #[arg(long = "helpdesk-key")]
        helpdesk_api_key: Option<String>,
        #[arg(long)]
        storefront_domain: Option<String>,
        #[arg(long)]
        storefront_token: Option<String>,
        #[arg(long)]
        website: Option<String>,
        /// Standing guidelines applied to every reply
        #[arg(long)]
        instructions: Option<String>,
    },
    /// List tenants
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let base_dir = match cli.base_dir {
        Some(dir) => dir,
        None => get_config_dir().context("Could not determine the configuration directory")?,
    };

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&base_dir)?;
            } else {
                run_interactive_config(&base_dir)?;
            }
        }
        Commands::Tenant { command } => match command {
            TenantCommands::Add {
                name,
                helpdesk_domain,
                helpdesk_api_key,
                storefront_domain,
                storefront_token,
                website,
                instructions,
            } => {
                let new_tenant = NewTenant {
                    name,
                    helpdesk_domain,
                    helpdesk_api_key,
                    storefront_domain,
                    storefront_token,
                    website,
                    custom_instructions: instructions,
                };
                add_tenant(&base_dir, new_tenant).await?;
            }
            TenantCommands::List => {
                list_tenants(&base_dir).await?;
            }
        },
        Commands::Ingest { tenant, file, name } => {
            ingest_file(&base_dir, tenant, &file, name).await?;
        }
        Commands::Documents { tenant } => {
            list_documents(&base_dir, tenant).await?;
        }
        Commands::DeleteDocument { document } => {
            delete_document(&base_dir, document).await?;
        }
        Commands::Learn { tenant, target } => {
            learn_from_tickets(&base_dir, tenant, target).await?;
        }
        Commands::Remember {
            tenant,
            question,
            answer,
        } => {
            learn_interaction(&base_dir, tenant, &question, &answer).await?;
        }
        Commands::Reply {
            tenant,
            message,
            tone,
            instructions,
            one_time,
            json,
        } => {
            let options = ReplyOptions {
                tone,
                custom_instructions: instructions,
                one_time_instructions: one_time,
                json,
            };
            draft_reply(&base_dir, tenant, message, options).await?;
        }
        Commands::Order { tenant, query } => {
            lookup_order(&base_dir, tenant, &query).await?;
        }
        Commands::Status => {
            show_status(&base_dir).await?;
        }
    }

    Ok(())
}
