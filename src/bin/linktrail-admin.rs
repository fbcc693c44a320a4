use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use linktrail::config::{Config, DatabaseBackend};
use linktrail::service::{CreateLinkRequest, HoursInput, LinkService, ServiceSettings};
use linktrail::storage::{MemoryStorage, SqliteStorage, Storage};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "linktrail-admin")]
#[command(about = "Linktrail link management CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a short link
    Create {
        /// Destination URL (http or https)
        url: String,
        /// Custom short code instead of a generated one
        #[arg(long)]
        code: Option<String>,
        /// Tag to attach; repeat for several
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Hours until the link stops redirecting
        #[arg(long)]
        expiry_hours: Option<f64>,
    },
    /// List links, optionally only those carrying a tag
    List {
        #[arg(long)]
        tag: Option<String>,
    },
    /// Print aggregated analytics for a short code as JSON
    Stats {
        code: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let storage: Arc<dyn Storage> = match config.database.backend {
        DatabaseBackend::Sqlite => Arc::new(
            SqliteStorage::new(&config.database.url, config.database.max_connections).await?,
        ),
        DatabaseBackend::Memory => {
            eprintln!("⚠ DATABASE_BACKEND=memory: changes are discarded when this command exits");
            Arc::new(MemoryStorage::new())
        }
    };

    // Ensure database is initialized
    storage.init().await?;

    let service = LinkService::new(
        storage,
        ServiceSettings {
            base_url: config.base_url.clone(),
            day_offset: config.analytics.day_offset()?,
        },
    );

    match cli.command {
        Commands::Create {
            url,
            code,
            tags,
            expiry_hours,
        } => {
            let request = CreateLinkRequest {
                original_url: Some(url),
                custom_code: code,
                tags: (!tags.is_empty()).then_some(tags),
                expiry_hours: expiry_hours.map(HoursInput::Number),
            };
            let created = service
                .create(request)
                .await
                .context("Failed to create link")?;
            println!("✓ Created {} -> {}", created.short_url, created.original_url);
            if let Some(expiry) = created.expiry_date {
                println!("  expires at {}", expiry.to_rfc3339());
            }
        }
        Commands::List { tag: Some(tag) } => {
            let links = service.list_by_tag(&tag).await?;
            if links.is_empty() {
                println!("No links tagged '{}'.", tag);
            } else {
                println!("{:<22} {:>8} {}", "Short code", "Visits", "Destination");
                println!("{}", "-".repeat(80));
                for link in links {
                    println!(
                        "{:<22} {:>8} {}",
                        link.short_code, link.total_visits, link.original_url
                    );
                }
            }
        }
        Commands::List { tag: None } => {
            let links = service.list_all().await?;
            if links.is_empty() {
                println!("No links found.");
            } else {
                println!(
                    "{:<22} {:>8} {:>8} {}",
                    "Short code", "Visits", "Unique", "Destination"
                );
                println!("{}", "-".repeat(80));
                for link in links {
                    println!(
                        "{:<22} {:>8} {:>8} {}",
                        link.short_code,
                        link.analytics.total_visits,
                        link.analytics.unique_visitors,
                        link.original_url
                    );
                }
            }
        }
        Commands::Stats { code } => {
            let view = service
                .analytics(&code)
                .await
                .with_context(|| format!("No analytics for '{}'", code))?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
    }

    Ok(())
}
