use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tally::config::{Config, DatabaseBackend};
use tally::identity::IdentityHasher;
use tally::storage::{PostgresStorage, SqliteStorage, Storage};

#[derive(Parser)]
#[command(name = "tally-admin")]
#[command(about = "Tally counter administration CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show counters for a post and check them against the stored records
    Stats {
        /// Post slug
        slug: String,
    },
    /// List posts, newest first
    List {
        /// Maximum number of posts to show
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// Print the visitor identity derived from an address
    Identity {
        /// Source address as seen by the server
        address: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Identity { address } => {
            let hasher = IdentityHasher::new(&config.identity.ip_hash_secret)
                .context("cannot derive visitor identities")?;
            println!("{}", hasher.derive(&address));
        }
        Commands::Stats { slug } => {
            let storage = open_storage(&config).await?;
            let Some(post) = storage.get_post(&slug).await? else {
                bail!("no counters recorded for '{}'", slug);
            };
            let audit = storage
                .audit_post(&slug)
                .await?
                .with_context(|| format!("post '{}' disappeared during audit", slug))?;

            println!("Post:   {}", post.slug);
            if let Some(created) = chrono::DateTime::from_timestamp(post.created_at, 0) {
                println!("First:  {}", created.format("%Y-%m-%d %H:%M:%S UTC"));
            }
            println!("Views:  {} ({} view records)", audit.views, audit.view_records);
            println!(
                "Likes:  {} ({} from like records)",
                audit.likes, audit.like_records_total
            );
            if audit.is_consistent() {
                println!("✓ Counters match stored records");
            } else {
                println!("⚠ Counters differ from stored records");
            }
        }
        Commands::List { limit } => {
            let storage = open_storage(&config).await?;
            let posts = storage.list_posts(limit.max(1), None).await?;
            if posts.is_empty() {
                println!("No posts found.");
            } else {
                println!("{:<48} {:>10} {:>10}", "Slug", "Views", "Likes");
                println!("{}", "-".repeat(70));
                for post in posts {
                    println!("{:<48} {:>10} {:>10}", post.slug, post.views, post.likes);
                }
            }
        }
    }

    Ok(())
}

async fn open_storage(config: &Config) -> Result<Arc<dyn Storage>> {
    let storage: Arc<dyn Storage> = match config.database.backend {
        DatabaseBackend::Sqlite => Arc::new(
            SqliteStorage::new(&config.database.url, config.database.max_connections).await?,
        ),
        DatabaseBackend::Postgres => Arc::new(
            PostgresStorage::new(&config.database.url, config.database.max_connections).await?,
        ),
    };

    // Ensure database is initialized
    storage.init().await?;

    Ok(storage)
}
