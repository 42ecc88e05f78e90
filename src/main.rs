//! # article-sync CLI (`artsync`)
//!
//! ## Usage
//!
//! ```bash
//! artsync --config ./config/article-sync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `artsync init` | Create the mirror schema/table and the index collection |
//! | `artsync sync` | Run one extract → mirror → index cycle |
//! | `artsync reconcile` | Diff the whole mirror against the index and patch drift |
//! | `artsync run` | Start the scheduler (sync every minute, reconcile every 2 days) |
//! | `artsync status` | Mirror row count and index entity count |
//! | `artsync inspect <id>` | Show one record in both stores and its drift status |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use article_sync::{config, inspect, jobs, logging, migrate, status};

/// article-sync: keep a PostgreSQL mirror and a Milvus index in step with
/// the article database.
#[derive(Parser)]
#[command(
    name = "artsync",
    about = "Sync published articles into a PostgreSQL mirror and a Milvus search index",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/article-sync.toml`. Connection URLs may also be
    /// given through ARTICLE_SYNC_SOURCE_URL, ARTICLE_SYNC_MIRROR_URL and
    /// MILVUS_TOKEN.
    #[arg(long, global = true, default_value = "./config/article-sync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the mirror schema/table and the index collection.
    ///
    /// Idempotent: existing objects are left alone.
    Init,

    /// Run one sync cycle and print a summary.
    ///
    /// Reads every published article from the source, upserts all of them
    /// into the mirror and indexes the ones the mirror did not have yet.
    Sync,

    /// Run one reconciliation pass.
    ///
    /// Re-renders every mirror row, compares it with the index copy and
    /// patches the entries that drifted.
    Reconcile {
        /// Only list drifted records with their first differing field.
        #[arg(long)]
        dry_run: bool,
    },

    /// Start the scheduler loop. Stops on Ctrl-C once the running job completes.
    Run,

    /// Show mirror and index counts.
    Status,

    /// Show one record in the mirror and the index, and whether it drifted.
    Inspect {
        /// Source article id.
        id: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Initialized successfully.");
        }
        Commands::Sync => {
            jobs::run_sync(&cfg).await?;
        }
        Commands::Reconcile { dry_run } => {
            jobs::run_reconcile(&cfg, dry_run).await?;
        }
        Commands::Run => {
            jobs::run_scheduler(&cfg).await?;
        }
        Commands::Status => {
            status::run_status(&cfg).await?;
        }
        Commands::Inspect { id } => {
            inspect::run_inspect(&cfg, id).await?;
        }
    }

    Ok(())
}
