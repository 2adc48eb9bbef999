mod import;
mod progress;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use appfeed_feed::CancelToken;
use import::ImportCommands;

#[derive(Debug, Parser)]
#[command(name = "appfeed-cli")]
#[command(about = "Vendor app catalog importer")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Import catalog items from the vendor feed
    Import {
        #[command(subcommand)]
        command: ImportCommands,
    },
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Test the database connection
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "appfeed-cli failed");
            eprintln!("error: {err:#}");
            ExitCode::from(import::EXIT_FATAL)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = appfeed_core::load_app_config()?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Some(Commands::Import { command }) => match command {
            ImportCommands::Run(args) => {
                let cancel = cancel_on_ctrl_c();
                import::run_import(&config, &args, cancel).await
            }
            ImportCommands::Item { id, dry_run } => {
                import::run_import_item(&config, &id, dry_run).await
            }
            ImportCommands::Runs { limit } => {
                import::run_list_runs(&config, limit).await?;
                Ok(ExitCode::SUCCESS)
            }
        },
        Some(Commands::Db { command }) => {
            let pool = appfeed_db::connect_pool_from_config(&config).await?;
            match command {
                DbCommands::Ping => {
                    appfeed_db::ping(&pool).await?;
                    println!("database connection ok");
                }
                DbCommands::Migrate => {
                    let applied = appfeed_db::run_migrations(&pool).await?;
                    println!("applied {applied} migration(s)");
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        None => {
            println!("appfeed-cli ready; see --help for commands");
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// What a Ctrl-C does at this point in the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    /// Stop before the next page; the item in flight finishes.
    Cancel,
    /// Already cancelling; exit right away.
    Abort,
}

fn on_interrupt(token: &CancelToken) -> Interrupt {
    if token.is_cancelled() {
        Interrupt::Abort
    } else {
        token.cancel();
        Interrupt::Cancel
    }
}

/// Token that flips on the first Ctrl-C. Pagination checks it before each
/// page fetch, so the item in flight still finishes. A second Ctrl-C exits
/// immediately, even mid-backoff.
fn cancel_on_ctrl_c() -> CancelToken {
    let cancel = CancelToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for Ctrl-C");
                return;
            }
            match on_interrupt(&token) {
                Interrupt::Cancel => tracing::warn!(
                    "received Ctrl-C, stopping before the next page; press again to abort"
                ),
                Interrupt::Abort => {
                    tracing::warn!("received second Ctrl-C, aborting");
                    std::process::exit(i32::from(import::EXIT_FATAL));
                }
            }
        }
    });
    cancel
}

/// Marks `run_id` failed, logging instead of propagating if that write fails.
pub(crate) async fn fail_run_best_effort(
    pool: &sqlx::PgPool,
    run_id: i64,
    message: String,
    counts: appfeed_db::ImportRunCounts,
) {
    if let Err(mark_err) = appfeed_db::fail_import_run(pool, run_id, &message, counts).await {
        tracing::error!(
            run_id,
            error = %mark_err,
            "failed to mark import run as failed"
        );
    }
}
