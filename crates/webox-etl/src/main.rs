//! Webox ETL - invoice ingestion tool

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::info;
use webox_common::logging::{init_logging, LogConfig, LogLevel};
use webox_etl::source::extract_cliente_id;
use webox_etl::{EtlConfig, EtlPipeline, InboxWatcher, Outcome};

#[derive(Parser, Debug)]
#[command(name = "webox-etl")]
#[command(author, version, about = "Webox invoice ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Ingest a single source file
    Ingest {
        /// Path to the CSV file
        file: PathBuf,

        /// Client id; defaults to the `<cliente>__` file-name prefix
        #[arg(short, long)]
        cliente: Option<String>,
    },

    /// Watch the inbox directory and ingest new files as they arrive
    Watch,

    /// Show recent ingestion jobs
    Jobs {
        /// Maximum number of jobs to list
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbose flag; environment takes precedence
    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let log_config = LogConfig {
        level: log_level,
        log_file_prefix: "webox-etl".to_string(),
        ..LogConfig::default()
    }
    .overlay_env()?;
    init_logging(&log_config)?;

    let config = EtlConfig::load()?;
    info!(
        table = %config.ingest.table_name,
        mode = %config.ingest.storage_mode,
        "configuration loaded"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs))
        .connect(&config.database.url)
        .await?;

    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;
    info!("database migrations completed");

    let pipeline = EtlPipeline::new(pool, config.ingest.clone());

    // Ctrl-C rolls back any open work and finalizes the running job as fail
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            signal_token.cancel();
        }
    });

    match cli.command {
        Command::Ingest { file, cliente } => {
            let cliente_id = cliente.unwrap_or_else(|| {
                extract_cliente_id(&file, &config.ingest.default_cliente_id)
            });
            match pipeline.ingest_file(&cliente_id, &file, &cancel).await? {
                Outcome::Ingested {
                    job_id,
                    rows_imported,
                } => {
                    info!(%job_id, rows_imported, "file ingested");
                },
                Outcome::Skipped => {
                    info!("file already ingested, nothing to do");
                },
                Outcome::Failed {
                    job_id,
                    error_message,
                } => {
                    anyhow::bail!("ingestion failed (job {job_id}): {error_message}");
                },
            }
        },
        Command::Watch => {
            let watcher = InboxWatcher::new(pipeline, &config.ingest);
            watcher.run(cancel).await;
        },
        Command::Jobs { limit } => {
            let jobs = pipeline.ledger().recent(limit).await?;
            if jobs.is_empty() {
                println!("No ingestion jobs recorded.");
            }
            for job in jobs {
                println!(
                    "{}  {:<7}  {:>6} rows  {}  {}{}",
                    job.started_at.format("%Y-%m-%d %H:%M:%S"),
                    job.status,
                    job.rows_imported,
                    job.cliente_id,
                    job.arquivo_nome,
                    job.error_message
                        .as_deref()
                        .map(|m| format!("  [{m}]"))
                        .unwrap_or_default(),
                );
            }
        },
    }

    Ok(())
}
