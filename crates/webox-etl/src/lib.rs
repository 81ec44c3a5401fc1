//! Webox ETL Library
//!
//! Ingestion pipeline for client invoice files: reads a delimited source
//! file, maps its rows into `faturamento` records under the configured
//! storage mode, writes them in one all-or-nothing transaction, and records
//! every attempt in the `etl_jobs` ledger.
//!
//! # Example
//!
//! ```no_run
//! use tokio_util::sync::CancellationToken;
//! use webox_etl::{EtlConfig, EtlPipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = EtlConfig::load()?;
//!     let pool = sqlx::PgPool::connect(&config.database.url).await?;
//!     let pipeline = EtlPipeline::new(pool, config.ingest);
//!
//!     let cancel = CancellationToken::new();
//!     let outcome = pipeline
//!         .ingest_file("cliente_acme", "inbox/cliente_acme__jan.csv".as_ref(), &cancel)
//!         .await?;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod ledger;
pub mod mapper;
pub mod pipeline;
pub mod schema;
pub mod source;
pub mod transaction;
pub mod watcher;

// Re-export the types most callers need
pub use config::EtlConfig;
pub use error::{EtlError, Result};
pub use pipeline::{EtlPipeline, Outcome};
pub use schema::StorageMode;
pub use watcher::InboxWatcher;
