//! Pipeline Orchestrator: drives one file through read, map, schema,
//! transaction, and ledger.
//!
//! One call to [`EtlPipeline::ingest_file`] is one ingestion attempt. The
//! attempt holds a PostgreSQL advisory lock for its (client, file) pair, so
//! concurrent attempts for the same pair serialize and the loser observes
//! the winner's outcome through the idempotency check. Every attempt that
//! begins a job also finalizes it, including on mapping errors and
//! cancellation, so no `etl_jobs` row is left without `finished_at`.

use std::path::Path;

use sha2::{Digest, Sha256};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::IngestConfig;
use crate::error::{EtlError, Result};
use crate::ledger::{JobLedger, JobOutcome};
use crate::mapper::map_file;
use crate::schema::SchemaAdapter;
use crate::source::SourceFile;
use crate::transaction::insert_batch;

/// Result of one ingestion attempt.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// File committed; a `success` job row exists.
    Ingested { job_id: Uuid, rows_imported: i32 },
    /// A `success` job already existed; nothing was read or written.
    Skipped,
    /// The attempt failed; a `fail` job row records the error. Zero invoice
    /// rows were committed.
    Failed { job_id: Uuid, error_message: String },
}

/// The ETL pipeline for one configured invoice table.
#[derive(Clone)]
pub struct EtlPipeline {
    pool: PgPool,
    ingest: IngestConfig,
    adapter: SchemaAdapter,
    ledger: JobLedger,
}

impl EtlPipeline {
    pub fn new(pool: PgPool, ingest: IngestConfig) -> Self {
        let adapter = SchemaAdapter::new(pool.clone(), ingest.table_name.clone());
        let ledger = JobLedger::new(pool.clone());
        Self {
            pool,
            ingest,
            adapter,
            ledger,
        }
    }

    pub fn ledger(&self) -> &JobLedger {
        &self.ledger
    }

    /// Run one ingestion attempt for (client, file).
    ///
    /// Returns `Ok` with the attempt outcome. [`Outcome::Failed`] is fully
    /// recorded in the ledger and is not an error of the pipeline itself;
    /// `Err` means the attempt could not be recorded at all (store
    /// unreachable) and the caller decides about retry.
    #[instrument(skip(self, cancel), fields(table = %self.ingest.table_name))]
    pub async fn ingest_file(
        &self,
        cliente_id: &str,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        let arquivo_nome = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                EtlError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("path has no file name: {}", path.display()),
                ))
            })?;

        // Serialize attempts for the same (client, file) pair. Held on a
        // dedicated connection; the server releases it if we disappear.
        let key = advisory_key(cliente_id, &arquivo_nome);
        let mut conn = self.pool.acquire().await?;
        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(key)
            .execute(&mut *conn)
            .await?;

        let result = self
            .locked_attempt(cliente_id, &arquivo_nome, path, cancel)
            .await;

        let unlock = sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(key)
            .execute(&mut *conn)
            .await;
        if let Err(error) = unlock {
            warn!(%error, key, "failed to release advisory lock");
        }

        result
    }

    async fn locked_attempt(
        &self,
        cliente_id: &str,
        arquivo_nome: &str,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        if self.ledger.has_succeeded(cliente_id, arquivo_nome).await? {
            info!(cliente_id, arquivo_nome, "file already ingested, skipping");
            return Ok(Outcome::Skipped);
        }

        let handle = self.ledger.begin(cliente_id, arquivo_nome).await?;
        let job_id = handle.id();

        match self.run_job(cliente_id, arquivo_nome, path, cancel).await {
            Ok(rows_imported) => {
                self.ledger
                    .finish(handle, JobOutcome::Success, rows_imported, None)
                    .await?;
                info!(%job_id, cliente_id, arquivo_nome, rows_imported, "ingestion succeeded");
                Ok(Outcome::Ingested {
                    job_id,
                    rows_imported,
                })
            },
            Err(error) => {
                let error_message =
                    truncate_error(&error.to_string(), self.ingest.error_message_limit);
                warn!(%job_id, cliente_id, arquivo_nome, %error, "ingestion failed");
                self.ledger
                    .finish(handle, JobOutcome::Fail, 0, Some(&error_message))
                    .await?;
                Ok(Outcome::Failed {
                    job_id,
                    error_message,
                })
            },
        }
    }

    /// Mapping + committing phases. Any `Err` here rolls back everything and
    /// turns into a `fail` job row in the caller.
    async fn run_job(
        &self,
        cliente_id: &str,
        arquivo_nome: &str,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<i32> {
        if cancel.is_cancelled() {
            return Err(EtlError::Cancelled);
        }

        let source = SourceFile::read(path)?;
        let batch = map_file(self.ingest.storage_mode, &source)?;
        self.adapter.prepare(&batch).await?;

        if cancel.is_cancelled() {
            return Err(EtlError::Cancelled);
        }

        let mut tx = self.pool.begin().await?;
        let rows = insert_batch(&mut tx, &self.ingest.table_name, cliente_id, arquivo_nome, &batch)
            .await?;

        if cancel.is_cancelled() {
            tx.rollback().await?;
            return Err(EtlError::Cancelled);
        }

        tx.commit().await?;
        Ok(rows)
    }
}

/// Stable 64-bit advisory-lock key for one (client, file) pair.
fn advisory_key(cliente_id: &str, arquivo_nome: &str) -> i64 {
    let mut hasher = Sha256::new();
    hasher.update(cliente_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(arquivo_nome.as_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(bytes)
}

/// Bound the persisted error text, respecting char boundaries.
fn truncate_error(message: &str, limit: usize) -> String {
    if message.chars().count() <= limit {
        message.to_string()
    } else {
        message.chars().take(limit).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advisory_key_is_stable_and_pair_sensitive() {
        let a = advisory_key("cliente_acme", "jan.csv");
        assert_eq!(a, advisory_key("cliente_acme", "jan.csv"));
        assert_ne!(a, advisory_key("cliente_acme", "fev.csv"));
        assert_ne!(a, advisory_key("grupo_x", "jan.csv"));
        // The separator keeps ("ab", "c") and ("a", "bc") apart.
        assert_ne!(advisory_key("ab", "c"), advisory_key("a", "bc"));
    }

    #[test]
    fn test_truncate_error_respects_char_boundaries() {
        assert_eq!(truncate_error("curto", 10), "curto");
        assert_eq!(truncate_error("planilha inválida", 12), "planilha inv");
        assert_eq!(truncate_error("ação", 2), "aç");
    }
}
