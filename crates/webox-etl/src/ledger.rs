//! Job Ledger: lifecycle of `etl_jobs` rows.
//!
//! One row per ingestion attempt. `begin` inserts the row as `running`;
//! `finish` moves it exactly once to `success` or `fail`. The handle is
//! consumed by `finish` and is not `Clone`, so a double finish does not
//! compile; the UPDATE additionally refuses to touch a row that already has
//! `finished_at` set, so a terminal row is never overwritten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{EtlError, Result};

/// Terminal outcome of an ingestion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Success,
    Fail,
}

impl JobOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Success => "success",
            JobOutcome::Fail => "fail",
        }
    }
}

/// Proof that a job row was begun and not yet finalized.
#[derive(Debug)]
pub struct JobHandle {
    id: Uuid,
    cliente_id: String,
    arquivo_nome: String,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn cliente_id(&self) -> &str {
        &self.cliente_id
    }

    pub fn arquivo_nome(&self) -> &str {
        &self.arquivo_nome
    }
}

/// One `etl_jobs` row, as reported to operators.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct JobRecord {
    pub id: Uuid,
    pub arquivo_nome: String,
    pub cliente_id: String,
    pub status: String,
    pub rows_imported: i32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// Writes and reads `etl_jobs`. The pipeline orchestrator is the only
/// component that calls the mutating operations.
#[derive(Clone)]
pub struct JobLedger {
    pool: PgPool,
}

impl JobLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// True when a `success` job already exists for this (client, file)
    /// pair, meaning the file is fully imported and must not be re-ingested.
    pub async fn has_succeeded(&self, cliente_id: &str, arquivo_nome: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM etl_jobs
                WHERE cliente_id = $1
                  AND arquivo_nome = $2
                  AND status = 'success'
            )
            "#,
        )
        .bind(cliente_id)
        .bind(arquivo_nome)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    /// Create a `running` job row with `started_at = now()`.
    pub async fn begin(&self, cliente_id: &str, arquivo_nome: &str) -> Result<JobHandle> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO etl_jobs (id, arquivo_nome, cliente_id, status)
            VALUES ($1, $2, $3, 'running')
            "#,
        )
        .bind(id)
        .bind(arquivo_nome)
        .bind(cliente_id)
        .execute(&self.pool)
        .await?;

        debug!(job_id = %id, cliente_id, arquivo_nome, "job started");

        Ok(JobHandle {
            id,
            cliente_id: cliente_id.to_string(),
            arquivo_nome: arquivo_nome.to_string(),
        })
    }

    /// Finalize a job. Consumes the handle; refuses to touch a row that is
    /// already terminal.
    pub async fn finish(
        &self,
        handle: JobHandle,
        outcome: JobOutcome,
        rows_imported: i32,
        error_message: Option<&str>,
    ) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE etl_jobs
            SET status = $1,
                rows_imported = $2,
                error_message = $3,
                finished_at = NOW()
            WHERE id = $4
              AND finished_at IS NULL
            "#,
        )
        .bind(outcome.as_str())
        .bind(rows_imported)
        .bind(error_message)
        .bind(handle.id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated != 1 {
            return Err(EtlError::JobAlreadyFinished(handle.id));
        }

        debug!(
            job_id = %handle.id,
            outcome = outcome.as_str(),
            rows_imported,
            "job finalized"
        );

        Ok(())
    }

    /// Most recent jobs, newest first.
    pub async fn recent(&self, limit: i64) -> Result<Vec<JobRecord>> {
        let jobs = sqlx::query_as::<_, JobRecord>(
            r#"
            SELECT id, arquivo_nome, cliente_id, status, rows_imported,
                   started_at, finished_at, error_message
            FROM etl_jobs
            ORDER BY started_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_as_str() {
        assert_eq!(JobOutcome::Success.as_str(), "success");
        assert_eq!(JobOutcome::Fail.as_str(), "fail");
    }
}
