//! Schema Adapter: storage modes and dynamic column evolution.
//!
//! In dynamic mode the target table grows with the files: unseen columns are
//! created before the first insert of a job, add-column only, always as TEXT
//! so inserts never hit a type conflict. Evolution is serialized through a
//! process-level mutex around a lazily loaded known-columns set, and the DDL
//! uses `IF NOT EXISTS` so concurrent processes stay idempotent.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::{EtlError, Result};
use crate::mapper::MappedBatch;
use crate::source::RESERVED_COLUMNS;

/// Payload storage strategy for the invoice table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    /// Typed invoice fields plus the full row in `raw` JSONB.
    #[default]
    FixedColumns,
    /// The full row in `raw` JSONB only.
    RawJson,
    /// One table column per discovered source column.
    DynamicColumns,
}

impl std::str::FromStr for StorageMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fixed" | "fixed_columns" => Ok(StorageMode::FixedColumns),
            "raw" | "json" | "raw_json" => Ok(StorageMode::RawJson),
            "dynamic" | "dynamic_columns" => Ok(StorageMode::DynamicColumns),
            _ => Err(anyhow::anyhow!("Invalid storage mode: {}", s)),
        }
    }
}

impl std::fmt::Display for StorageMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageMode::FixedColumns => write!(f, "fixed_columns"),
            StorageMode::RawJson => write!(f, "raw_json"),
            StorageMode::DynamicColumns => write!(f, "dynamic_columns"),
        }
    }
}

/// Reconciles a file's column set with the target table.
#[derive(Clone)]
pub struct SchemaAdapter {
    pool: PgPool,
    table: String,
    // None until first loaded from information_schema; the mutex is the
    // serialization point for all schema evolution in this process.
    known_columns: Arc<Mutex<Option<HashSet<String>>>>,
}

impl SchemaAdapter {
    pub fn new(pool: PgPool, table: impl Into<String>) -> Self {
        Self {
            pool,
            table: table.into(),
            known_columns: Arc::new(Mutex::new(None)),
        }
    }

    /// Make sure the table can accept the batch. A no-op outside dynamic
    /// mode; in dynamic mode, adds any unseen columns before insert.
    pub async fn prepare(&self, batch: &MappedBatch) -> Result<()> {
        match batch {
            MappedBatch::Dynamic { columns, .. } => self.ensure_columns(columns).await,
            _ => Ok(()),
        }
    }

    async fn ensure_columns(&self, columns: &[String]) -> Result<()> {
        for col in columns {
            validate_dynamic_column(col)?;
        }

        let mut guard = self.known_columns.lock().await;
        if guard.is_none() {
            *guard = Some(self.existing_columns().await?);
        }
        let known = guard.get_or_insert_with(HashSet::new);

        let novas: Vec<&String> = columns.iter().filter(|c| !known.contains(*c)).collect();
        if novas.is_empty() {
            return Ok(());
        }

        info!(
            table = %self.table,
            count = novas.len(),
            columns = ?novas,
            "adding new columns to invoice table"
        );

        for col in novas {
            let ddl = format!(
                r#"ALTER TABLE "{}" ADD COLUMN IF NOT EXISTS "{}" TEXT"#,
                self.table, col
            );
            sqlx::query(&ddl).execute(&self.pool).await?;
            known.insert(col.clone());
        }

        Ok(())
    }

    async fn existing_columns(&self) -> Result<HashSet<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT column_name
            FROM information_schema.columns
            WHERE table_name = $1
              AND table_schema = current_schema()
            "#,
        )
        .bind(&self.table)
        .fetch_all(&self.pool)
        .await?;

        Ok(names.into_iter().collect())
    }
}

/// A dynamic column must be a plain lowercase identifier and must not shadow
/// the table's reserved metadata columns. The source reader renames reserved
/// headers before they get here; this is the enforcement point for whatever
/// slips through.
fn validate_dynamic_column(col: &str) -> Result<()> {
    if RESERVED_COLUMNS.contains(&col) {
        return Err(EtlError::SchemaEvolution(format!(
            "column {col:?} collides with a reserved table column"
        )));
    }

    let valid = !col.is_empty()
        && col
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !valid {
        return Err(EtlError::SchemaEvolution(format!(
            "column {col:?} is not a valid identifier"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_mode_from_str() {
        assert_eq!("fixed".parse::<StorageMode>().unwrap(), StorageMode::FixedColumns);
        assert_eq!("RAW_JSON".parse::<StorageMode>().unwrap(), StorageMode::RawJson);
        assert_eq!("dynamic".parse::<StorageMode>().unwrap(), StorageMode::DynamicColumns);
        assert!("colunas".parse::<StorageMode>().is_err());
    }

    #[test]
    fn test_storage_mode_default_is_fixed() {
        assert_eq!(StorageMode::default(), StorageMode::FixedColumns);
    }

    #[test]
    fn test_validate_rejects_reserved_column() {
        let err = validate_dynamic_column("cliente_id").unwrap_err();
        assert!(matches!(err, EtlError::SchemaEvolution(_)));
    }

    #[test]
    fn test_validate_rejects_non_identifier() {
        assert!(validate_dynamic_column("").is_err());
        assert!(validate_dynamic_column("Maiúscula").is_err());
        assert!(validate_dynamic_column("a;b").is_err());
        assert!(validate_dynamic_column("valor_total_r").is_ok());
        assert!(validate_dynamic_column("2024_total").is_ok());
    }
}
