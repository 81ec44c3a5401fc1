//! Ingestion Transaction: all-or-nothing insert of one file's rows.
//!
//! The caller opens the transaction and commits after this returns; any row
//! error propagates out and the dropped transaction rolls back, so either
//! every row of the file lands in the invoice table or none do. Inserts
//! only; this component never updates or deletes.

use sqlx::{Postgres, Transaction};
use tracing::debug;

use crate::error::Result;
use crate::mapper::MappedBatch;

/// Insert all mapped rows for one (client, file) pair inside `tx`.
/// `linha_numero` is the 1-based position in file order. Returns the number
/// of rows written.
pub async fn insert_batch(
    tx: &mut Transaction<'_, Postgres>,
    table: &str,
    cliente_id: &str,
    arquivo_nome: &str,
    batch: &MappedBatch,
) -> Result<i32> {
    match batch {
        MappedBatch::Fixed(rows) => {
            let sql = fixed_insert_sql(table);
            for (idx, rec) in rows.iter().enumerate() {
                sqlx::query(&sql)
                    .bind(cliente_id)
                    .bind(arquivo_nome)
                    .bind((idx + 1) as i32)
                    .bind(rec.data_emissao)
                    .bind(rec.data_vencimento)
                    .bind(&rec.valor_total)
                    .bind(&rec.status)
                    .bind(&rec.raw)
                    .execute(&mut **tx)
                    .await?;
            }
        },
        MappedBatch::Raw(rows) => {
            let sql = raw_insert_sql(table);
            for (idx, raw) in rows.iter().enumerate() {
                sqlx::query(&sql)
                    .bind(cliente_id)
                    .bind(arquivo_nome)
                    .bind((idx + 1) as i32)
                    .bind(raw)
                    .execute(&mut **tx)
                    .await?;
            }
        },
        MappedBatch::Dynamic { columns, rows } => {
            let sql = dynamic_insert_sql(table, columns);
            for (idx, cells) in rows.iter().enumerate() {
                let mut query = sqlx::query(&sql)
                    .bind(cliente_id)
                    .bind(arquivo_nome)
                    .bind((idx + 1) as i32);
                for cell in cells {
                    query = query.bind(cell);
                }
                query.execute(&mut **tx).await?;
            }
        },
    }

    let count = batch.len() as i32;
    debug!(table, cliente_id, arquivo_nome, rows = count, "batch inserted");
    Ok(count)
}

fn fixed_insert_sql(table: &str) -> String {
    format!(
        r#"
        INSERT INTO "{table}" (
            cliente_id, arquivo_nome, linha_numero,
            data_emissao, data_vencimento, valor_total, status, raw
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#
    )
}

fn raw_insert_sql(table: &str) -> String {
    format!(
        r#"
        INSERT INTO "{table}" (cliente_id, arquivo_nome, linha_numero, raw)
        VALUES ($1, $2, $3, $4)
        "#
    )
}

fn dynamic_insert_sql(table: &str, columns: &[String]) -> String {
    let column_list = columns
        .iter()
        .map(|c| format!(r#""{c}""#))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (0..columns.len())
        .map(|i| format!("${}", i + 4))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"
        INSERT INTO "{table}" (cliente_id, arquivo_nome, linha_numero, {column_list})
        VALUES ($1, $2, $3, {placeholders})
        "#
    )
}
