//! Source file reading.
//!
//! Clients deliver invoice spreadsheets as CSV exports. This module reads one
//! file into normalized header names plus raw string cells; all typing and
//! storage decisions happen later in the mapper and schema adapter.

use std::path::Path;

use tracing::debug;
use webox_common::text::normalize_column_name;

use crate::error::{EtlError, Result};

/// Column names owned by the table's own metadata. A source file may not
/// occupy these; colliding headers are renamed on read.
pub const RESERVED_COLUMNS: &[&str] = &[
    "id",
    "cliente_id",
    "arquivo_nome",
    "linha_numero",
    "created_at",
    "raw",
];

/// One source file, read fully into memory.
///
/// `columns` are normalized and reserved-renamed; `rows` keep the original
/// cell order, with blank cells as `None`. Ragged rows are preserved as read
/// and rejected later by the mapper, which knows the row number.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub arquivo_nome: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl SourceFile {
    /// Read a CSV file: normalize headers, rename reserved collisions, and
    /// collect data rows. Fails with [`EtlError::EmptyFile`] when the file
    /// has a header but no data rows.
    pub fn read(path: &Path) -> Result<SourceFile> {
        let arquivo_nome = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| EtlError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("path has no file name: {}", path.display()),
            )))?;

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)?;

        let headers = reader.headers()?.clone();
        let mut columns: Vec<String> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let name = normalize_column_name(h);
                if name.is_empty() {
                    // Headerless column, same convention pandas would give it
                    format!("col_{}", i + 1)
                } else {
                    name
                }
            })
            .collect();
        columns = rename_reserved_columns(columns);

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let cells: Vec<Option<String>> = record
                .iter()
                .map(|c| {
                    let c = c.trim();
                    if c.is_empty() {
                        None
                    } else {
                        Some(c.to_string())
                    }
                })
                .collect();
            rows.push(cells);
        }

        if rows.is_empty() {
            return Err(EtlError::EmptyFile);
        }

        debug!(
            arquivo = %arquivo_nome,
            columns = columns.len(),
            rows = rows.len(),
            "source file read"
        );

        Ok(SourceFile {
            arquivo_nome,
            columns,
            rows,
        })
    }
}

/// Rename header columns that collide with the table's reserved metadata
/// columns: `cliente_id` becomes `cliente_id_planilha`, then `_2`, `_3`...
/// until the name is free.
fn rename_reserved_columns(columns: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(columns.len());

    for col in &columns {
        if !RESERVED_COLUMNS.contains(&col.as_str()) {
            out.push(col.clone());
            continue;
        }

        let mut candidate = format!("{col}_planilha");
        let mut suffix = 2;
        while RESERVED_COLUMNS.contains(&candidate.as_str())
            || columns.contains(&candidate)
            || out.contains(&candidate)
        {
            candidate = format!("{col}_planilha_{suffix}");
            suffix += 1;
        }
        debug!(from = %col, to = %candidate, "renamed reserved source column");
        out.push(candidate);
    }

    out
}

/// Derive the client id from the file-name convention
/// `<cliente_id>__qualquer_coisa.csv`; falls back to `default` when the stem
/// carries no `__` separator.
pub fn extract_cliente_id(path: &Path, default: &str) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    match stem.split_once("__") {
        Some((cliente, _)) if !cliente.is_empty() => cliente.to_string(),
        _ => default.to_string(),
    }
}
