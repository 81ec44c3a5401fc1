//! Row Mapper: turns raw source rows into storage-ready records.
//!
//! A pure transform with no database access. The output shape follows the
//! configured storage mode:
//!
//! - `FixedColumns`: the four typed invoice fields, parsed leniently, plus
//!   the whole row mirrored into a JSON payload so extra columns are kept.
//! - `RawJson`: the whole row as a JSON payload only.
//! - `DynamicColumns`: cells aligned to the discovered column list; the
//!   schema adapter creates the columns before insert.

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use sqlx::types::BigDecimal;

use crate::error::{EtlError, Result};
use crate::schema::StorageMode;
use crate::source::SourceFile;

/// One invoice row in fixed-columns storage.
#[derive(Debug, Clone)]
pub struct FixedRecord {
    pub data_emissao: Option<NaiveDate>,
    pub data_vencimento: Option<NaiveDate>,
    pub valor_total: Option<BigDecimal>,
    pub status: Option<String>,
    pub raw: Value,
}

/// All rows of one file, mapped under a single storage mode.
#[derive(Debug, Clone)]
pub enum MappedBatch {
    Fixed(Vec<FixedRecord>),
    Raw(Vec<Value>),
    Dynamic {
        columns: Vec<String>,
        rows: Vec<Vec<Option<String>>>,
    },
}

impl MappedBatch {
    pub fn len(&self) -> usize {
        match self {
            MappedBatch::Fixed(rows) => rows.len(),
            MappedBatch::Raw(rows) => rows.len(),
            MappedBatch::Dynamic { rows, .. } => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Map every row of a source file.
///
/// Fails with [`EtlError::MalformedRow`] when a row's cell count does not
/// match the header, since its values cannot be aligned to columns. Missing
/// or unparseable business fields never fail a row; they become NULL in the
/// typed columns while the original text stays in the `raw` payload.
pub fn map_file(mode: StorageMode, source: &SourceFile) -> Result<MappedBatch> {
    for (idx, cells) in source.rows.iter().enumerate() {
        if cells.len() != source.columns.len() {
            return Err(EtlError::MalformedRow {
                linha: idx + 1,
                reason: format!(
                    "expected {} cells, found {}",
                    source.columns.len(),
                    cells.len()
                ),
            });
        }
    }

    let batch = match mode {
        StorageMode::FixedColumns => MappedBatch::Fixed(
            source
                .rows
                .iter()
                .map(|cells| map_fixed(&source.columns, cells))
                .collect(),
        ),
        StorageMode::RawJson => MappedBatch::Raw(
            source
                .rows
                .iter()
                .map(|cells| row_to_json(&source.columns, cells))
                .collect(),
        ),
        StorageMode::DynamicColumns => MappedBatch::Dynamic {
            columns: source.columns.clone(),
            rows: source.rows.clone(),
        },
    };

    Ok(batch)
}

fn map_fixed(columns: &[String], cells: &[Option<String>]) -> FixedRecord {
    let cell = |name: &str| -> Option<&str> {
        columns
            .iter()
            .position(|c| c == name)
            .and_then(|i| cells[i].as_deref())
    };

    FixedRecord {
        data_emissao: cell("data_emissao").and_then(parse_date),
        data_vencimento: cell("data_vencimento").and_then(parse_date),
        valor_total: cell("valor_total").and_then(parse_decimal),
        status: cell("status").map(|s| s.to_string()),
        raw: row_to_json(columns, cells),
    }
}

/// Mirror one row as a JSON object, column name to string value or null.
fn row_to_json(columns: &[String], cells: &[Option<String>]) -> Value {
    let mut object = Map::with_capacity(columns.len());
    for (col, cell) in columns.iter().zip(cells) {
        let value = match cell {
            Some(text) => Value::String(text.clone()),
            None => Value::Null,
        };
        object.insert(col.clone(), value);
    }
    Value::Object(object)
}

/// Parse a date cell. Accepts ISO and Brazilian day-first forms, with or
/// without a time component.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d"];
    const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

    let text = text.trim();
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt.date());
        }
    }
    None
}

/// Parse a money cell. A comma is treated as the decimal separator
/// (Brazilian convention), with dots as thousands; an optional `R$` prefix
/// and internal spaces are stripped.
pub fn parse_decimal(text: &str) -> Option<BigDecimal> {
    let text = text.trim();
    let text = text
        .strip_prefix("R$")
        .or_else(|| text.strip_prefix("r$"))
        .unwrap_or(text);
    let mut cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();

    if cleaned.contains(',') {
        cleaned.retain(|c| c != '.');
        cleaned = cleaned.replace(',', ".");
    }

    cleaned.parse::<BigDecimal>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn source(columns: &[&str], rows: &[&[Option<&str>]]) -> SourceFile {
        SourceFile {
            arquivo_nome: "teste.csv".to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .iter()
                .map(|cells| cells.iter().map(|c| c.map(str::to_string)).collect())
                .collect(),
        }
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        assert_eq!(parse_date("2025-01-10"), Some(expected));
        assert_eq!(parse_date("10/01/2025"), Some(expected));
        assert_eq!(parse_date("10-01-2025"), Some(expected));
        assert_eq!(parse_date("2025-01-10 13:45:00"), Some(expected));
        assert_eq!(parse_date("não é data"), None);
    }

    #[test]
    fn test_parse_decimal_brazilian_and_plain() {
        assert_eq!(parse_decimal("1.234,56"), BigDecimal::from_str("1234.56").ok());
        assert_eq!(parse_decimal("R$ 99,90"), BigDecimal::from_str("99.90").ok());
        assert_eq!(parse_decimal("100.50"), BigDecimal::from_str("100.50").ok());
        assert_eq!(parse_decimal("abc"), None);
    }

    #[test]
    fn test_map_fixed_parses_typed_fields_and_keeps_raw() {
        let src = source(
            &["data_emissao", "valor_total", "status", "observacao"],
            &[&[Some("10/01/2025"), Some("1.234,56"), Some("pago"), None]],
        );
        let batch = map_file(StorageMode::FixedColumns, &src).expect("map");
        let MappedBatch::Fixed(rows) = batch else {
            panic!("expected fixed batch")
        };

        assert_eq!(rows[0].data_emissao, NaiveDate::from_ymd_opt(2025, 1, 10));
        assert_eq!(rows[0].valor_total, BigDecimal::from_str("1234.56").ok());
        assert_eq!(rows[0].status.as_deref(), Some("pago"));
        assert_eq!(rows[0].raw["observacao"], Value::Null);
        assert_eq!(rows[0].raw["valor_total"], Value::String("1.234,56".into()));
    }

    #[test]
    fn test_map_fixed_unparseable_value_stays_in_raw_only() {
        let src = source(
            &["data_emissao", "valor_total"],
            &[&[Some("amanhã"), Some("cem reais")]],
        );
        let batch = map_file(StorageMode::FixedColumns, &src).expect("map");
        let MappedBatch::Fixed(rows) = batch else {
            panic!("expected fixed batch")
        };

        assert_eq!(rows[0].data_emissao, None);
        assert_eq!(rows[0].valor_total, None);
        assert_eq!(rows[0].raw["data_emissao"], Value::String("amanhã".into()));
    }

    #[test]
    fn test_map_rejects_ragged_row_with_position() {
        let src = source(
            &["a", "b"],
            &[
                &[Some("1"), Some("2")],
                &[Some("só uma célula")],
                &[Some("3"), Some("4")],
            ],
        );
        let err = map_file(StorageMode::RawJson, &src).unwrap_err();
        match err {
            EtlError::MalformedRow { linha, .. } => assert_eq!(linha, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_map_raw_builds_json_objects() {
        let src = source(&["valor"], &[&[Some("10")], &[None]]);
        let batch = map_file(StorageMode::RawJson, &src).expect("map");
        let MappedBatch::Raw(rows) = batch else {
            panic!("expected raw batch")
        };

        assert_eq!(rows[0]["valor"], Value::String("10".into()));
        assert_eq!(rows[1]["valor"], Value::Null);
    }

    #[test]
    fn test_map_dynamic_passes_columns_through() {
        let src = source(&["x", "y"], &[&[Some("1"), None]]);
        let batch = map_file(StorageMode::DynamicColumns, &src).expect("map");
        let MappedBatch::Dynamic { columns, rows } = batch else {
            panic!("expected dynamic batch")
        };

        assert_eq!(columns, vec!["x", "y"]);
        assert_eq!(rows[0][0].as_deref(), Some("1"));
        assert_eq!(rows[0][1], None);
    }
}
