//! Header-text normalization for source spreadsheets.
//!
//! Client files arrive with free-form Portuguese headers ("Data de Emissão",
//! "Valor Total (R$)"). Before any column matching or DDL these are folded to
//! snake_case ASCII identifiers so the same logical column always maps to the
//! same table column.

use regex::Regex;
use std::sync::OnceLock;

fn non_alnum() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Compiled once; the pattern is a literal and cannot fail.
    RE.get_or_init(|| Regex::new(r"[^0-9a-z]+").unwrap_or_else(|_| unreachable!()))
}

/// Fold common Latin accented characters to their ASCII base letter.
/// Characters outside ASCII with no mapping are dropped.
pub fn ascii_fold(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' | 'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => out.push('a'),
            'é' | 'è' | 'ê' | 'ë' | 'É' | 'È' | 'Ê' | 'Ë' => out.push('e'),
            'í' | 'ì' | 'î' | 'ï' | 'Í' | 'Ì' | 'Î' | 'Ï' => out.push('i'),
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' | 'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => out.push('o'),
            'ú' | 'ù' | 'û' | 'ü' | 'Ú' | 'Ù' | 'Û' | 'Ü' => out.push('u'),
            'ç' | 'Ç' => out.push('c'),
            'ñ' | 'Ñ' => out.push('n'),
            c if c.is_ascii() => out.push(c.to_ascii_lowercase()),
            _ => {},
        }
    }
    out
}

/// Normalize one header cell to a snake_case ASCII column name.
///
/// Mirrors what the table expects: trimmed, lowercased, accents folded,
/// every run of non-alphanumerics collapsed to a single `_`.
pub fn normalize_column_name(header: &str) -> String {
    let folded = ascii_fold(header.trim());
    let replaced = non_alnum().replace_all(&folded, "_");
    replaced.trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_fold() {
        assert_eq!(ascii_fold("Emissão"), "emissao");
        assert_eq!(ascii_fold("Preço Médio"), "preco medio");
        assert_eq!(ascii_fold("ASCII only"), "ascii only");
    }

    #[test]
    fn test_normalize_column_name() {
        assert_eq!(normalize_column_name("  Data de Emissão "), "data_de_emissao");
        assert_eq!(normalize_column_name("Valor Total (R$)"), "valor_total_r");
        assert_eq!(normalize_column_name("status"), "status");
        assert_eq!(normalize_column_name("Nº do Pedido"), "n_do_pedido");
    }

    #[test]
    fn test_normalize_collapses_runs() {
        assert_eq!(normalize_column_name("a  -  b"), "a_b");
        assert_eq!(normalize_column_name("__x__"), "x");
    }
}
