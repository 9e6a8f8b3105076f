//! Formatação da saída dos comandos: tabela, bloco chave/valor ou JSON.

use std::io::Write;

use anyhow::Result;
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Imprime `rows` como tabela sem bordas.
pub fn print_table<R: Tabled>(out: &mut impl Write, rows: Vec<R>) -> Result<()> {
    let table = Table::new(rows).with(Style::blank()).to_string();
    writeln!(out, "{table}")?;
    Ok(())
}

/// JSON indentado seguido de quebra de linha.
pub fn print_json<T: Serialize + ?Sized>(out: &mut impl Write, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

/// Pares `Chave:` / valor, com os valores alinhados em uma coluna.
pub fn print_key_values(out: &mut impl Write, fields: &[(&str, String)]) -> Result<()> {
    let width = fields.iter().map(|(k, _)| k.len() + 1).max().unwrap_or(0) + 2;
    for (key, value) in fields {
        let label = format!("{key}:");
        writeln!(out, "{label:<width$}{value}")?;
    }
    Ok(())
}

/// `-` para valores ausentes.
pub fn or_dash(value: Option<impl ToString>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

/// Corta `s` em `max` caracteres, terminando com `...`.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Tabled)]
    struct Row {
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "STATUS")]
        status: String,
    }

    fn render(f: impl FnOnce(&mut Vec<u8>) -> Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn table_has_headers_and_rows() {
        let out = render(|w| {
            print_table(
                w,
                vec![
                    Row { name: "network".into(), status: "drifted".into() },
                    Row { name: "dns".into(), status: "ok".into() },
                ],
            )
        });
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("NAME") && lines[0].contains("STATUS"));
        assert!(lines[1].contains("network") && lines[1].contains("drifted"));
        assert!(lines[2].contains("dns"));
    }

    #[test]
    fn key_values_share_a_value_column() {
        let out = render(|w| {
            print_key_values(
                w,
                &[("ID", "ws-1".into()), ("Execution Mode", "remote".into())],
            )
        });
        assert_eq!(out, "ID:              ws-1\nExecution Mode:  remote\n");
    }

    #[test]
    fn json_is_pretty_with_trailing_newline() {
        let out = render(|w| print_json(w, &serde_json::json!({"drifted": null})));
        assert_eq!(out, "{\n  \"drifted\": null\n}\n");
    }

    #[test]
    fn truncate_keeps_short_strings() {
        assert_eq!(truncate("short", 50), "short");
        assert_eq!(truncate("abcdefghij", 8), "abcde...");
    }

    #[test]
    fn or_dash_fills_missing_values() {
        assert_eq!(or_dash(None::<u32>), "-");
        assert_eq!(or_dash(Some(3)), "3");
    }
}
