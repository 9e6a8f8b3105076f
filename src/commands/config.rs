//! `config get|set|list`.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use crate::config::{self, HcptConfig, VALID_KEYS};
use crate::output;

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: &'static str,
    value: String,
}

/// `config get <key>`; o token sai mascarado.
pub fn get(settings: &HcptConfig, key: &str, out: &mut impl Write) -> Result<()> {
    let value = settings.display_value(key)?;
    writeln!(out, "{value}")?;
    Ok(())
}

/// `config set <key> <value>`
pub fn set(path: &Path, key: &str, value: &str, out: &mut impl Write) -> Result<()> {
    config::set_value(path, key, value)?;
    writeln!(out, "Set {key:?} to {value:?} in {}", path.display())?;
    Ok(())
}

/// `config list`
pub fn list(settings: &HcptConfig, json: bool, out: &mut impl Write) -> Result<()> {
    let entries = VALID_KEYS
        .iter()
        .map(|&key| {
            Ok(ConfigEntry {
                key,
                value: settings.display_value(key)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if json {
        return output::print_json(out, &entries);
    }
    let fields: Vec<(&str, String)> = entries.into_iter().map(|e| (e.key, e.value)).collect();
    output::print_key_values(out, &fields)
}
