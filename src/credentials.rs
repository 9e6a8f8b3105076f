//! Descoberta do token da API quando ele não está no arquivo nem em `TFE_TOKEN`.
//!
//! Segue a mesma ordem do Terraform CLI: primeiro `TF_TOKEN_<host>`, depois o
//! arquivo `~/.terraform.d/credentials.tfrc.json` gravado por `terraform login`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use crate::error::HcptError;

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    #[serde(default)]
    credentials: HashMap<String, HostCredential>,
}

#[derive(Debug, Deserialize)]
struct HostCredential {
    #[serde(default)]
    token: String,
}

/// `app.terraform.io` → `TF_TOKEN_app_terraform_io`.
pub fn env_var_name(host: &str) -> String {
    format!("TF_TOKEN_{}", host.replace(['.', '-'], "_"))
}

/// Extrai o hostname de um endereço como `https://app.terraform.io`.
pub fn host_of(address: &str) -> Result<String, HcptError> {
    Url::parse(address)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .ok_or_else(|| HcptError::Config(format!("invalid address {address:?}")))
}

/// Caminho padrão: `~/.terraform.d/credentials.tfrc.json`.
pub fn default_credentials_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".terraform.d").join("credentials.tfrc.json"))
}

/// Lê o token de `host` em um `credentials.tfrc.json`.
///
/// Arquivo ausente não é erro; JSON inválido é.
pub fn token_from_file(path: &Path, host: &str) -> Result<Option<String>, HcptError> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)?;
    let file: CredentialsFile = serde_json::from_str(&contents)?;
    Ok(file
        .credentials
        .get(host)
        .map(|c| c.token.clone())
        .filter(|t| !t.is_empty()))
}

/// Procura um token para `address` no ambiente e depois em `credentials_path`.
pub fn discover_token(
    address: &str,
    lookup: impl Fn(&str) -> Option<String>,
    credentials_path: Option<&Path>,
) -> Result<Option<String>, HcptError> {
    let host = host_of(address)?;

    let var = env_var_name(&host);
    if let Some(token) = lookup(&var).filter(|t| !t.is_empty()) {
        debug!(%var, "token found in environment");
        return Ok(Some(token));
    }

    match credentials_path {
        Some(path) => {
            let token = token_from_file(path, &host)?;
            if token.is_some() {
                debug!(path = %path.display(), %host, "token found in credentials file");
            }
            Ok(token)
        }
        None => Ok(None),
    }
}
