//! Configuração do hcpt carregada a partir de `~/.hcpt.toml`.
//!
//! A struct [`HcptConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! As variáveis `TFE_TOKEN`, `TFE_ADDRESS` e `TFE_ORG` têm precedência sobre o
//! arquivo; a flag `--org` tem precedência sobre tudo.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::HcptError;
use crate::tfe::client::DEFAULT_ADDRESS;
use crate::watch::MIN_POLL_INTERVAL;

/// Chaves aceitas por `config get` e `config set`.
pub const VALID_KEYS: &[&str] = &["address", "org", "token"];

/// Configuração de nível superior carregada de `~/.hcpt.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HcptConfig {
    /// Organização do HCP Terraform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,

    /// Token da API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Endereço da API (HCP Terraform ou Terraform Enterprise).
    #[serde(default = "default_address")]
    pub address: String,

    /// Máximo de consultas de assessment simultâneas.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Requisições por segundo permitidas ao agregador.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,

    /// Rajada máxima do limitador.
    #[serde(default = "default_rate_burst")]
    pub rate_burst: u32,

    /// Intervalo de polling do `run show --watch`, em segundos.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_address() -> String {
    DEFAULT_ADDRESS.to_string()
}

// A API aceita 30 req/s; 25 deixa margem para outros clientes da mesma credencial.
fn default_rate_limit() -> u32 {
    25
}

fn default_rate_burst() -> u32 {
    5
}

fn default_max_concurrency() -> usize {
    crate::aggregator::DEFAULT_CONCURRENCY
}

fn default_poll_interval_secs() -> u64 {
    crate::watch::DEFAULT_POLL_INTERVAL.as_secs()
}

impl Default for HcptConfig {
    fn default() -> Self {
        Self {
            org: None,
            token: None,
            address: default_address(),
            max_concurrency: default_max_concurrency(),
            rate_limit: default_rate_limit(),
            rate_burst: default_rate_burst(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl HcptConfig {
    /// Caminho padrão: `~/.hcpt.toml`.
    pub fn default_path() -> Result<PathBuf, HcptError> {
        dirs::home_dir()
            .map(|home| home.join(".hcpt.toml"))
            .ok_or_else(|| HcptError::Config("failed to get home directory".into()))
    }

    /// Lê o arquivo em `path`. Usa valores padrão se o arquivo não existir.
    pub fn from_file(path: &Path) -> Result<Self, HcptError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config = toml::from_str::<HcptConfig>(&contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), HcptError> {
        let min = MIN_POLL_INTERVAL.as_secs();
        if self.poll_interval_secs < min {
            return Err(HcptError::Config(format!(
                "poll_interval_secs must be at least {min}, got {}",
                self.poll_interval_secs
            )));
        }
        Ok(())
    }

    /// Carrega arquivo + variáveis de ambiente.
    pub fn load(path: &Path) -> Result<Self, HcptError> {
        let mut config = Self::from_file(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Variáveis de ambiente têm precedência sobre o arquivo de configuração.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(token) = non_empty("TFE_TOKEN") {
            self.token = Some(token);
        }
        if let Some(address) = non_empty("TFE_ADDRESS") {
            self.address = address;
        }
        if let Some(org) = non_empty("TFE_ORG") {
            self.org = Some(org);
        }
    }

    /// Organização obrigatória para comandos que listam workspaces.
    pub fn require_org(&self) -> Result<&str, HcptError> {
        self.org
            .as_deref()
            .filter(|org| !org.is_empty())
            .ok_or(HcptError::MissingOrg)
    }

    /// Valor de uma chave para `config get`/`config list`; o token sai mascarado.
    pub fn display_value(&self, key: &str) -> Result<String, HcptError> {
        match key {
            "org" => Ok(self.org.clone().unwrap_or_default()),
            "token" => Ok(self.token.as_deref().map(mask_token).unwrap_or_default()),
            "address" => Ok(self.address.clone()),
            other => Err(HcptError::UnknownConfigKey(other.to_string())),
        }
    }
}

/// Grava `key = value` em `path`, preservando as outras chaves do arquivo.
pub fn set_value(path: &Path, key: &str, value: &str) -> Result<(), HcptError> {
    if !VALID_KEYS.contains(&key) {
        return Err(HcptError::UnknownConfigKey(key.to_string()));
    }

    let mut table = if path.exists() {
        std::fs::read_to_string(path)?.parse::<toml::Table>()?
    } else {
        toml::Table::new()
    };
    table.insert(key.to_string(), toml::Value::String(value.to_string()));

    std::fs::write(path, toml::to_string(&table)?)?;
    restrict_permissions(path)?;
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), HcptError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), HcptError> {
    Ok(())
}

/// Mantém só os 4 últimos caracteres do token: `****...1234`.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("****...{visible}")
}
