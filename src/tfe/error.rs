//! Tipos de erro para o cliente da API do HCP Terraform.
//!
//! Define [`TfeError`] com variantes para rate limiting, erros da API,
//! recursos inexistentes e falhas de rede. Usa `thiserror` para derivar
//! `Display` e `Error` a partir dos atributos `#[error(...)]`.

use thiserror::Error;

use crate::error::Cancelled;

/// Erros que podem ocorrer ao interagir com a API do HCP Terraform.
#[derive(Debug, Error)]
pub enum TfeError {
    /// O servidor retornou HTTP 429. `retry_after` guarda o cabeçalho
    /// `Retry-After` bruto, quando presente.
    #[error("rate limited (HTTP 429)")]
    RateLimited { retry_after: Option<String> },

    /// O orçamento de retentativas para HTTP 429 foi esgotado.
    #[error("rate limited (HTTP 429) after {attempts} attempts")]
    RateLimitExhausted { attempts: u32 },

    /// O recurso pedido não existe (HTTP 404).
    #[error("resource not found")]
    NotFound,

    /// Qualquer outro status HTTP não esperado.
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Corpo da resposta não corresponde ao formato JSON:API esperado.
    #[error("failed to parse API response: {0}")]
    Parse(String),

    /// Falha de rede subjacente (DNS, conexão recusada, timeout).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A chamada foi interrompida pelo token de cancelamento.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}
