use thiserror::Error;

/// Returned by any suspension point (limiter, backoff wait, aggregation,
/// watch) when the shared cancellation token fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

#[derive(Debug, Error)]
pub enum HcptError {
    #[error("Config error: {0}")]
    Config(String),

    #[error(
        "organization is required: use --org flag, TFE_ORG env, or set 'org' in config file"
    )]
    MissingOrg,

    #[error(
        "API token is required: set TFE_TOKEN environment variable, 'token' in config file, or run 'terraform login'"
    )]
    MissingToken,

    #[error("unknown config key {0:?} (valid keys: {keys})", keys = crate::config::VALID_KEYS.join(", "))]
    UnknownConfigKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlWrite(#[from] toml::ser::Error),
}

/// True when the error chain bottoms out in a caller-requested cancellation
/// rather than a real failure.
pub fn is_cancellation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause.downcast_ref::<Cancelled>().is_some()
            || matches!(
                cause.downcast_ref::<crate::tfe::TfeError>(),
                Some(crate::tfe::TfeError::Cancelled(_))
            )
    })
}
