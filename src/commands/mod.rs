//! Implementação dos subcomandos.
//!
//! Cada comando recebe um [`CommandContext`], um serviço da API (genérico,
//! para poder ser trocado por um mock nos testes) e o destino da saída.

pub mod config;
pub mod drift;
pub mod org;
pub mod project;
pub mod run;
pub mod workspace;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::aggregator::StatusAggregator;
use crate::config::HcptConfig;
use crate::error::Cancelled;
use crate::rate_limit::TokenBucket;
use crate::tfe::{Workspace, WorkspaceListOptions, WorkspaceService};
use crate::watch::MIN_POLL_INTERVAL;

/// Estado compartilhado por todos os comandos de uma execução.
pub struct CommandContext {
    pub settings: HcptConfig,
    pub json: bool,
    /// Token raiz; Ctrl-C o cancela.
    pub cancel: CancellationToken,
}

impl CommandContext {
    pub fn new(settings: HcptConfig, json: bool, cancel: CancellationToken) -> Self {
        Self {
            settings,
            json,
            cancel,
        }
    }

    /// Agregador configurado com os limites do arquivo de configuração.
    pub fn aggregator(&self) -> StatusAggregator<TokenBucket> {
        let limiter = TokenBucket::new(self.settings.rate_limit, self.settings.rate_burst);
        StatusAggregator::new(Arc::new(limiter)).with_concurrency(self.settings.max_concurrency)
    }

    pub fn poll_interval(&self, override_secs: Option<u64>) -> Duration {
        let secs = override_secs.unwrap_or(self.settings.poll_interval_secs);
        Duration::from_secs(secs).max(MIN_POLL_INTERVAL)
    }
}

/// Aguarda `fut`, abandonando-o se o token for cancelado antes.
pub async fn until_cancelled<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, Cancelled> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Cancelled),
        output = fut => Ok(output),
    }
}

/// Percorre todas as páginas de workspaces da organização.
pub async fn collect_workspaces<S: WorkspaceService>(
    cancel: &CancellationToken,
    svc: &S,
    org: &str,
    search: Option<String>,
) -> Result<Vec<Workspace>> {
    let mut opts = WorkspaceListOptions {
        page_number: None,
        search,
    };
    let mut all = Vec::new();

    loop {
        let page = until_cancelled(cancel, svc.list_workspaces(org, &opts))
            .await?
            .context("failed to list workspaces")?;
        debug!(page = page.current_page, of = page.total_pages, "workspaces page");
        all.extend(page.items);
        match page.next_page {
            Some(next) => opts.page_number = Some(next),
            None => break,
        }
    }

    Ok(all)
}

/// `2024-05-01 10:00:00`
pub fn format_timestamp(at: &chrono::DateTime<chrono::Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}
