//! `drift list` e `drift show`: estado das avaliações de drift.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tabled::Tabled;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{CommandContext, collect_workspaces, until_cancelled};
use crate::aggregator::{AggregateError, WorkItem};
use crate::error::Cancelled;
use crate::output;
use crate::tfe::{AssessmentResult, AssessmentService, Workspace, WorkspaceService};
use crate::ui::FetchProgress;

/// Um workspace e sua avaliação atual, se já houver uma.
pub type DriftStatus = (Workspace, Option<AssessmentResult>);

#[derive(Debug, Serialize)]
struct DriftJson {
    workspace: String,
    drifted: Option<bool>,
    resources_drifted: Option<u32>,
    resources_undrifted: Option<u32>,
    last_assessment: Option<String>,
}

impl From<&DriftStatus> for DriftJson {
    fn from((ws, result): &DriftStatus) -> Self {
        Self {
            workspace: ws.name.clone(),
            drifted: result.as_ref().map(|r| r.drifted),
            resources_drifted: result.as_ref().map(|r| r.resources_drifted),
            resources_undrifted: result.as_ref().map(|r| r.resources_undrifted),
            last_assessment: result.as_ref().map(|r| r.created_at.clone()),
        }
    }
}

#[derive(Tabled)]
struct DriftRow {
    #[tabled(rename = "WORKSPACE")]
    workspace: String,
    #[tabled(rename = "DRIFTED")]
    drifted: String,
    #[tabled(rename = "RESOURCES DRIFTED")]
    resources_drifted: String,
    #[tabled(rename = "LAST ASSESSMENT")]
    last_assessment: String,
}

impl From<&DriftStatus> for DriftRow {
    fn from((ws, result): &DriftStatus) -> Self {
        let r = result.as_ref();
        Self {
            workspace: ws.name.clone(),
            drifted: r.map_or_else(|| "not ready".into(), |r| r.drifted.to_string()),
            resources_drifted: output::or_dash(r.map(|r| r.resources_drifted)),
            last_assessment: output::or_dash(r.map(|r| &r.created_at)),
        }
    }
}

/// Consulta a avaliação de cada workspace em paralelo, preservando a ordem.
///
/// Workspaces sem avaliação voltam com `None`. A primeira falha interrompe
/// as demais consultas e é devolvida sozinha.
pub async fn fetch_drift<S>(
    ctx: &CommandContext,
    svc: Arc<S>,
    workspaces: Vec<Workspace>,
) -> Result<Vec<DriftStatus>>
where
    S: AssessmentService + 'static,
{
    let progress = FetchProgress::start(workspaces.len(), !ctx.json);
    debug!(count = workspaces.len(), "fetching drift assessments");

    let fetched = ctx
        .aggregator()
        .aggregate(&ctx.cancel, workspaces, {
            let progress = progress.clone();
            move |item: WorkItem<Workspace>, token: CancellationToken| {
                let svc = Arc::clone(&svc);
                let progress = progress.clone();
                async move {
                    let ws = item.id;
                    let result = svc
                        .read_current_assessment(&token, &ws.id)
                        .await
                        .with_context(|| {
                            format!("failed to read assessment for workspace {:?}", ws.name)
                        })?;
                    progress.inc();
                    Ok::<_, anyhow::Error>((ws, result))
                }
            }
        })
        .await;
    progress.finish();

    match fetched {
        Ok(results) => Ok(results),
        Err(AggregateError::Cancelled) => Err(Cancelled.into()),
        Err(AggregateError::Failed { source, .. }) => Err(source),
    }
}

/// Lista ou JSON, conforme o modo de saída.
pub fn render_list(json: bool, results: &[DriftStatus], out: &mut impl Write) -> Result<()> {
    if json {
        let items: Vec<DriftJson> = results.iter().map(DriftJson::from).collect();
        return output::print_json(out, &items);
    }
    output::print_table(out, results.iter().map(DriftRow::from).collect())
}

/// Bloco chave/valor (ou JSON) de um único workspace.
pub fn render_one(json: bool, status: &DriftStatus, out: &mut impl Write) -> Result<()> {
    if json {
        return output::print_json(out, &DriftJson::from(status));
    }

    let (ws, result) = status;
    let r = result.as_ref();
    let fields = [
        ("Workspace", ws.name.clone()),
        (
            "Drifted",
            r.map_or_else(|| "not ready".into(), |r| r.drifted.to_string()),
        ),
        ("Resources Drifted", output::or_dash(r.map(|r| r.resources_drifted))),
        ("Resources Undrifted", output::or_dash(r.map(|r| r.resources_undrifted))),
        ("Last Assessment", output::or_dash(r.map(|r| &r.created_at))),
    ];
    output::print_key_values(out, &fields)
}

/// `drift list [--all]`: por padrão só os workspaces com drift.
pub async fn list<S>(
    ctx: &CommandContext,
    svc: Arc<S>,
    all: bool,
    out: &mut impl Write,
) -> Result<()>
where
    S: WorkspaceService + AssessmentService + 'static,
{
    let org = ctx.settings.require_org()?;
    let workspaces = collect_workspaces(&ctx.cancel, svc.as_ref(), org, None).await?;
    let results = fetch_drift(ctx, svc, workspaces).await?;

    let shown: Vec<DriftStatus> = results
        .into_iter()
        .filter(|(_, result)| all || result.as_ref().is_some_and(|r| r.drifted))
        .collect();

    render_list(ctx.json, &shown, out)
}

/// Lê um workspace e sua avaliação atual.
pub async fn read_one<S>(ctx: &CommandContext, svc: &S, name: &str) -> Result<DriftStatus>
where
    S: WorkspaceService + AssessmentService,
{
    let org = ctx.settings.require_org()?;
    let ws = until_cancelled(&ctx.cancel, svc.read_workspace(org, name))
        .await?
        .with_context(|| format!("failed to read workspace {name:?}"))?;
    let result = svc
        .read_current_assessment(&ctx.cancel, &ws.id)
        .await
        .with_context(|| format!("failed to read assessment for workspace {name:?}"))?;
    Ok((ws, result))
}

/// `drift show <workspace>`
pub async fn show<S>(ctx: &CommandContext, svc: &S, name: &str, out: &mut impl Write) -> Result<()>
where
    S: WorkspaceService + AssessmentService,
{
    let status = read_one(ctx, svc, name).await?;
    render_one(ctx.json, &status, out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::mock::{Assessment, MockTfe, assessed, context};
    use std::sync::atomic::Ordering;

    fn fleet() -> MockTfe {
        MockTfe::with_workspaces(&["network", "dns", "compute", "storage", "iam"])
            .assessment("network", assessed(true, 3))
            .assessment("dns", assessed(false, 0))
            .assessment("compute", Assessment::NotReady)
            .assessment("storage", assessed(true, 1))
            .assessment("iam", assessed(false, 0))
    }

    #[tokio::test]
    async fn list_shows_only_drifted_by_default() {
        let ctx = context(true);
        let mut buf = Vec::new();
        list(&ctx, Arc::new(fleet()), false, &mut buf).await.unwrap();

        let items: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        let names: Vec<&str> = items
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["workspace"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["network", "storage"]);
    }

    #[tokio::test]
    async fn list_all_keeps_input_order_and_absence() {
        let ctx = context(true);
        let mut buf = Vec::new();
        list(&ctx, Arc::new(fleet()), true, &mut buf).await.unwrap();

        let items: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        let items = items.as_array().unwrap();
        assert_eq!(items.len(), 5);
        assert_eq!(items[2]["workspace"], "compute");
        assert!(items[2]["drifted"].is_null());
        assert!(items[2]["resources_drifted"].is_null());
        assert!(items[2]["last_assessment"].is_null());
        assert_eq!(items[0]["resources_drifted"], 3);
        assert_eq!(items[4]["workspace"], "iam");
    }

    #[tokio::test]
    async fn list_table_marks_missing_assessments() {
        let ctx = context(false);
        let mut buf = Vec::new();
        list(&ctx, Arc::new(fleet()), true, &mut buf).await.unwrap();
        let out = String::from_utf8(buf).unwrap();

        let header = out.lines().next().unwrap();
        assert!(header.contains("WORKSPACE"));
        assert!(header.contains("RESOURCES DRIFTED"));
        assert!(header.contains("LAST ASSESSMENT"));
        let compute = out.lines().find(|l| l.contains("compute")).unwrap();
        assert!(compute.contains("not ready"));
        assert!(compute.contains('-'));
    }

    #[tokio::test]
    async fn list_reports_first_failure_by_workspace_name() {
        let ctx = context(true);
        let svc = MockTfe::with_workspaces(&["network", "dns"]).assessment("dns", Assessment::Fails(500));
        let mut buf = Vec::new();

        let err = list(&ctx, Arc::new(svc), true, &mut buf).await.unwrap_err();

        assert!(
            err.to_string().starts_with("failed to read assessment for workspace \"dns\""),
            "{err}"
        );
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn list_requires_org() {
        let mut ctx = context(false);
        ctx.settings.org = None;
        let svc = Arc::new(fleet());
        let mut buf = Vec::new();

        let err = list(&ctx, Arc::clone(&svc), false, &mut buf).await.unwrap_err();

        assert!(err.to_string().starts_with("organization is required"));
        assert_eq!(svc.assessment_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn list_cancelled_before_start() {
        let ctx = context(false);
        ctx.cancel.cancel();
        let mut buf = Vec::new();

        let err = list(&ctx, Arc::new(fleet()), true, &mut buf).await.unwrap_err();

        assert!(crate::error::is_cancellation(&err));
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn show_prints_key_values() {
        let ctx = context(false);
        let svc = fleet();
        let mut buf = Vec::new();
        show(&ctx, &svc, "network", &mut buf).await.unwrap();
        let out = String::from_utf8(buf).unwrap();

        assert!(out.starts_with("Workspace:"));
        assert!(out.contains("Drifted:"));
        assert!(out.lines().any(|l| l.starts_with("Resources Drifted:") && l.ends_with('3')));
    }

    #[tokio::test]
    async fn show_not_ready_uses_dashes() {
        let ctx = context(false);
        let svc = fleet();
        let mut buf = Vec::new();
        show(&ctx, &svc, "compute", &mut buf).await.unwrap();
        let out = String::from_utf8(buf).unwrap();

        assert!(out.lines().any(|l| l.starts_with("Drifted:") && l.ends_with("not ready")));
        assert!(out.lines().any(|l| l.starts_with("Last Assessment:") && l.ends_with('-')));
    }

    #[tokio::test]
    async fn show_unknown_workspace() {
        let ctx = context(false);
        let svc = fleet();
        let mut buf = Vec::new();
        let err = show(&ctx, &svc, "ghost", &mut buf).await.unwrap_err();
        assert_eq!(
            format!("{err:#}"),
            "failed to read workspace \"ghost\": resource not found"
        );
    }
}
