//! `workspace list|show|drift`.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tabled::Tabled;

use super::{CommandContext, collect_workspaces, drift, format_timestamp, until_cancelled};
use crate::output;
use crate::tfe::{AssessmentService, Workspace, WorkspaceService};

#[derive(Tabled)]
struct WorkspaceRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "EXECUTION MODE")]
    execution_mode: String,
    #[tabled(rename = "TERRAFORM VERSION")]
    terraform_version: String,
    #[tabled(rename = "LOCKED")]
    locked: bool,
    #[tabled(rename = "AUTO APPLY")]
    auto_apply: bool,
    #[tabled(rename = "UPDATED AT")]
    updated_at: String,
}

impl From<&Workspace> for WorkspaceRow {
    fn from(ws: &Workspace) -> Self {
        Self {
            name: ws.name.clone(),
            id: ws.id.clone(),
            execution_mode: ws.execution_mode.clone(),
            terraform_version: ws.terraform_version.clone(),
            locked: ws.locked,
            auto_apply: ws.auto_apply,
            updated_at: format_timestamp(&ws.updated_at),
        }
    }
}

/// `workspace list [--search <name>]`
pub async fn list<S: WorkspaceService>(
    ctx: &CommandContext,
    svc: &S,
    search: Option<String>,
    out: &mut impl Write,
) -> Result<()> {
    let org = ctx.settings.require_org()?;
    let search = search.filter(|s| !s.is_empty());
    let workspaces = collect_workspaces(&ctx.cancel, svc, org, search).await?;

    if ctx.json {
        return output::print_json(out, &workspaces);
    }
    output::print_table(out, workspaces.iter().map(WorkspaceRow::from).collect())
}

/// `workspace show <name>`
pub async fn show<S: WorkspaceService>(
    ctx: &CommandContext,
    svc: &S,
    name: &str,
    out: &mut impl Write,
) -> Result<()> {
    let org = ctx.settings.require_org()?;
    let ws = until_cancelled(&ctx.cancel, svc.read_workspace(org, name))
        .await?
        .with_context(|| format!("failed to read workspace {name:?}"))?;

    if ctx.json {
        return output::print_json(out, &ws);
    }

    output::print_key_values(
        out,
        &[
            ("Name", ws.name.clone()),
            ("ID", ws.id.clone()),
            ("Description", ws.description.clone()),
            ("Execution Mode", ws.execution_mode.clone()),
            ("Terraform Version", ws.terraform_version.clone()),
            ("Locked", ws.locked.to_string()),
            ("Auto Apply", ws.auto_apply.to_string()),
            ("Working Directory", ws.working_directory.clone()),
            ("Resource Count", ws.resource_count.to_string()),
            ("Created At", format_timestamp(&ws.created_at)),
            ("Updated At", format_timestamp(&ws.updated_at)),
        ],
    )
}

/// `workspace drift [name] [--all]`
///
/// Com `--all`, todos os workspaces da organização (com ou sem drift) passam
/// pelo mesmo agregador de `drift list`.
pub async fn drift<S>(
    ctx: &CommandContext,
    svc: Arc<S>,
    name: Option<&str>,
    all: bool,
    out: &mut impl Write,
) -> Result<()>
where
    S: WorkspaceService + AssessmentService + 'static,
{
    let org = ctx.settings.require_org()?;

    if all {
        let workspaces = collect_workspaces(&ctx.cancel, svc.as_ref(), org, None).await?;
        let results = drift::fetch_drift(ctx, svc, workspaces).await?;
        return drift::render_list(ctx.json, &results, out);
    }

    let Some(name) = name else {
        bail!("workspace name is required, or use --all flag to list all workspaces");
    };
    let status = drift::read_one(ctx, svc.as_ref(), name).await?;
    drift::render_one(ctx.json, &status, out)
}
