//! `run list`, `run show [--watch|--plan-json]` e `run logs`.

use std::io::Write;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tabled::Tabled;

use super::{CommandContext, format_timestamp, until_cancelled};
use crate::error::Cancelled;
use crate::output;
use crate::plan::{self, ResourceChange};
use crate::tfe::{Run, RunArtifactService, RunListOptions, RunService, TfeError, WorkspaceService};
use crate::ui;
use crate::watch::{self, JobState, WatchObserver, WatchOutcome};

impl JobState for Run {
    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> String {
        self.status.to_string()
    }

    fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[derive(Debug, Serialize)]
struct RunJson<'a> {
    id: &'a str,
    status: &'a str,
    message: &'a str,
    plan_only: bool,
    has_changes: bool,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct RunShowJson<'a> {
    id: &'a str,
    status: &'a str,
    message: &'a str,
    terraform_version: &'a str,
    has_changes: bool,
    resource_additions: u32,
    resource_changes: u32,
    resource_destructions: u32,
    created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    planned_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    applied_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "no_changes")]
    changes: &'a [ResourceChange],
}

fn no_changes(changes: &&[ResourceChange]) -> bool {
    changes.is_empty()
}

#[derive(Debug, Serialize)]
struct RunWithPlanJson<'a> {
    run: RunShowJson<'a>,
    plan_json: serde_json::Value,
}

#[derive(Tabled)]
struct RunRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "MESSAGE")]
    message: String,
    #[tabled(rename = "PLAN ONLY")]
    plan_only: bool,
    #[tabled(rename = "HAS CHANGES")]
    has_changes: bool,
    #[tabled(rename = "CREATED AT")]
    created_at: String,
}

/// `run list -w <workspace> [--status a,b]`
pub async fn list<S>(
    ctx: &CommandContext,
    svc: &S,
    workspace: &str,
    status: Option<String>,
    out: &mut impl Write,
) -> Result<()>
where
    S: WorkspaceService + RunService,
{
    let org = ctx.settings.require_org()?;
    let ws = until_cancelled(&ctx.cancel, svc.read_workspace(org, workspace))
        .await?
        .with_context(|| format!("failed to read workspace {workspace:?}"))?;

    let mut opts = RunListOptions {
        status: status.filter(|s| !s.is_empty()),
        ..Default::default()
    };
    let mut runs = Vec::new();
    loop {
        let page = until_cancelled(&ctx.cancel, svc.list_runs(&ws.id, &opts))
            .await?
            .context("failed to list runs")?;
        runs.extend(page.items);
        match page.next_page {
            Some(next) => opts.page_number = Some(next),
            None => break,
        }
    }

    if ctx.json {
        let items: Vec<RunJson> = runs
            .iter()
            .map(|r| RunJson {
                id: &r.id,
                status: r.status.as_str(),
                message: &r.message,
                plan_only: r.plan_only,
                has_changes: r.has_changes,
                created_at: r.created_at,
            })
            .collect();
        return output::print_json(out, &items);
    }

    let rows = runs
        .iter()
        .map(|r| RunRow {
            id: r.id.clone(),
            status: r.status.to_string(),
            message: output::truncate(&r.message, 50),
            plan_only: r.plan_only,
            has_changes: r.has_changes,
            created_at: format_timestamp(&r.created_at),
        })
        .collect();
    output::print_table(out, rows)
}

/// Argumentos de `run show`.
#[derive(Debug, Default)]
pub struct ShowArgs {
    pub run_id: Option<String>,
    pub workspace: Option<String>,
    pub watch: bool,
    pub interval_secs: Option<u64>,
    pub plan_json: bool,
}

/// `run show [run-id] [-w <workspace>] [--watch | --plan-json]`
pub async fn show<S>(
    ctx: &CommandContext,
    svc: &S,
    args: ShowArgs,
    out: &mut impl Write,
) -> Result<()>
where
    S: WorkspaceService + RunService + RunArtifactService,
{
    if args.watch && args.plan_json {
        bail!("--plan-json cannot be used with --watch");
    }

    let run = resolve_run(ctx, svc, args.run_id.as_deref(), args.workspace.as_deref()).await?;

    if args.plan_json {
        return show_plan_json(ctx, svc, &run, out).await;
    }

    if !args.watch {
        let changes = planned_changes(ctx, svc, &run).await?;
        return display_run(ctx.json, &run, &changes, out);
    }

    let id = run.id.clone();
    let run_id = id.as_str();
    let mut observer = CliObserver::new(ctx.json, &mut *out);
    let outcome = watch::watch(
        &ctx.cancel,
        run,
        ctx.poll_interval(args.interval_secs),
        move || RunService::read_run(svc, run_id),
        &mut observer,
    )
    .await;
    observer.into_result()?;

    match outcome {
        WatchOutcome::Terminal(run) => {
            let changes = planned_changes(ctx, svc, &run).await?;
            display_run(ctx.json, &run, &changes, out)
        }
        WatchOutcome::Cancelled(last) => {
            tracing::debug!(run_id = %last.id, status = %last.status, "watch interrupted");
            Ok(())
        }
    }
}

/// Argumentos de `run logs`.
#[derive(Debug, Default)]
pub struct LogsArgs {
    pub run_id: Option<String>,
    pub workspace: Option<String>,
    pub error_only: bool,
}

/// `run logs [run-id] [-w <workspace>] [--error-only]`: log do apply.
pub async fn logs<S>(
    ctx: &CommandContext,
    svc: &S,
    args: LogsArgs,
    out: &mut impl Write,
) -> Result<()>
where
    S: WorkspaceService + RunService + RunArtifactService,
{
    let run = resolve_run(ctx, svc, args.run_id.as_deref(), args.workspace.as_deref()).await?;
    let Some(apply_id) = run.apply_id.as_deref() else {
        bail!("run {:?} does not have an apply (status: {})", run.id, run.status);
    };

    let log = until_cancelled(&ctx.cancel, svc.read_apply_logs(apply_id))
        .await?
        .context("failed to read apply logs")?;

    for line in log.lines().filter(|l| !args.error_only || is_error_line(l)) {
        writeln!(out, "{line}")?;
    }
    Ok(())
}

fn is_error_line(line: &str) -> bool {
    line.contains(r#""@level":"error""#)
}

async fn resolve_run<S>(
    ctx: &CommandContext,
    svc: &S,
    run_id: Option<&str>,
    workspace: Option<&str>,
) -> Result<Run>
where
    S: WorkspaceService + RunService,
{
    if let Some(run_id) = run_id {
        return until_cancelled(&ctx.cancel, svc.read_run(run_id))
            .await?
            .with_context(|| format!("failed to read run {run_id:?}"));
    }

    let Some(workspace) = workspace else {
        bail!("either run-id or --workspace/-w is required");
    };

    let org = ctx.settings.require_org()?;
    let ws = until_cancelled(&ctx.cancel, svc.read_workspace(org, workspace))
        .await?
        .with_context(|| format!("failed to read workspace {workspace:?}"))?;

    let latest = RunListOptions {
        page_size: Some(1),
        ..Default::default()
    };
    let page = until_cancelled(&ctx.cancel, svc.list_runs(&ws.id, &latest))
        .await?
        .context("failed to list runs")?;
    let Some(first) = page.items.into_iter().next() else {
        bail!("no runs found for workspace {workspace:?}");
    };

    // A listagem não traz o plano; relê o run com `include=plan`.
    until_cancelled(&ctx.cancel, svc.read_run(&first.id))
        .await?
        .with_context(|| format!("failed to read run {:?}", first.id))
}

/// Mudanças planejadas do run. Falhas ao ler ou interpretar o plano só
/// omitem a seção.
async fn planned_changes<S: RunArtifactService>(
    ctx: &CommandContext,
    svc: &S,
    run: &Run,
) -> Result<Vec<ResourceChange>, Cancelled> {
    let Some(plan) = run.plan.as_ref().filter(|_| run.has_changes) else {
        return Ok(Vec::new());
    };
    match until_cancelled(&ctx.cancel, svc.read_plan_json(&plan.id)).await? {
        Ok(body) => Ok(plan::resource_changes(&body).unwrap_or_else(|err| {
            tracing::debug!(plan_id = %plan.id, %err, "unreadable plan JSON");
            Vec::new()
        })),
        Err(err) => {
            tracing::debug!(plan_id = %plan.id, %err, "plan JSON unavailable");
            Ok(Vec::new())
        }
    }
}

async fn show_plan_json<S: RunArtifactService>(
    ctx: &CommandContext,
    svc: &S,
    run: &Run,
    out: &mut impl Write,
) -> Result<()> {
    let Some(plan) = run.plan.as_ref() else {
        bail!("this run does not have a plan");
    };
    let body = until_cancelled(&ctx.cancel, svc.read_plan_json(&plan.id))
        .await?
        .context("failed to read plan JSON")?;
    let changes = plan::resource_changes(&body).unwrap_or_default();

    if ctx.json {
        let plan_json = serde_json::from_str(&body).context("failed to parse plan JSON")?;
        return output::print_json(
            out,
            &RunWithPlanJson {
                run: run_show_json(run, &changes),
                plan_json,
            },
        );
    }

    display_run(false, run, &changes, out)?;
    writeln!(out, "---")?;
    writeln!(out, "{body}")?;
    Ok(())
}

fn run_show_json<'a>(run: &'a Run, changes: &'a [ResourceChange]) -> RunShowJson<'a> {
    let plan = run.plan.clone().unwrap_or_default();
    RunShowJson {
        id: &run.id,
        status: run.status.as_str(),
        message: &run.message,
        terraform_version: &run.terraform_version,
        has_changes: run.has_changes,
        resource_additions: plan.resource_additions,
        resource_changes: plan.resource_changes,
        resource_destructions: plan.resource_destructions,
        created_at: run.created_at,
        planned_at: run.planned_at,
        applied_at: run.applied_at,
        changes,
    }
}

fn display_run(
    json: bool,
    run: &Run,
    changes: &[ResourceChange],
    out: &mut impl Write,
) -> Result<()> {
    if json {
        return output::print_json(out, &run_show_json(run, changes));
    }

    let plan = run.plan.clone().unwrap_or_default();
    // Contagens de plano só são definitivas em estados terminais.
    let (has_changes, plan_changes) = if run.status.is_terminal() {
        (
            run.has_changes.to_string(),
            format!(
                "+{} ~{} -{}",
                plan.resource_additions, plan.resource_changes, plan.resource_destructions
            ),
        )
    } else {
        ("-".to_string(), "-".to_string())
    };

    let mut fields = vec![
        ("ID", run.id.clone()),
        ("Status", run.status.to_string()),
        ("Message", run.message.clone()),
        ("Terraform Version", run.terraform_version.clone()),
        ("Has Changes", has_changes),
        ("Plan Changes", plan_changes),
        ("Created At", format_timestamp(&run.created_at)),
    ];
    if let Some(at) = &run.planned_at {
        fields.push(("Planned At", format_timestamp(at)));
    }
    if let Some(at) = &run.applied_at {
        fields.push(("Applied At", format_timestamp(at)));
    }
    output::print_key_values(out, &fields)?;
    plan::print_changes(out, changes)
}

/// Renderiza o progresso do `--watch` no terminal.
///
/// O estado final é impresso por [`show`], depois de ler as mudanças do
/// plano. Em modo JSON nada sai durante o polling.
struct CliObserver<'a, W: Write> {
    json: bool,
    out: &'a mut W,
    polling: bool,
    error: Option<anyhow::Error>,
}

impl<'a, W: Write> CliObserver<'a, W> {
    fn new(json: bool, out: &'a mut W) -> Self {
        Self {
            json,
            out,
            polling: false,
            error: None,
        }
    }

    fn record(&mut self, result: Result<()>) {
        if let Err(err) = result {
            self.error.get_or_insert(err);
        }
    }

    fn into_result(self) -> Result<()> {
        self.error.map_or(Ok(()), Err)
    }
}

impl<W: Write> WatchObserver<Run, TfeError> for CliObserver<'_, W> {
    fn initial(&mut self, run: &Run) {
        self.polling = true;
        if self.json {
            return;
        }
        let result = display_run(false, run, &[], &mut *self.out).and_then(|_| {
            writeln!(self.out, "---")?;
            Ok(())
        });
        self.record(result);
    }

    fn polled(&mut self, at: DateTime<Local>, run: &Run) {
        if self.json {
            return;
        }
        let line = watch::format_status_line(at, &run.label());
        let result = writeln!(self.out, "{line}").map_err(Into::into);
        self.record(result);
    }

    fn poll_failed(&mut self, err: &TfeError) {
        ui::warn(&format!("failed to read run: {err}"));
    }

    fn finished(&mut self, _run: &Run) {
        if self.polling && !self.json {
            let result = writeln!(self.out, "---").map_err(Into::into);
            self.record(result);
        }
    }
}
