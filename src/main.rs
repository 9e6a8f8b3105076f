mod aggregator;
mod cli;
mod commands;
mod config;
mod credentials;
mod error;
mod output;
mod plan;
mod rate_limit;
mod retry;
mod tfe;
mod ui;
mod watch;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use cli::{
    Cli, Command, ConfigCommand, DriftCommand, OrgCommand, ProjectCommand, RunCommand,
    WorkspaceCommand,
};
use commands::CommandContext;
use config::HcptConfig;
use error::HcptError;
use tfe::TfeClient;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("interrupt received, cancelling");
                cancel.cancel();
            }
        }
    });

    match run(cli, cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if error::is_cancellation(&err) => ExitCode::SUCCESS,
        Err(err) => {
            ui::error(&format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "hcpt=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli, cancel: CancellationToken) -> Result<()> {
    let config_path = match cli.config_path {
        Some(path) => path,
        None => HcptConfig::default_path()?,
    };
    let mut settings = HcptConfig::load(&config_path)?;
    if let Some(org) = cli.org.filter(|o| !o.is_empty()) {
        settings.org = Some(org);
    }

    let ctx = CommandContext::new(settings, cli.json, cancel);
    let mut out = io::stdout();

    match cli.command {
        Command::Config(cmd) => run_config(&ctx, &config_path, cmd, &mut out),
        Command::Drift(cmd) => {
            let client = Arc::new(connect(&ctx.settings)?);
            match cmd {
                DriftCommand::List { all } => commands::drift::list(&ctx, client, all, &mut out).await,
                DriftCommand::Show { workspace } => {
                    commands::drift::show(&ctx, client.as_ref(), &workspace, &mut out).await
                }
            }
        }
        Command::Workspace(cmd) => {
            let client = Arc::new(connect(&ctx.settings)?);
            match cmd {
                WorkspaceCommand::List { search } => {
                    commands::workspace::list(&ctx, client.as_ref(), search, &mut out).await
                }
                WorkspaceCommand::Show { name } => {
                    commands::workspace::show(&ctx, client.as_ref(), &name, &mut out).await
                }
                WorkspaceCommand::Drift { name, all } => {
                    commands::workspace::drift(&ctx, client, name.as_deref(), all, &mut out).await
                }
            }
        }
        Command::Run(cmd) => {
            let client = connect(&ctx.settings)?;
            match cmd {
                RunCommand::List { workspace, status } => {
                    commands::run::list(&ctx, &client, &workspace, status, &mut out).await
                }
                RunCommand::Show(args) => {
                    let args = commands::run::ShowArgs {
                        run_id: args.run_id,
                        workspace: args.workspace,
                        watch: args.watch,
                        interval_secs: args.interval,
                        plan_json: args.plan_json,
                    };
                    commands::run::show(&ctx, &client, args, &mut out).await
                }
                RunCommand::Logs(args) => {
                    let args = commands::run::LogsArgs {
                        run_id: args.run_id,
                        workspace: args.workspace,
                        error_only: args.error_only,
                    };
                    commands::run::logs(&ctx, &client, args, &mut out).await
                }
            }
        }
        Command::Org(cmd) => {
            let client = connect(&ctx.settings)?;
            match cmd {
                OrgCommand::List => commands::org::list(&ctx, &client, &mut out).await,
                OrgCommand::Show => commands::org::show(&ctx, &client, &mut out).await,
            }
        }
        Command::Project(ProjectCommand::List) => {
            let client = connect(&ctx.settings)?;
            commands::project::list(&ctx, &client, &mut out).await
        }
    }
}

fn run_config(
    ctx: &CommandContext,
    path: &std::path::Path,
    cmd: ConfigCommand,
    out: &mut impl io::Write,
) -> Result<()> {
    match cmd {
        ConfigCommand::Get { key } => commands::config::get(&ctx.settings, &key, out),
        ConfigCommand::Set { key, value } => commands::config::set(path, &key, &value, out),
        ConfigCommand::List => commands::config::list(&ctx.settings, ctx.json, out),
    }
}

/// Cliente da API com o token do arquivo, de `TFE_TOKEN` ou das credenciais do Terraform.
fn connect(settings: &HcptConfig) -> Result<TfeClient> {
    let token = match settings.token.clone().filter(|t| !t.is_empty()) {
        Some(token) => token,
        None => {
            let credentials: Option<PathBuf> = credentials::default_credentials_path();
            credentials::discover_token(
                &settings.address,
                |key| std::env::var(key).ok(),
                credentials.as_deref(),
            )?
            .ok_or(HcptError::MissingToken)?
        }
    };
    debug!(address = %settings.address, "connecting");
    Ok(TfeClient::with_base_url(token, &settings.address)?)
}
