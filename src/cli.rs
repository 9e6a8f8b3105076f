//! Interface de linha de comando do hcpt baseada em clap.
//!
//! Define a struct [`Cli`] com os grupos de subcomandos [`Command`]
//! (drift, workspace, run, org, project, config) e as flags globais
//! (--org, --json, --config, --verbose).

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// hcpt: consulta workspaces, runs e drift no HCP Terraform.
#[derive(Debug, Parser)]
#[command(name = "hcpt", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Organização do HCP Terraform (sobrepõe TFE_ORG e o arquivo de configuração).
    #[arg(long, global = true)]
    pub org: Option<String>,

    /// Saída em JSON.
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,

    /// Arquivo de configuração (padrão: ~/.hcpt.toml).
    #[arg(long = "config", global = true)]
    pub config_path: Option<PathBuf>,

    /// Habilita logs de depuração no stderr.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Avaliações de drift.
    #[command(subcommand)]
    Drift(DriftCommand),

    /// Workspaces da organização.
    #[command(subcommand)]
    Workspace(WorkspaceCommand),

    /// Runs de um workspace.
    #[command(subcommand)]
    Run(RunCommand),

    /// Organizações visíveis para o token.
    #[command(subcommand)]
    Org(OrgCommand),

    /// Projetos da organização.
    #[command(subcommand)]
    Project(ProjectCommand),

    /// Lê e grava o arquivo de configuração.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum DriftCommand {
    /// Lista workspaces com drift (todos com --all).
    List {
        /// Mostra todos os workspaces, não só os com drift.
        #[arg(long)]
        all: bool,
    },

    /// Detalhes da avaliação de drift de um workspace.
    Show {
        /// Nome do workspace.
        workspace: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum WorkspaceCommand {
    /// Lista os workspaces da organização.
    List {
        /// Filtra por nome.
        #[arg(long)]
        search: Option<String>,
    },

    /// Detalhes de um workspace.
    Show {
        /// Nome do workspace.
        name: String,
    },

    /// Estado de drift de um workspace (ou de todos com --all).
    Drift {
        /// Nome do workspace.
        name: Option<String>,

        /// Todos os workspaces da organização.
        #[arg(long)]
        all: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum RunCommand {
    /// Lista os runs de um workspace.
    List {
        /// Nome do workspace.
        #[arg(long, short)]
        workspace: String,

        /// Filtra por estado (separados por vírgula, ex.: applied,errored).
        #[arg(long)]
        status: Option<String>,
    },

    /// Detalhes de um run, ou do último run de um workspace.
    Show(RunShowArgs),

    /// Log do apply de um run.
    Logs(RunLogsArgs),
}

#[derive(Debug, Args)]
pub struct RunShowArgs {
    /// ID do run.
    pub run_id: Option<String>,

    /// Nome do workspace (usa o run mais recente).
    #[arg(long, short)]
    pub workspace: Option<String>,

    /// Acompanha o run até um estado terminal.
    #[arg(long, short = 'W')]
    pub watch: bool,

    /// Intervalo de polling do --watch, em segundos.
    #[arg(long, requires = "watch", value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: Option<u64>,

    /// Imprime também o plano completo em JSON.
    #[arg(long, conflicts_with = "watch")]
    pub plan_json: bool,
}

#[derive(Debug, Args)]
pub struct RunLogsArgs {
    /// ID do run.
    pub run_id: Option<String>,

    /// Nome do workspace (usa o run mais recente).
    #[arg(long, short)]
    pub workspace: Option<String>,

    /// Só as linhas com nível error.
    #[arg(long)]
    pub error_only: bool,
}

#[derive(Debug, Subcommand)]
pub enum OrgCommand {
    /// Lista as organizações.
    List,

    /// Plano e funcionalidades da organização configurada.
    Show,
}

#[derive(Debug, Subcommand)]
pub enum ProjectCommand {
    /// Lista os projetos da organização.
    List,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Mostra o valor de uma chave (address, org, token).
    Get { key: String },

    /// Grava uma chave no arquivo de configuração.
    Set { key: String, value: String },

    /// Lista todas as chaves.
    List,
}
