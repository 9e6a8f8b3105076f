//! `project list`.

use std::io::Write;

use anyhow::{Context, Result};
use tabled::Tabled;

use super::{CommandContext, until_cancelled};
use crate::output;
use crate::tfe::{Project, ProjectService};

#[derive(Tabled)]
struct ProjectRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "DESCRIPTION")]
    description: String,
}

/// `project list`: todos os projetos da organização.
pub async fn list<S: ProjectService>(
    ctx: &CommandContext,
    svc: &S,
    out: &mut impl Write,
) -> Result<()> {
    let org = ctx.settings.require_org()?;

    let mut projects: Vec<Project> = Vec::new();
    let mut page_number = None;
    loop {
        let page = until_cancelled(&ctx.cancel, svc.list_projects(org, page_number))
            .await?
            .context("failed to list projects")?;
        projects.extend(page.items);
        match page.next_page {
            Some(next) => page_number = Some(next),
            None => break,
        }
    }

    if ctx.json {
        return output::print_json(out, &projects);
    }

    let rows = projects
        .into_iter()
        .map(|p| ProjectRow {
            name: p.name,
            id: p.id,
            description: p.description,
        })
        .collect();
    output::print_table(out, rows)
}
