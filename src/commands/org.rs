//! `org list` e `org show`.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tabled::Tabled;

use super::{CommandContext, format_timestamp, until_cancelled};
use crate::output;
use crate::tfe::{Entitlements, Organization, OrganizationService};

#[derive(Debug, Serialize)]
struct OrgJson<'a> {
    name: &'a str,
    email: &'a str,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct OrgShowJson<'a> {
    name: &'a str,
    email: &'a str,
    plan: &'a str,
    created_at: String,
    entitlements: &'a Entitlements,
}

#[derive(Tabled)]
struct OrgRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "EMAIL")]
    email: String,
    #[tabled(rename = "CREATED AT")]
    created_at: String,
}

/// `org list`: todas as organizações visíveis para o token.
pub async fn list<S: OrganizationService>(
    ctx: &CommandContext,
    svc: &S,
    out: &mut impl Write,
) -> Result<()> {
    let mut orgs: Vec<Organization> = Vec::new();
    let mut page_number = None;
    loop {
        let page = until_cancelled(&ctx.cancel, svc.list_organizations(page_number))
            .await?
            .context("failed to list organizations")?;
        orgs.extend(page.items);
        match page.next_page {
            Some(next) => page_number = Some(next),
            None => break,
        }
    }

    if ctx.json {
        let items: Vec<OrgJson> = orgs
            .iter()
            .map(|o| OrgJson {
                name: &o.name,
                email: &o.email,
                created_at: o.created_at,
            })
            .collect();
        return output::print_json(out, &items);
    }

    let rows = orgs
        .iter()
        .map(|o| OrgRow {
            name: o.name.clone(),
            email: o.email.clone(),
            created_at: format_timestamp(&o.created_at),
        })
        .collect();
    output::print_table(out, rows)
}

/// `org show`: dados, plano e funcionalidades da organização configurada.
pub async fn show<S: OrganizationService>(
    ctx: &CommandContext,
    svc: &S,
    out: &mut impl Write,
) -> Result<()> {
    let org_name = ctx.settings.require_org()?;

    let (org, subscription, entitlements) = until_cancelled(&ctx.cancel, async {
        tokio::try_join!(
            async {
                svc.read_organization(org_name)
                    .await
                    .with_context(|| format!("failed to read organization {org_name:?}"))
            },
            async {
                svc.read_subscription(org_name)
                    .await
                    .with_context(|| format!("failed to read subscription for {org_name:?}"))
            },
            async {
                svc.read_entitlements(org_name)
                    .await
                    .with_context(|| format!("failed to read entitlements for {org_name:?}"))
            },
        )
    })
    .await??;

    let created_at = format_timestamp(&org.created_at);

    if ctx.json {
        return output::print_json(
            out,
            &OrgShowJson {
                name: &org.name,
                email: &org.email,
                plan: &subscription.plan_name,
                created_at,
                entitlements: &entitlements,
            },
        );
    }

    let mut fields = vec![
        ("Name", org.name.clone()),
        ("Email", org.email.clone()),
        ("Plan", subscription.plan_name.clone()),
        ("Created At", created_at),
    ];
    fields.extend(
        entitlements
            .labelled()
            .into_iter()
            .map(|(label, enabled)| (label, enabled.to_string())),
    );
    output::print_key_values(out, &fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::mock::{MockTfe, context, organization};
    use crate::tfe::Subscription;

    fn acme() -> MockTfe {
        MockTfe {
            organizations: vec![organization("acme"), organization("globex"), organization("initech")],
            entitlements: Entitlements {
                agents: true,
                sso: true,
                ..Default::default()
            },
            subscription: Some(Subscription {
                plan_name: "Standard".into(),
                is_free_tier: false,
                is_active: true,
            }),
            ..MockTfe::with_workspaces(&[])
        }
    }

    #[tokio::test]
    async fn list_table_across_pages() {
        let ctx = context(false);
        let mut buf = Vec::new();
        list(&ctx, &acme(), &mut buf).await.unwrap();
        let out = String::from_utf8(buf).unwrap();

        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[0].contains("NAME") && lines[0].contains("EMAIL") && lines[0].contains("CREATED AT"));
        assert_eq!(lines.len(), 4);
        assert!(lines[3].contains("initech"));
        assert!(lines[1].contains("2023-01-15 08:30:00"));
    }

    #[tokio::test]
    async fn list_json() {
        let ctx = context(true);
        let mut buf = Vec::new();
        list(&ctx, &acme(), &mut buf).await.unwrap();

        let items: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(items[0]["name"], "acme");
        assert_eq!(items[0]["email"], "ops@acme.io");
        assert_eq!(items[0]["created_at"], "2023-01-15T08:30:00Z");
    }

    #[tokio::test]
    async fn show_lists_plan_and_entitlements() {
        let ctx = context(false);
        let mut buf = Vec::new();
        show(&ctx, &acme(), &mut buf).await.unwrap();
        let out = String::from_utf8(buf).unwrap();

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 15);
        assert!(lines[0].starts_with("Name:") && lines[0].ends_with("acme"));
        assert!(lines[2].starts_with("Plan:") && lines[2].ends_with("Standard"));
        assert!(lines[4].starts_with("Agents:") && lines[4].ends_with("true"));
        assert!(out.lines().any(|l| l.starts_with("SSO:") && l.ends_with("true")));
        assert!(out.lines().any(|l| l.starts_with("Teams:") && l.ends_with("false")));
    }

    #[tokio::test]
    async fn show_json_nests_entitlements() {
        let ctx = context(true);
        let mut buf = Vec::new();
        show(&ctx, &acme(), &mut buf).await.unwrap();

        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["plan"], "Standard");
        assert_eq!(value["created_at"], "2023-01-15 08:30:00");
        assert_eq!(value["entitlements"]["agents"], true);
        assert_eq!(value["entitlements"]["private_module_registry"], false);
    }

    #[tokio::test]
    async fn show_names_failing_subscription() {
        let ctx = context(false);
        let svc = MockTfe {
            subscription: None,
            ..acme()
        };
        let mut buf = Vec::new();

        let err = show(&ctx, &svc, &mut buf).await.unwrap_err();

        assert_eq!(err.to_string(), "failed to read subscription for \"acme\"");
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn show_requires_org() {
        let mut ctx = context(false);
        ctx.settings.org = None;
        let mut buf = Vec::new();
        let err = show(&ctx, &acme(), &mut buf).await.unwrap_err();
        assert!(err.to_string().starts_with("organization is required"));
    }
}
