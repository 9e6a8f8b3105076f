//! Mudanças de recursos extraídas do plano em JSON do Terraform.
//!
//! Só entram recursos com alguma ação além de `no-op`. Dentro de cada um, só
//! atributos escalares que mudam de fato; objetos e listas aninhados ficam de
//! fora, assim como atributos que o provider recalcula a cada apply.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::output;

const VOLATILE_ATTRIBUTES: &[&str] = &[
    "id",
    "created_on",
    "modified_on",
    "updated_at",
    "created_at",
    "last_updated",
    "timeouts",
    "comment_modified_on",
    "tags_modified_on",
    "self_link",
    "fingerprint",
    "etag",
];

const MAX_VALUE_WIDTH: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeChange {
    pub before: Value,
    pub after: Value,
}

/// Um recurso que o plano vai criar, alterar ou destruir.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceChange {
    pub address: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub actions: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub changes: BTreeMap<String, AttributeChange>,
}

#[derive(Deserialize)]
struct PlanDocument {
    #[serde(default)]
    resource_changes: Vec<PlannedResource>,
}

#[derive(Deserialize)]
struct PlannedResource {
    address: String,
    #[serde(rename = "type", default)]
    kind: String,
    change: PlannedChange,
}

#[derive(Deserialize)]
struct PlannedChange {
    #[serde(default)]
    actions: Vec<String>,
    #[serde(default)]
    before: Option<Map<String, Value>>,
    #[serde(default)]
    after: Option<Map<String, Value>>,
}

/// Recursos com mudanças, na ordem do plano.
pub fn resource_changes(plan_json: &str) -> Result<Vec<ResourceChange>, serde_json::Error> {
    let plan: PlanDocument = serde_json::from_str(plan_json)?;
    let changes = plan
        .resource_changes
        .into_iter()
        .filter(|rc| rc.change.actions != ["no-op"])
        .map(|rc| {
            let before = rc.change.before.unwrap_or_default();
            let after = rc.change.after.unwrap_or_default();
            ResourceChange {
                changes: attribute_changes(&before, &after),
                address: rc.address,
                kind: rc.kind,
                actions: rc.change.actions,
            }
        })
        .collect();
    Ok(changes)
}

fn attribute_changes(
    before: &Map<String, Value>,
    after: &Map<String, Value>,
) -> BTreeMap<String, AttributeChange> {
    let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    keys.into_iter()
        .filter(|key| !VOLATILE_ATTRIBUTES.contains(&key.as_str()))
        .filter_map(|key| {
            let old = before.get(key).unwrap_or(&Value::Null);
            let new = after.get(key).unwrap_or(&Value::Null);
            // `after` nulo: valor só conhecido depois do apply.
            if new.is_null() || old == new || is_nested(old) || is_nested(new) {
                return None;
            }
            Some((
                key.clone(),
                AttributeChange {
                    before: old.clone(),
                    after: new.clone(),
                },
            ))
        })
        .collect()
}

fn is_nested(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

/// Valor de atributo em uma linha.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "(null)".to_string(),
        Value::String(s) if s.is_empty() => "(empty)".to_string(),
        Value::String(s) => output::truncate(s, MAX_VALUE_WIDTH),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if !n.is_i64() && !n.is_u64() && f.fract() == 0.0 && f.abs() < 1e15 => {
                format!("{}", f as i64)
            }
            _ => n.to_string(),
        },
        other => output::truncate(&other.to_string(), MAX_VALUE_WIDTH),
    }
}

/// Seção `Resource Changes:` do `run show`; nada quando não há mudanças.
pub fn print_changes(out: &mut impl Write, changes: &[ResourceChange]) -> Result<()> {
    if changes.is_empty() {
        return Ok(());
    }
    writeln!(out)?;
    writeln!(out, "Resource Changes:")?;
    for rc in changes {
        writeln!(out, "- {} [{}]", rc.address, rc.actions.join(", "))?;
        for (attr, change) in &rc.changes {
            writeln!(
                out,
                "    {attr}: {} → {}",
                format_value(&change.before),
                format_value(&change.after)
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_plan() -> String {
        json!({
            "format_version": "1.2",
            "resource_changes": [
                {
                    "address": "aws_s3_bucket.logs",
                    "type": "aws_s3_bucket",
                    "change": {"actions": ["no-op"], "before": {"bucket": "logs"}, "after": {"bucket": "logs"}}
                },
                {
                    "address": "aws_instance.web",
                    "type": "aws_instance",
                    "change": {
                        "actions": ["update"],
                        "before": {"id": "i-1", "instance_type": "t3.micro", "tags": {"a": "b"}, "monitoring": false, "arn": "x"},
                        "after": {"id": "i-2", "instance_type": "t3.large", "tags": {"a": "c"}, "monitoring": true, "arn": null}
                    }
                },
                {
                    "address": "aws_iam_role.ci",
                    "type": "aws_iam_role",
                    "change": {"actions": ["create"], "before": null, "after": {"name": "ci", "max_session_duration": 3600}}
                }
            ]
        })
        .to_string()
    }

    #[test]
    fn no_op_resources_are_skipped() {
        let changes = resource_changes(&sample_plan()).unwrap();
        let addresses: Vec<&str> = changes.iter().map(|c| c.address.as_str()).collect();
        assert_eq!(addresses, ["aws_instance.web", "aws_iam_role.ci"]);
    }

    #[test]
    fn only_scalar_attributes_that_change_are_kept() {
        let changes = resource_changes(&sample_plan()).unwrap();
        let web = &changes[0];
        let attrs: Vec<&str> = web.changes.keys().map(String::as_str).collect();
        assert_eq!(attrs, ["instance_type", "monitoring"]);
        assert_eq!(web.changes["instance_type"].after, json!("t3.large"));

        let role = &changes[1];
        assert_eq!(role.changes["name"].before, Value::Null);
        assert_eq!(role.changes.len(), 2);
    }

    #[test]
    fn plan_without_changes() {
        assert!(resource_changes(r#"{"format_version": "1.2"}"#).unwrap().is_empty());
        assert!(resource_changes("not json").is_err());
    }

    #[test]
    fn values_render_on_one_line() {
        assert_eq!(format_value(&Value::Null), "(null)");
        assert_eq!(format_value(&json!("")), "(empty)");
        assert_eq!(format_value(&json!(true)), "true");
        assert_eq!(format_value(&json!(3600)), "3600");
        assert_eq!(format_value(&json!(3.0)), "3");
        assert_eq!(format_value(&json!(0.5)), "0.5");
        let long = "a".repeat(120);
        assert_eq!(format_value(&json!(long)), format!("{}...", "a".repeat(97)));
    }

    #[test]
    fn changes_section_layout() {
        let changes = resource_changes(&sample_plan()).unwrap();
        let mut buf = Vec::new();
        print_changes(&mut buf, &changes[..1]).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "\nResource Changes:\n- aws_instance.web [update]\n    instance_type: t3.micro → t3.large\n    monitoring: false → true\n"
        );
    }

    #[test]
    fn empty_changes_print_nothing() {
        let mut buf = Vec::new();
        print_changes(&mut buf, &[]).unwrap();
        assert!(buf.is_empty());
    }
}
