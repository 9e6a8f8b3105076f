//! Tipos de dados da API do HCP Terraform.
//!
//! A API segue o formato JSON:API: cada recurso chega como
//! `{"id": ..., "attributes": {...}, "relationships": {...}}` e as listas
//! trazem paginação em `meta.pagination`. Os structs `*Attributes` espelham
//! esse formato; [`Workspace`], [`Run`] e [`AssessmentResult`] são as formas
//! achatadas usadas pelo resto do crate.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Uma página de resultados de um endpoint de listagem.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub current_page: u32,
    pub total_pages: u32,
    /// `None` na última página.
    pub next_page: Option<u32>,
}

/// Opções de listagem de workspaces.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceListOptions {
    pub page_number: Option<u32>,
    /// Filtro por nome (`search[name]`).
    pub search: Option<String>,
}

/// Opções de listagem de runs.
#[derive(Debug, Clone, Default)]
pub struct RunListOptions {
    pub page_number: Option<u32>,
    pub page_size: Option<u32>,
    /// Estados separados por vírgula (`filter[status]`).
    pub status: Option<String>,
}

/// Um workspace do HCP Terraform.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Workspace {
    pub id: String,
    pub name: String,
    pub description: String,
    pub execution_mode: String,
    pub terraform_version: String,
    pub locked: bool,
    pub auto_apply: bool,
    pub working_directory: String,
    pub resource_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Estado de um run. A lista de estados terminais é fechada: qualquer valor
/// desconhecido é tratado como não terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Fetching,
    FetchingCompleted,
    PrePlanRunning,
    PrePlanCompleted,
    Queuing,
    PlanQueued,
    Planning,
    Planned,
    CostEstimating,
    CostEstimated,
    PolicyChecking,
    PolicyOverride,
    PolicySoftFailed,
    PolicyChecked,
    PostPlanRunning,
    PostPlanCompleted,
    PostPlanAwaitingDecision,
    Confirmed,
    PlannedAndFinished,
    PlannedAndSaved,
    QueuingApply,
    ApplyQueued,
    PreApplyRunning,
    PreApplyCompleted,
    Applying,
    Applied,
    Discarded,
    Errored,
    Canceled,
    #[serde(untagged)]
    Other(String),
}

impl RunStatus {
    /// Estados dos quais um run não sai mais.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Applied
                | RunStatus::Errored
                | RunStatus::Canceled
                | RunStatus::Discarded
                | RunStatus::PlannedAndFinished
                | RunStatus::PlannedAndSaved
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Fetching => "fetching",
            RunStatus::FetchingCompleted => "fetching_completed",
            RunStatus::PrePlanRunning => "pre_plan_running",
            RunStatus::PrePlanCompleted => "pre_plan_completed",
            RunStatus::Queuing => "queuing",
            RunStatus::PlanQueued => "plan_queued",
            RunStatus::Planning => "planning",
            RunStatus::Planned => "planned",
            RunStatus::CostEstimating => "cost_estimating",
            RunStatus::CostEstimated => "cost_estimated",
            RunStatus::PolicyChecking => "policy_checking",
            RunStatus::PolicyOverride => "policy_override",
            RunStatus::PolicySoftFailed => "policy_soft_failed",
            RunStatus::PolicyChecked => "policy_checked",
            RunStatus::PostPlanRunning => "post_plan_running",
            RunStatus::PostPlanCompleted => "post_plan_completed",
            RunStatus::PostPlanAwaitingDecision => "post_plan_awaiting_decision",
            RunStatus::Confirmed => "confirmed",
            RunStatus::PlannedAndFinished => "planned_and_finished",
            RunStatus::PlannedAndSaved => "planned_and_saved",
            RunStatus::QueuingApply => "queuing_apply",
            RunStatus::ApplyQueued => "apply_queued",
            RunStatus::PreApplyRunning => "pre_apply_running",
            RunStatus::PreApplyCompleted => "pre_apply_completed",
            RunStatus::Applying => "applying",
            RunStatus::Applied => "applied",
            RunStatus::Discarded => "discarded",
            RunStatus::Errored => "errored",
            RunStatus::Canceled => "canceled",
            RunStatus::Other(s) => s,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contagens do plano associado a um run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub id: String,
    pub resource_additions: u32,
    pub resource_changes: u32,
    pub resource_destructions: u32,
}

/// Um run (plan/apply) de um workspace.
#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    pub id: String,
    pub status: RunStatus,
    pub message: String,
    pub terraform_version: String,
    pub has_changes: bool,
    pub plan_only: bool,
    pub created_at: DateTime<Utc>,
    pub planned_at: Option<DateTime<Utc>>,
    pub applied_at: Option<DateTime<Utc>>,
    /// Presente quando o run foi lido com `include=plan`.
    pub plan: Option<PlanSummary>,
    /// Apply associado; `run logs` lê o log a partir dele.
    pub apply_id: Option<String>,
}

/// Resultado da avaliação de drift atual de um workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssessmentResult {
    pub id: String,
    pub drifted: bool,
    pub succeeded: bool,
    pub resources_drifted: u32,
    pub resources_undrifted: u32,
    pub created_at: String,
}

/// Uma organização visível para o token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Organization {
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Funcionalidades liberadas pelo plano da organização.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all(deserialize = "kebab-case"))]
pub struct Entitlements {
    pub agents: bool,
    pub audit_logging: bool,
    pub cost_estimation: bool,
    pub operations: bool,
    pub private_module_registry: bool,
    pub run_tasks: bool,
    pub sso: bool,
    pub sentinel: bool,
    pub state_storage: bool,
    pub teams: bool,
    pub vcs_integrations: bool,
}

impl Entitlements {
    /// Pares rótulo/valor na ordem em que `org show` os imprime.
    pub fn labelled(&self) -> [(&'static str, bool); 11] {
        [
            ("Agents", self.agents),
            ("Audit Logging", self.audit_logging),
            ("Cost Estimation", self.cost_estimation),
            ("Operations", self.operations),
            ("Private Module Registry", self.private_module_registry),
            ("Run Tasks", self.run_tasks),
            ("SSO", self.sso),
            ("Sentinel", self.sentinel),
            ("State Storage", self.state_storage),
            ("Teams", self.teams),
            ("VCS Integrations", self.vcs_integrations),
        ]
    }
}

/// Assinatura da organização.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Nome do feature set; cai para o ID dele quando o nome não vem incluído.
    pub plan_name: String,
    pub is_free_tier: bool,
    pub is_active: bool,
}

/// Um projeto da organização.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    pub name: String,
    pub id: String,
    pub description: String,
}

// --- Formato JSON:API ---

#[derive(Debug, Deserialize)]
pub(crate) struct Document<A> {
    pub data: Resource<A>,
    #[serde(default)]
    pub included: Vec<Resource<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListDocument<A> {
    pub data: Vec<Resource<A>>,
    #[serde(default)]
    pub meta: Option<ListMeta>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Resource<A> {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub attributes: A,
    #[serde(default)]
    pub relationships: Option<Relationships>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Relationships {
    #[serde(default)]
    pub plan: Option<Relationship>,
    #[serde(default)]
    pub apply: Option<Relationship>,
    #[serde(default, rename = "feature-set")]
    pub feature_set: Option<Relationship>,
}

impl Relationships {
    fn id_of(rel: Option<Relationship>) -> Option<String> {
        rel.and_then(|r| r.data).map(|data| data.id)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Relationship {
    #[serde(default)]
    pub data: Option<ResourceRef>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResourceRef {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListMeta {
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct Pagination {
    #[serde(default, deserialize_with = "null_as_default")]
    pub current_page: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_pages: u32,
    #[serde(default)]
    pub next_page: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct WorkspaceAttributes {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub execution_mode: Option<String>,
    #[serde(default)]
    pub terraform_version: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub locked: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub auto_apply: bool,
    #[serde(default)]
    pub working_directory: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub resource_count: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct RunAttributes {
    pub status: RunStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub terraform_version: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub has_changes: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub plan_only: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status_timestamps: StatusTimestamps,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct StatusTimestamps {
    #[serde(default)]
    pub planned_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub applied_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct PlanAttributes {
    #[serde(default, deserialize_with = "null_as_default")]
    pub resource_additions: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub resource_changes: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub resource_destructions: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct AssessmentAttributes {
    #[serde(default, deserialize_with = "null_as_default")]
    pub drifted: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub succeeded: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub resources_drifted: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub resources_undrifted: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct OrganizationAttributes {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct ProjectAttributes {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct SubscriptionAttributes {
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_active: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_public_free_tier: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct FeatureSetAttributes {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_free_tier: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct ApplyAttributes {
    #[serde(default)]
    pub log_read_url: Option<String>,
}

/// `null` vira o valor padrão do tipo, como uma chave ausente.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl From<Resource<WorkspaceAttributes>> for Workspace {
    fn from(r: Resource<WorkspaceAttributes>) -> Self {
        let a = r.attributes;
        Self {
            id: r.id,
            name: a.name,
            description: a.description.unwrap_or_default(),
            execution_mode: a.execution_mode.unwrap_or_default(),
            terraform_version: a.terraform_version.unwrap_or_default(),
            locked: a.locked,
            auto_apply: a.auto_apply,
            working_directory: a.working_directory.unwrap_or_default(),
            resource_count: a.resource_count,
            created_at: a.created_at,
            updated_at: a.updated_at,
        }
    }
}

impl From<Resource<AssessmentAttributes>> for AssessmentResult {
    fn from(r: Resource<AssessmentAttributes>) -> Self {
        let a = r.attributes;
        Self {
            id: r.id,
            drifted: a.drifted,
            succeeded: a.succeeded,
            resources_drifted: a.resources_drifted,
            resources_undrifted: a.resources_undrifted,
            created_at: a.created_at,
        }
    }
}

impl From<Resource<OrganizationAttributes>> for Organization {
    fn from(r: Resource<OrganizationAttributes>) -> Self {
        let a = r.attributes;
        Self {
            name: a.name.unwrap_or(r.id),
            email: a.email.unwrap_or_default(),
            created_at: a.created_at,
        }
    }
}

impl From<Resource<ProjectAttributes>> for Project {
    fn from(r: Resource<ProjectAttributes>) -> Self {
        Self {
            name: r.attributes.name,
            id: r.id,
            description: r.attributes.description.unwrap_or_default(),
        }
    }
}

impl Subscription {
    /// O nome do plano vem do feature set incluído; `None` quando a resposta
    /// não referencia nenhum.
    pub(crate) fn from_document(doc: Document<SubscriptionAttributes>) -> Option<Self> {
        let a = doc.data.attributes;
        let feature_set_id = doc
            .data
            .relationships
            .and_then(|rel| Relationships::id_of(rel.feature_set))
            .filter(|id| !id.is_empty())?;

        let included = doc
            .included
            .iter()
            .find(|inc| inc.kind == "feature-sets" && inc.id == feature_set_id)
            .map(|inc| {
                serde_json::from_value::<FeatureSetAttributes>(inc.attributes.clone())
                    .unwrap_or_default()
            });

        Some(match included {
            Some(fs) => Self {
                plan_name: fs.name.unwrap_or(feature_set_id),
                is_free_tier: a.is_public_free_tier || fs.is_free_tier,
                is_active: a.is_active,
            },
            None => Self {
                plan_name: feature_set_id,
                is_free_tier: a.is_public_free_tier,
                is_active: a.is_active,
            },
        })
    }
}

impl Run {
    /// Monta um [`Run`] a partir do recurso e, se presente, do plano incluído.
    pub(crate) fn from_resource(
        r: Resource<RunAttributes>,
        included: &[Resource<serde_json::Value>],
    ) -> Self {
        let relationships = r.relationships.unwrap_or_default();
        let plan_id = Relationships::id_of(relationships.plan);
        let apply_id = Relationships::id_of(relationships.apply);

        let plan = plan_id.and_then(|id| {
            included
                .iter()
                .find(|inc| inc.kind == "plans" && inc.id == id)
                .map(|inc| {
                    let attrs: PlanAttributes =
                        serde_json::from_value(inc.attributes.clone()).unwrap_or_default();
                    PlanSummary {
                        id: id.clone(),
                        resource_additions: attrs.resource_additions,
                        resource_changes: attrs.resource_changes,
                        resource_destructions: attrs.resource_destructions,
                    }
                })
        });

        let a = r.attributes;
        Self {
            id: r.id,
            status: a.status,
            message: a.message.unwrap_or_default(),
            terraform_version: a.terraform_version.unwrap_or_default(),
            has_changes: a.has_changes,
            plan_only: a.plan_only,
            created_at: a.created_at,
            planned_at: a.status_timestamps.planned_at,
            applied_at: a.status_timestamps.applied_at,
            plan,
            apply_id,
        }
    }
}

impl<A> ListDocument<A> {
    /// Converte o documento numa [`Page`], preservando a paginação.
    pub(crate) fn into_page<T>(self, convert: impl FnMut(Resource<A>) -> T) -> Page<T> {
        let pagination = self.meta.and_then(|m| m.pagination);
        let items: Vec<T> = self.data.into_iter().map(convert).collect();
        match pagination {
            Some(p) => Page {
                items,
                current_page: p.current_page,
                total_pages: p.total_pages,
                next_page: p.next_page,
            },
            None => Page {
                items,
                current_page: 1,
                total_pages: 1,
                next_page: None,
            },
        }
    }
}
