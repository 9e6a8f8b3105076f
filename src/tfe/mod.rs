pub mod client;
pub mod error;
pub mod types;

use std::future::Future;

use tokio_util::sync::CancellationToken;

pub use client::TfeClient;
pub use error::TfeError;
pub use types::{
    AssessmentResult, Entitlements, Organization, Page, PlanSummary, Project, Run,
    RunListOptions, RunStatus, Subscription, Workspace, WorkspaceListOptions,
};

/// Organization endpoints.
pub trait OrganizationService: Send + Sync {
    fn list_organizations(
        &self,
        page_number: Option<u32>,
    ) -> impl Future<Output = Result<Page<Organization>, TfeError>> + Send;

    fn read_organization(&self, org: &str)
    -> impl Future<Output = Result<Organization, TfeError>> + Send;

    fn read_entitlements(&self, org: &str)
    -> impl Future<Output = Result<Entitlements, TfeError>> + Send;

    fn read_subscription(&self, org: &str)
    -> impl Future<Output = Result<Subscription, TfeError>> + Send;
}

/// Project endpoints.
pub trait ProjectService: Send + Sync {
    fn list_projects(
        &self,
        org: &str,
        page_number: Option<u32>,
    ) -> impl Future<Output = Result<Page<Project>, TfeError>> + Send;
}

/// Workspace endpoints.
pub trait WorkspaceService: Send + Sync {
    fn list_workspaces(
        &self,
        org: &str,
        opts: &WorkspaceListOptions,
    ) -> impl Future<Output = Result<Page<Workspace>, TfeError>> + Send;

    fn read_workspace(
        &self,
        org: &str,
        name: &str,
    ) -> impl Future<Output = Result<Workspace, TfeError>> + Send;
}

/// Run endpoints.
pub trait RunService: Send + Sync {
    fn list_runs(
        &self,
        workspace_id: &str,
        opts: &RunListOptions,
    ) -> impl Future<Output = Result<Page<Run>, TfeError>> + Send;

    fn read_run(&self, run_id: &str) -> impl Future<Output = Result<Run, TfeError>> + Send;
}

/// Plan and apply artifacts of a run.
pub trait RunArtifactService: Send + Sync {
    /// Terraform's JSON plan (`terraform show -json`), as returned.
    fn read_plan_json(&self, plan_id: &str)
    -> impl Future<Output = Result<String, TfeError>> + Send;

    /// The apply log, one JSON log line per line.
    fn read_apply_logs(&self, apply_id: &str)
    -> impl Future<Output = Result<String, TfeError>> + Send;
}

/// Drift assessment endpoints.
pub trait AssessmentService: Send + Sync {
    /// `Ok(None)` when assessments are disabled or have not run yet.
    fn read_current_assessment(
        &self,
        cancel: &CancellationToken,
        workspace_id: &str,
    ) -> impl Future<Output = Result<Option<AssessmentResult>, TfeError>> + Send;
}
