use std::time::Duration;

use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::TfeError;
use super::types::{
    ApplyAttributes, AssessmentAttributes, AssessmentResult, Document, Entitlements,
    ListDocument, Organization, OrganizationAttributes, Page, Project, ProjectAttributes, Run,
    RunAttributes, RunListOptions, Subscription, SubscriptionAttributes, Workspace,
    WorkspaceAttributes, WorkspaceListOptions,
};
use super::{
    AssessmentService, OrganizationService, ProjectService, RunArtifactService, RunService,
    WorkspaceService,
};
use crate::retry::RetryPolicy;

pub const DEFAULT_ADDRESS: &str = "https://app.terraform.io";

const PAGE_SIZE: u32 = 100;

// plan_only runs are hidden unless every operation is listed explicitly.
const RUN_OPERATIONS: &str = "plan_and_apply,plan_only,refresh_only,destroy,empty_apply,save_plan";

pub struct TfeClient {
    token: String,
    client: Client,
    base_url: Url,
    retry: RetryPolicy,
}

impl TfeClient {
    /// `address` is the HCP Terraform or Terraform Enterprise root, e.g. [`DEFAULT_ADDRESS`].
    pub fn with_base_url(token: String, address: &str) -> Result<Self, TfeError> {
        let base_url = Url::parse(address)
            .map_err(|e| TfeError::Parse(format!("invalid address {address:?}: {e}")))?;
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            token,
            client,
            base_url,
            retry: RetryPolicy::default(),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, TfeError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TfeError::Parse(format!("address {} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(["api", "v2"])
            .extend(segments);
        Ok(url)
    }

    /// GET com o mapeamento de status comum. Só os endpoints da API levam o
    /// token; URLs pré-assinadas (logs) são buscadas sem ele.
    async fn get(&self, url: Url, authenticated: bool) -> Result<Response, TfeError> {
        debug!(host = url.host_str(), path = url.path(), "GET");
        let mut request = self.client.get(url);
        if authenticated {
            request = request
                .bearer_auth(&self.token)
                .header("content-type", "application/vnd.api+json");
        }
        let response = request.send().await?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            debug!(?retry_after, "rate limited");
            return Err(TfeError::RateLimited { retry_after });
        }

        if status == StatusCode::NOT_FOUND {
            return Err(TfeError::NotFound);
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(TfeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, TfeError> {
        let body = self.get(url, true).await?.text().await?;
        serde_json::from_str(&body).map_err(|e| TfeError::Parse(e.to_string()))
    }

    fn paged(&self, segments: &[&str], page_number: Option<u32>) -> Result<Url, TfeError> {
        let mut url = self.endpoint(segments)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("page[size]", &PAGE_SIZE.to_string());
            if let Some(page) = page_number {
                query.append_pair("page[number]", &page.to_string());
            }
        }
        Ok(url)
    }
}

impl OrganizationService for TfeClient {
    async fn list_organizations(&self, page_number: Option<u32>) -> Result<Page<Organization>, TfeError> {
        let url = self.paged(&["organizations"], page_number)?;
        let doc: ListDocument<OrganizationAttributes> = self.get_json(url).await?;
        Ok(doc.into_page(Organization::from))
    }

    async fn read_organization(&self, org: &str) -> Result<Organization, TfeError> {
        let url = self.endpoint(&["organizations", org])?;
        let doc: Document<OrganizationAttributes> = self.get_json(url).await?;
        Ok(Organization::from(doc.data))
    }

    async fn read_entitlements(&self, org: &str) -> Result<Entitlements, TfeError> {
        let url = self.endpoint(&["organizations", org, "entitlement-set"])?;
        let doc: Document<Entitlements> = self.get_json(url).await?;
        Ok(doc.data.attributes)
    }

    async fn read_subscription(&self, org: &str) -> Result<Subscription, TfeError> {
        let url = self.endpoint(&["organizations", org, "subscription"])?;
        let doc: Document<SubscriptionAttributes> = self.get_json(url).await?;
        Subscription::from_document(doc).ok_or_else(|| {
            TfeError::Parse("subscription response did not contain plan information".into())
        })
    }
}

impl ProjectService for TfeClient {
    async fn list_projects(&self, org: &str, page_number: Option<u32>) -> Result<Page<Project>, TfeError> {
        let url = self.paged(&["organizations", org, "projects"], page_number)?;
        let doc: ListDocument<ProjectAttributes> = self.get_json(url).await?;
        Ok(doc.into_page(Project::from))
    }
}

impl RunArtifactService for TfeClient {
    async fn read_plan_json(&self, plan_id: &str) -> Result<String, TfeError> {
        // Responde com redirect para o arquivo; o reqwest segue e descarta o token.
        let url = self.endpoint(&["plans", plan_id, "json-output"])?;
        Ok(self.get(url, true).await?.text().await?)
    }

    async fn read_apply_logs(&self, apply_id: &str) -> Result<String, TfeError> {
        let url = self.endpoint(&["applies", apply_id])?;
        let doc: Document<ApplyAttributes> = self.get_json(url).await?;
        let log_url = doc
            .data
            .attributes
            .log_read_url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| TfeError::Parse(format!("apply {apply_id} has no log URL")))?;
        let log_url = Url::parse(&log_url)
            .map_err(|e| TfeError::Parse(format!("invalid log URL: {e}")))?;

        let text = self.get(log_url, false).await?.text().await?;
        // O arquivo de log vem delimitado por STX/ETX.
        Ok(text.trim_matches(['\u{2}', '\u{3}']).to_string())
    }
}

impl WorkspaceService for TfeClient {
    async fn list_workspaces(
        &self,
        org: &str,
        opts: &WorkspaceListOptions,
    ) -> Result<Page<Workspace>, TfeError> {
        let mut url = self.paged(&["organizations", org, "workspaces"], opts.page_number)?;
        if let Some(search) = opts.search.as_deref().filter(|s| !s.is_empty()) {
            url.query_pairs_mut().append_pair("search[name]", search);
        }

        let doc: ListDocument<WorkspaceAttributes> = self.get_json(url).await?;
        Ok(doc.into_page(Workspace::from))
    }

    async fn read_workspace(&self, org: &str, name: &str) -> Result<Workspace, TfeError> {
        let url = self.endpoint(&["organizations", org, "workspaces", name])?;
        let doc: Document<WorkspaceAttributes> = self.get_json(url).await?;
        Ok(Workspace::from(doc.data))
    }
}

impl RunService for TfeClient {
    async fn list_runs(&self, workspace_id: &str, opts: &RunListOptions) -> Result<Page<Run>, TfeError> {
        let mut url = self.endpoint(&["workspaces", workspace_id, "runs"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("page[size]", &opts.page_size.unwrap_or(PAGE_SIZE).to_string());
            if let Some(page) = opts.page_number {
                query.append_pair("page[number]", &page.to_string());
            }
            query.append_pair("filter[operation]", RUN_OPERATIONS);
            if let Some(status) = opts.status.as_deref().filter(|s| !s.is_empty()) {
                query.append_pair("filter[status]", status);
            }
        }

        let doc: ListDocument<RunAttributes> = self.get_json(url).await?;
        Ok(doc.into_page(|r| Run::from_resource(r, &[])))
    }

    async fn read_run(&self, run_id: &str) -> Result<Run, TfeError> {
        let mut url = self.endpoint(&["runs", run_id])?;
        url.query_pairs_mut().append_pair("include", "plan");
        let doc: Document<RunAttributes> = self.get_json(url).await?;
        Ok(Run::from_resource(doc.data, &doc.included))
    }
}

impl AssessmentService for TfeClient {
    async fn read_current_assessment(
        &self,
        cancel: &CancellationToken,
        workspace_id: &str,
    ) -> Result<Option<AssessmentResult>, TfeError> {
        let url = self.endpoint(&["workspaces", workspace_id, "current-assessment-result"])?;

        let result = self
            .retry
            .run(cancel, || {
                self.get_json::<Document<AssessmentAttributes>>(url.clone())
            })
            .await;

        match result {
            Ok(doc) => Ok(Some(AssessmentResult::from(doc.data))),
            Err(TfeError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
