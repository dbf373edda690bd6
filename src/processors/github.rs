use super::{CreditDetail, CreditOutcome, Creditor, DependencyKind, RepositoryCredit};
use crate::client::{ApiResponse, ClientSettings, RequestClient, GITHUB_ACCEPT};
use crate::config::Config;
use crate::error::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Comment posted on MIT-licensed repositories
pub const MIT_COMMENT: &str = "This library is used under the MIT license.";
/// Comment posted on Apache-2.0-licensed repositories
pub const APACHE_COMMENT: &str = "This library is used under the Apache License 2.0.";
/// Comment posted when the license is unknown
pub const UNLICENSED_COMMENT: &str = "This library is used without a specified license.";

#[derive(Debug, Deserialize)]
struct RepositoryMetadata {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct LicenseResponse {
    license: Option<LicenseInfo>,
}

#[derive(Debug, Deserialize)]
struct LicenseInfo {
    spdx_id: Option<String>,
}

/// Picks the credit comment for a repository's SPDX license id
pub fn license_comment(spdx_id: Option<&str>) -> String {
    match spdx_id.map(str::trim).filter(|id| !id.is_empty()) {
        Some("MIT") => MIT_COMMENT.to_string(),
        Some("Apache-2.0") => APACHE_COMMENT.to_string(),
        Some(other) => format!("This library is used under the {} license.", other),
        None => UNLICENSED_COMMENT.to_string(),
    }
}

/// Credits repositories: metadata, fork, license lookup, comment
///
/// Only the metadata lookup is required; fork, license and comment
/// failures are logged and the protocol carries on.
pub struct GitHubCreditor {
    client: RequestClient,
    api_base: String,
}

impl GitHubCreditor {
    /// Builds a creditor from the crediting and API URL settings
    pub fn new(config: &Config) -> Result<Self> {
        let settings = ClientSettings {
            accept: GITHUB_ACCEPT.to_string(),
            token: config.github_token().map(str::to_string),
            timeout: config.crediting.request_timeout(),
            retry: config.crediting.retry_policy(),
        };
        Ok(Self::with_client(RequestClient::new(settings)?, &config.api_urls.github_api))
    }

    /// Builds a creditor around an existing client
    pub fn with_client(client: RequestClient, api_base: &str) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    fn repo_url(&self, repo: &str, suffix: &str) -> String {
        format!("{}/repos/{}{}", self.api_base, repo.trim_matches('/'), suffix)
    }

    async fn fetch_metadata(&self, repo: &str, deadline: Instant) -> Result<RepositoryMetadata> {
        let response = self.client.get(&self.repo_url(repo, ""), Some(deadline)).await?;
        response.json()
    }

    async fn fork(&self, full_name: &str, deadline: Instant) -> bool {
        match self.client.post(&self.repo_url(full_name, "/forks"), None, Some(deadline)).await {
            Ok(response) if response.status == StatusCode::ACCEPTED => {
                info!(repo = full_name, "repo forked");
                true
            }
            Ok(response) => {
                warn!(repo = full_name, status = %response.status, "failed to fork repo");
                false
            }
            Err(e) => {
                warn!(repo = full_name, error = %e, "failed to fork repo");
                false
            }
        }
    }

    async fn fetch_license(&self, full_name: &str, deadline: Instant) -> Option<String> {
        match self.client.get(&self.repo_url(full_name, "/license"), Some(deadline)).await {
            Ok(response) if response.status == StatusCode::OK => spdx_id(&response),
            Ok(_) => None,
            Err(e) => {
                warn!(repo = full_name, error = %e, "license unknown");
                None
            }
        }
    }

    async fn post_comment(&self, full_name: &str, comment: &str, deadline: Instant) -> bool {
        let body = json!({ "body": comment });
        match self
            .client
            .post(&self.repo_url(full_name, "/comments"), Some(&body), Some(deadline))
            .await
        {
            Ok(response) if response.status == StatusCode::CREATED => {
                info!(repo = full_name, "comment added to repo");
                true
            }
            Ok(response) => {
                warn!(repo = full_name, status = %response.status, "failed to add comment to repo");
                false
            }
            Err(e) => {
                warn!(repo = full_name, error = %e, "failed to add comment to repo");
                false
            }
        }
    }
}

fn spdx_id(response: &ApiResponse) -> Option<String> {
    match response.json::<LicenseResponse>() {
        Ok(body) => body
            .license
            .and_then(|license| license.spdx_id)
            .filter(|id| !id.trim().is_empty()),
        Err(e) => {
            warn!(error = %e, "unreadable license response");
            None
        }
    }
}

#[async_trait]
impl Creditor for GitHubCreditor {
    fn kind(&self) -> DependencyKind {
        DependencyKind::Repository
    }

    async fn credit(&self, repo: &str, deadline: Instant, cancel: &CancellationToken) -> CreditOutcome {
        let kind = self.kind();
        let metadata = match self.fetch_metadata(repo, deadline).await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(identifier = repo, error = %e, "failed to credit repo");
                return CreditOutcome::from_error(kind, repo, &e);
            }
        };

        let full_name = metadata.full_name;
        info!(identifier = repo, full_name = %full_name, "crediting repo");
        let mut credit = RepositoryCredit {
            full_name: full_name.clone(),
            forked: false,
            license: None,
            commented: false,
        };

        if cancel.is_cancelled() {
            return CreditOutcome::cancelled_after(kind, repo, "metadata", CreditDetail::Repository(credit));
        }
        credit.forked = self.fork(&full_name, deadline).await;

        if cancel.is_cancelled() {
            return CreditOutcome::cancelled_after(kind, repo, "fork", CreditDetail::Repository(credit));
        }
        credit.license = self.fetch_license(&full_name, deadline).await;

        if cancel.is_cancelled() {
            return CreditOutcome::cancelled_after(kind, repo, "license", CreditDetail::Repository(credit));
        }
        let comment = license_comment(credit.license.as_deref());
        credit.commented = self.post_comment(&full_name, &comment, deadline).await;

        CreditOutcome::credited(kind, repo, CreditDetail::Repository(credit))
    }
}
