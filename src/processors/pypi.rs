use super::{CreditDetail, CreditOutcome, Creditor, DependencyKind, PackageCredit};
use crate::client::{ClientSettings, RequestClient, JSON_ACCEPT};
use crate::config::Config;
use crate::error::{CreditError, Result};
use crate::ledger::UsageLedger;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct PackageMetadata {
    info: PackageInfo,
}

#[derive(Debug, Deserialize)]
struct PackageInfo {
    name: String,
}

/// Credits packages: metadata lookup, then a usage ledger entry under the
/// canonical name the index reports
pub struct PyPiCreditor {
    client: RequestClient,
    api_base: String,
    ledger: Arc<UsageLedger>,
}

impl PyPiCreditor {
    /// Builds a creditor recording into `ledger`
    pub fn new(config: &Config, ledger: Arc<UsageLedger>) -> Result<Self> {
        let settings = ClientSettings {
            accept: JSON_ACCEPT.to_string(),
            token: None,
            timeout: config.crediting.request_timeout(),
            retry: config.crediting.retry_policy(),
        };
        Ok(Self::with_client(RequestClient::new(settings)?, &config.api_urls.pypi_api, ledger))
    }

    /// Builds a creditor around an existing client
    pub fn with_client(client: RequestClient, api_base: &str, ledger: Arc<UsageLedger>) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            ledger,
        }
    }

    async fn canonical_name(&self, package: &str, deadline: Instant) -> Result<String> {
        let url = format!("{}/{}/json", self.api_base, package);
        let metadata: PackageMetadata = self.client.get(&url, Some(deadline)).await?.json()?;
        let name = metadata.info.name.trim();
        if name.is_empty() {
            return Err(CreditError::InvalidResponse(format!("{} has an empty info.name", url)));
        }
        Ok(name.to_string())
    }
}

#[async_trait]
impl Creditor for PyPiCreditor {
    fn kind(&self) -> DependencyKind {
        DependencyKind::Package
    }

    async fn credit(&self, package: &str, deadline: Instant, cancel: &CancellationToken) -> CreditOutcome {
        let kind = self.kind();
        let name = match self.canonical_name(package, deadline).await {
            Ok(name) => name,
            Err(e) => {
                warn!(identifier = package, error = %e, "failed to credit library");
                return CreditOutcome::from_error(kind, package, &e);
            }
        };

        if cancel.is_cancelled() {
            return CreditOutcome::cancelled_after(kind, package, "metadata", CreditDetail::None);
        }

        info!(identifier = package, canonical = %name, "crediting library");
        let usage_count = self.ledger.record(&name).await;

        CreditOutcome::credited(
            kind,
            package,
            CreditDetail::Package(PackageCredit {
                canonical_name: name,
                usage_count,
            }),
        )
    }
}
