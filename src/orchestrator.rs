use crate::config::{Config, CreditingConfig};
use crate::error::Result;
use crate::ledger::UsageLedger;
use crate::parallel::ParallelProcessor;
use crate::processors::github::GitHubCreditor;
use crate::processors::pypi::PyPiCreditor;
use crate::processors::{CreditOutcome, CreditResult, Creditor, DependencyKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// One outcome per identifier of an `auto_credit` run
///
/// Repositories come first, then packages, each in the order they were
/// first requested.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditReport {
    /// Per-identifier outcomes
    pub outcomes: Vec<CreditOutcome>,
}

impl CreditReport {
    /// Outcomes whose protocol completed
    pub fn credited(&self) -> impl Iterator<Item = &CreditOutcome> {
        self.outcomes.iter().filter(|o| o.is_credited())
    }

    /// Outcomes that did not complete
    pub fn failed(&self) -> impl Iterator<Item = &CreditOutcome> {
        self.outcomes.iter().filter(|o| !o.is_credited())
    }

    /// Looks up the outcome for one identifier
    pub fn outcome(&self, kind: DependencyKind, identifier: &str) -> Option<&CreditOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.kind == kind && o.identifier == identifier)
    }

    /// Whether every identifier was credited
    pub fn is_complete_success(&self) -> bool {
        self.outcomes.iter().all(CreditOutcome::is_credited)
    }

    /// Number of outcomes
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether the run credited nothing at all
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Fans out one credit task per identifier and joins them
pub struct CreditOrchestrator {
    repositories: Arc<dyn Creditor>,
    packages: Arc<dyn Creditor>,
    ledger: Arc<UsageLedger>,
    max_concurrent: usize,
    identifier_deadline: Duration,
    enabled: bool,
    cancel: CancellationToken,
}

impl CreditOrchestrator {
    /// Builds the GitHub and PyPI creditors from `config`
    pub fn new(config: &Config) -> Result<Self> {
        let ledger = Arc::new(UsageLedger::new());
        let repositories = Arc::new(GitHubCreditor::new(config)?);
        let packages = Arc::new(PyPiCreditor::new(config, Arc::clone(&ledger))?);

        Ok(Self::with_creditors(repositories, packages, ledger, &config.crediting))
    }

    /// Builds an orchestrator around arbitrary creditors
    pub fn with_creditors(
        repositories: Arc<dyn Creditor>,
        packages: Arc<dyn Creditor>,
        ledger: Arc<UsageLedger>,
        settings: &CreditingConfig,
    ) -> Self {
        Self {
            repositories,
            packages,
            ledger,
            max_concurrent: settings.max_concurrent_requests.max(1),
            identifier_deadline: settings.identifier_deadline(),
            enabled: settings.enable_auto_credit,
            cancel: CancellationToken::new(),
        }
    }

    /// Replaces the cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops new tasks and steps when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The usage ledger shared by package credits
    pub fn ledger(&self) -> &UsageLedger {
        &self.ledger
    }

    /// Credits every repository and package, returning once all are done
    ///
    /// Identifiers are deduplicated per kind first. Individual failures are
    /// logged and reported in the outcome, never raised.
    pub async fn auto_credit<R, L>(&self, repos: R, libraries: L) -> CreditReport
    where
        R: IntoIterator,
        R::Item: AsRef<str>,
        L: IntoIterator,
        L::Item: AsRef<str>,
    {
        if !self.enabled {
            info!("auto credit is disabled, nothing to do");
            return CreditReport::default();
        }

        let repos = dedupe(repos);
        let libraries = dedupe(libraries);
        info!(repositories = repos.len(), packages = libraries.len(), "starting credit run");

        let work: Vec<(Arc<dyn Creditor>, String)> = repos
            .into_iter()
            .map(|id| (Arc::clone(&self.repositories), id))
            .chain(libraries.into_iter().map(|id| (Arc::clone(&self.packages), id)))
            .collect();

        let tasks: Vec<_> = work
            .iter()
            .map(|(creditor, identifier)| {
                let creditor = Arc::clone(creditor);
                let identifier = identifier.clone();
                let cancel = self.cancel.clone();
                let budget = self.identifier_deadline;
                async move {
                    let deadline = Instant::now() + budget;
                    creditor.credit(&identifier, deadline, &cancel).await
                }
            })
            .collect();

        let processor = ParallelProcessor::new(self.max_concurrent, self.cancel.clone());
        let results = processor.process(tasks).await;

        let outcomes: Vec<CreditOutcome> = work
            .into_iter()
            .zip(results)
            .map(|((creditor, identifier), result)| {
                result.unwrap_or_else(|e| {
                    warn!(identifier = %identifier, error = %e, "credit task did not run to completion");
                    CreditOutcome::failed(creditor.kind(), &identifier, e.to_string())
                })
            })
            .collect();

        let report = CreditReport { outcomes };
        let not_found = report
            .outcomes
            .iter()
            .filter(|o| o.result == CreditResult::NotFound)
            .count();
        info!(
            credited = report.credited().count(),
            not_found,
            failed = report.failed().count() - not_found,
            "credit run finished"
        );
        report
    }
}

/// Trims, drops empty entries and removes repeats, keeping first-seen order
pub fn dedupe<I>(identifiers: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut seen = HashSet::new();
    identifiers
        .into_iter()
        .map(|id| id.as_ref().trim().to_string())
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect()
}
