use crate::error::CreditError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Credits repositories through the GitHub-like API
pub mod github;
/// Credits packages through the package-index API
pub mod pypi;

/// Which identifier space an identifier belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    /// `owner/name` source repository
    Repository,
    /// Package-index package name
    Package,
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Repository => write!(f, "repository"),
            Self::Package => write!(f, "package"),
        }
    }
}

/// Terminal state of one identifier's credit protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreditResult {
    /// The protocol ran to completion
    Credited,
    /// The metadata lookup answered 404
    NotFound,
    /// The protocol stopped early
    Failed(String),
}

/// What the repository protocol achieved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryCredit {
    /// Canonical `owner/name` from the metadata lookup
    pub full_name: String,
    /// Fork request answered 202
    pub forked: bool,
    /// SPDX id of the repository license, if known
    pub license: Option<String>,
    /// Comment request answered 201
    pub commented: bool,
}

/// What the package protocol achieved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageCredit {
    /// Name reported by the package index
    pub canonical_name: String,
    /// Ledger count after this credit
    pub usage_count: u64,
}

/// Protocol-specific details of an outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreditDetail {
    /// Nothing was learned before the protocol stopped
    None,
    /// Repository protocol details
    Repository(RepositoryCredit),
    /// Package protocol details
    Package(PackageCredit),
}

/// Outcome of crediting one identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditOutcome {
    /// Identifier space
    pub kind: DependencyKind,
    /// Identifier as requested
    pub identifier: String,
    /// Terminal state
    pub result: CreditResult,
    /// Details gathered along the way
    pub detail: CreditDetail,
}

impl CreditOutcome {
    /// A completed protocol
    pub fn credited(kind: DependencyKind, identifier: &str, detail: CreditDetail) -> Self {
        Self {
            kind,
            identifier: identifier.to_string(),
            result: CreditResult::Credited,
            detail,
        }
    }

    /// A protocol that stopped early
    pub fn failed(kind: DependencyKind, identifier: &str, reason: impl Into<String>) -> Self {
        Self {
            kind,
            identifier: identifier.to_string(),
            result: CreditResult::Failed(reason.into()),
            detail: CreditDetail::None,
        }
    }

    /// Maps a metadata lookup error, 404s become `NotFound`
    pub fn from_error(kind: DependencyKind, identifier: &str, error: &CreditError) -> Self {
        if error.is_not_found() {
            return Self {
                kind,
                identifier: identifier.to_string(),
                result: CreditResult::NotFound,
                detail: CreditDetail::None,
            };
        }
        Self::failed(kind, identifier, error.to_string())
    }

    /// Stopped by cancellation once `step` had finished
    pub fn cancelled_after(kind: DependencyKind, identifier: &str, step: &str, detail: CreditDetail) -> Self {
        Self {
            kind,
            identifier: identifier.to_string(),
            result: CreditResult::Failed(format!("cancelled after {}", step)),
            detail,
        }
    }

    /// Whether the protocol completed
    pub fn is_credited(&self) -> bool {
        self.result == CreditResult::Credited
    }
}

/// One identifier space's credit protocol
#[async_trait]
pub trait Creditor: Send + Sync {
    /// Identifier space this creditor handles
    fn kind(&self) -> DependencyKind;

    /// Runs the protocol for `identifier`
    ///
    /// Never fails: every error ends up in the returned outcome. Steps
    /// check `cancel` between each other and all requests share `deadline`.
    async fn credit(&self, identifier: &str, deadline: Instant, cancel: &CancellationToken) -> CreditOutcome;
}
