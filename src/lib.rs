#![warn(missing_docs)]
#![warn(clippy::all)]

//! autocredit - credit the third-party code a project depends on
//!
//! This library discovers the repositories and packages a codebase uses and
//! credits each of them against a GitHub-like API and a package index, one
//! concurrent task per identifier. It also drives a fail-fast deployment
//! pipeline for the project itself.
//!
//! ## Features
//! - Rate-limit aware HTTP client with exponential backoff
//! - Bounded, cancellable fan-out with one outcome per identifier
//! - Usage ledger flagging duplicate package credits
//! - Dependency discovery for Python source trees
//! - validate → build → test → package → upload → tag pipeline
//!
//! ## Usage
//! ```rust,ignore
//! use autocredit::{Config, CreditOrchestrator};
//!
//! async fn example() -> autocredit::Result<()> {
//!     let config = Config::resolve(None)?;
//!     let orchestrator = CreditOrchestrator::new(&config)?;
//!
//!     let report = orchestrator
//!         .auto_credit(["psf/requests"], ["requests", "numpy"])
//!         .await;
//!     println!("{} of {} credited", report.credited().count(), report.len());
//!     Ok(())
//! }
//! ```

/// Configuration loading, merging and environment overrides
pub mod config;
/// Error handling types and utilities
pub mod error;
/// Logging configuration and utilities
pub mod logging;
/// Rate-limited HTTP request client
pub mod client;
/// Per-package usage counting
pub mod ledger;
/// Bounded parallel task execution
pub mod parallel;
/// Credit protocols for repositories and packages
pub mod processors;
/// Fan-out/join of credit protocols
pub mod orchestrator;
/// Source tree dependency discovery
pub mod discovery;
/// Deployment pipeline
pub mod deploy;
/// Retry helpers
pub mod utils;

// Re-export common types
pub use config::Config;
pub use error::{CreditError, Result};
pub use ledger::UsageLedger;
pub use orchestrator::{CreditOrchestrator, CreditReport};
pub use processors::{CreditOutcome, CreditResult, Creditor, DependencyKind};
