//! apidrift - Regression Comparison Testing for Networked APIs
//!
//! Drives REST, SOAP, and JMS endpoints with generated input variations and
//! reports where their responses drift apart:
//!
//! - **Iterations**: token cross-products or one-at-a-time variations
//! - **Diff engine**: structural JSON diffs, normalised XML/text, tolerant
//!   header comparison
//! - **Baselines**: versioned on-disk captures, replayable byte for byte
//! - **Store tooling**: listing, full-text search, zip export/import
//!
//! # Quick Start
//!
//! ```ignore
//! use apidrift::{ComparisonRunner, HttpTransport, RunConfig, TokenTemplate};
//!
//! let config = RunConfig::load(Path::new("comparison.json"))?;
//! let runner = ComparisonRunner::new(
//!     config,
//!     Box::new(HttpTransport::new(None)?),
//!     Box::new(HttpTransport::new(None)?),
//!     Box::new(TokenTemplate),
//! );
//! let results = runner.execute();
//! ```

// ─── Core pipeline ─────────────────────────────────────────────────
pub mod config;
pub mod diff;
pub mod errors;
pub mod iteration;
pub mod outcome;
pub mod protocol;

// ─── Baseline storage ──────────────────────────────────────────────
pub mod archive;
pub mod baseline;
pub mod search;
pub mod store;

// ─── Execution ─────────────────────────────────────────────────────
pub mod baseline_runner;
pub mod cli;
pub mod runner;
pub mod transport;

pub use baseline::{BaselineIteration, BaselineRun, RunInfo, SearchResult};
pub use baseline_runner::BaselineRunner;
pub use config::RunConfig;
pub use diff::DiffOptions;
pub use errors::{DriftError, Result};
pub use outcome::{CallOutcome, ComparisonResult, MatchStatus};
pub use protocol::{BaselineOp, ComparisonMode, Protocol, Strategy};
pub use runner::ComparisonRunner;
pub use store::BaselineStore;
pub use transport::{HttpTransport, Messaging, TemplateEngine, TokenTemplate, Transport};
