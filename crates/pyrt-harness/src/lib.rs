//! Conformance harness for the pyrt runtime.
//!
//! This crate provides:
//! - Fixture sets: JSON descriptions of runtime calls and their expected
//!   rendered outcome
//! - Execution: drives `pyrt-core` and `pyrt-membrane` for each case
//! - Verification and markdown/JSON reports
//! - Structured JSONL logging, including drained membrane lifecycle records

#![forbid(unsafe_code)]

pub mod error;
pub mod exec;
pub mod fixtures;
pub mod report;
pub mod runner;
pub mod structured_log;
pub mod verify;

pub use error::HarnessError;
pub use fixtures::{FixtureCase, FixtureSet};
pub use report::ConformanceReport;
pub use runner::TestRunner;
pub use verify::{VerificationResult, VerificationSummary};
