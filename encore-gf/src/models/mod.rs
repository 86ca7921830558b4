//! Data models for encore-gf
//!
//! Run bookkeeping for the formation orchestrator.

pub mod run_report;

pub use run_report::{RunReport, RunState, RunStats};
