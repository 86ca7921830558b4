//! encore-gf: concert group formation engine
//!
//! Groups users who follow the same artist, live near an upcoming concert and
//! are connected by accepted friendships into persisted concert groups.
//! Repeated runs are idempotent and only ever grow existing groups.
//!
//! Exposes public APIs for the binary and integration tests.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod types;
pub mod utils;

pub use crate::error::{EngineError, EngineResult};
pub use crate::models::{RunReport, RunState, RunStats};
pub use crate::services::{EngineParts, FormationOrchestrator, MergeOutcome, OrchestratorSettings};
