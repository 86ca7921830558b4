//! # Encore Common Library
//!
//! Shared code for the Encore services including:
//! - Identifier newtypes (users, artists, concert groups)
//! - Error and result types
//! - Configuration loading (TOML + environment)
//! - SQLite bootstrap and schema creation

pub mod config;
pub mod db;
pub mod error;
pub mod ids;

pub use error::{Error, Result};
pub use ids::{canonical_pair, ArtistId, GroupId, UserId};
