//! Test Helper Utilities
//!
//! Shared utilities for testing encore-gf

#![allow(dead_code)]

pub mod db_utils;
pub mod mock_catalog;

// Re-export commonly used items
pub use db_utils::{
    befriend, create_test_db, days_from_today, follow, ids, member_ids, seed_artist, seed_user, set_of,
};
pub use mock_catalog::{raw_event, MockEventCatalog};
