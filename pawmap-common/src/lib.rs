//! # PawMap Common Library
//!
//! Shared code for the PawMap discovery and import tooling:
//! - Error type shared across crates
//! - TOML configuration model and file resolution
//! - Canonical store schema (cities, categories, establishments, validation queue)

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;

pub use error::{Error, Result};
