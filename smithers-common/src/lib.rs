//! # Smithers Common Library
//!
//! Shared code for the smithers crawler including:
//! - Data model for sources and update records
//! - SQLite schema initialization
//! - Bootstrap configuration loading
//! - Chapter number comparison helpers

pub mod config;
pub mod db;
pub mod error;
pub mod float;
pub mod time;

pub use error::{Error, Result};
