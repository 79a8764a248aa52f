//! Test Helper Utilities
//!
//! Shared utilities for testing smithers-crawl

#![allow(dead_code)]

pub mod db_utils;
pub mod memory_store;
pub mod scripted_adapter;

pub use db_utils::{create_test_store, seed_source};
pub use memory_store::MemoryStore;
pub use scripted_adapter::{update, ScriptedAdapter};
