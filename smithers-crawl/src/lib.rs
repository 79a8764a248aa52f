//! smithers-crawl - Series update crawler
//!
//! Polls every tracked source for newly published chapters and reconciles
//! them into the local update history. Each source is fetched through the
//! adapter for its kind, serialized per kind by a fetch queue; all storage
//! writes share one bounded write queue.

pub mod adapters;
pub mod db;
pub mod error;
pub mod orchestrator;
pub mod reconcile;
pub mod scheduler;

pub use adapters::{AdapterDispatch, AdapterError, FetchOptions, UpdateAdapter};
pub use db::{SqliteStore, UpdateStore};
pub use error::{CrawlError, CrawlResult, SourceFailure};
pub use orchestrator::{BatchOrchestrator, BatchReport, SourceOutcome, SourceState};
pub use reconcile::{ReconcilePlan, ReconcileSummary, Reconciler, WriteOp};
pub use scheduler::{ExecutionQueue, Scheduler};
