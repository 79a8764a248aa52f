//! Adapter dispatch
//!
//! Maps a source's adapter kind to its adapter and fetch queue. Dispatch
//! itself does no I/O: it returns a [`FetchJob`] that performs the fetch
//! inside the queue when awaited.

use super::{retain_latest, FetchOptions, UpdateAdapter};
use crate::error::{CrawlError, CrawlResult};
use crate::scheduler::{ExecutionQueue, Scheduler};
use futures::future::BoxFuture;
use smithers_common::db::{AdapterKind, FetchedUpdate, Source};
use std::collections::HashMap;
use std::sync::Arc;

/// Lazy fetch of one source's updates
pub type FetchJob = BoxFuture<'static, CrawlResult<Vec<FetchedUpdate>>>;

struct Route {
    adapter: Arc<dyn UpdateAdapter>,
    queue: ExecutionQueue,
}

/// Registry of adapters keyed by adapter kind
#[derive(Default)]
pub struct AdapterDispatch {
    routes: HashMap<AdapterKind, Route>,
}

impl AdapterDispatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `adapter` for its kind, running fetches in `queue`
    pub fn register(&mut self, adapter: Arc<dyn UpdateAdapter>, queue: ExecutionQueue) {
        self.routes.insert(adapter.kind(), Route { adapter, queue });
    }

    /// Register `adapter` on the scheduler's fetch queue for its kind,
    /// creating a single-slot queue if the scheduler has none
    pub fn register_with(&mut self, adapter: Arc<dyn UpdateAdapter>, scheduler: &mut Scheduler) {
        let kind = adapter.kind();
        let queue = match scheduler.fetch_queue(&kind) {
            Some(queue) => queue.clone(),
            None => scheduler.add_fetch_queue(kind, 1),
        };
        self.register(adapter, queue);
    }

    pub fn supports(&self, kind: &AdapterKind) -> bool {
        self.routes.contains_key(kind)
    }

    /// Resolve the fetch routine for `source`
    ///
    /// Fails immediately, without touching any queue, when no adapter is
    /// registered for the source's kind.
    pub fn dispatch(&self, source: &Source, options: FetchOptions) -> CrawlResult<FetchJob> {
        let route = self
            .routes
            .get(&source.adapter)
            .ok_or_else(|| CrawlError::UnknownAdapter {
                source_name: source.name.clone(),
                adapter: source.adapter.to_string(),
            })?;

        let adapter = Arc::clone(&route.adapter);
        let queue = route.queue.clone();
        let source = source.clone();

        Ok(Box::pin(async move {
            let updates = queue
                .schedule(async { adapter.fetch(&source, options).await })
                .await?;

            tracing::debug!(
                source_id = %source.id,
                queue = queue.name(),
                count = updates.len(),
                "Fetched updates"
            );

            if options.only_latest {
                Ok(retain_latest(updates))
            } else {
                Ok(updates)
            }
        }))
    }
}
