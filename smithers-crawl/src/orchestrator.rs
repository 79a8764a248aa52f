//! Batch orchestration
//!
//! A batch lists the configured sources and runs one pipeline per source,
//! all concurrently:
//!
//! PENDING → FETCHING → RECONCILING → SUCCEEDED | FAILED
//!
//! A failing pipeline never cancels its siblings. Every pipeline settles
//! before failures are logged and recorded on their sources. Only errors
//! outside a pipeline (listing sources, recording a failed status) fail the
//! batch itself.

use crate::adapters::{AdapterDispatch, FetchOptions};
use crate::db::UpdateStore;
use crate::error::{CrawlResult, SourceFailure};
use crate::reconcile::{ReconcileSummary, Reconciler};
use crate::scheduler::ExecutionQueue;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use smithers_common::config::CrawlConfig;
use smithers_common::db::{FailureLogEntry, Source, SourceFilter, SourceStatus};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Pipeline state of one source within one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Pending,
    Fetching,
    Reconciling,
    Succeeded,
    Failed,
}

/// In-flight tracking of one source's pipeline
struct SourceRun<'a> {
    source: &'a Source,
    state: SourceState,
}

impl<'a> SourceRun<'a> {
    fn new(source: &'a Source) -> Self {
        Self {
            source,
            state: SourceState::Pending,
        }
    }

    fn transition_to(&mut self, new_state: SourceState) {
        debug!(
            source_id = %self.source.id,
            source = %self.source.name,
            from = ?self.state,
            to = ?new_state,
            "Source state transition"
        );
        self.state = new_state;
    }
}

/// Terminal result of one source in a batch
#[derive(Debug, Clone)]
pub struct SourceOutcome {
    pub source_id: Uuid,
    pub source_name: String,
    pub state: SourceState,
    /// Present when the source succeeded
    pub summary: Option<ReconcileSummary>,
    pub attempted_on: DateTime<Utc>,
}

/// Result of a whole batch
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<SourceOutcome>,
    pub failures: Vec<SourceFailure>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.state == SourceState::Succeeded)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn outcome(&self, source_id: Uuid) -> Option<&SourceOutcome> {
        self.outcomes.iter().find(|o| o.source_id == source_id)
    }
}

/// Drives one crawl batch across all sources
pub struct BatchOrchestrator {
    store: Arc<dyn UpdateStore>,
    dispatch: AdapterDispatch,
    write_queue: ExecutionQueue,
    reconciler: Reconciler,
    fetch_options: FetchOptions,
}

impl BatchOrchestrator {
    pub fn new(
        store: Arc<dyn UpdateStore>,
        dispatch: AdapterDispatch,
        write_queue: ExecutionQueue,
        config: &CrawlConfig,
    ) -> Self {
        Self {
            store,
            dispatch,
            write_queue,
            reconciler: Reconciler::new(config.chapter_precision),
            fetch_options: FetchOptions {
                only_latest: config.only_latest,
            },
        }
    }

    /// Run one batch
    ///
    /// Returns Ok even when individual sources failed; their failures are in
    /// the report and recorded on each source.
    pub async fn run(&self, filter: &SourceFilter) -> CrawlResult<BatchReport> {
        info!("Retrieving all sources...");
        let sources = self.store.list_sources(filter).await?;
        info!(count = sources.len(), "Crawling sources");

        let settled = join_all(sources.iter().map(|source| self.run_source(source))).await;

        let mut report = BatchReport::default();
        let mut failed_status_writes = Vec::new();

        for result in settled {
            match result {
                Ok(outcome) => report.outcomes.push(outcome),
                Err((failure, attempted_on)) => {
                    error!(
                        source_id = %failure.source_id,
                        source = %failure.source_name,
                        category = failure.error.category(),
                        error = %failure.error,
                        "Source crawl failed"
                    );
                    failed_status_writes.push((failure.source_id, attempted_on));
                    report.outcomes.push(SourceOutcome {
                        source_id: failure.source_id,
                        source_name: failure.source_name.clone(),
                        state: SourceState::Failed,
                        summary: None,
                        attempted_on,
                    });
                    report.failures.push(failure);
                }
            }
        }

        // Failed sources are marked only after every pipeline settled
        let marks = failed_status_writes.into_iter().map(|(id, attempted_on)| {
            self.store.update_source_status(
                id,
                SourceStatus {
                    success: false,
                    last_attempted_on: attempted_on,
                },
            )
        });
        for result in join_all(marks).await {
            result?;
        }

        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Crawl batch complete"
        );

        Ok(report)
    }

    /// Run one batch; a run-fatal error is also appended to the failure log
    ///
    /// Failure to write the log entry is logged and never replaces the
    /// original error.
    pub async fn run_logged(
        &self,
        filter: &SourceFilter,
        context: Option<String>,
    ) -> CrawlResult<BatchReport> {
        match self.run(filter).await {
            Ok(report) => Ok(report),
            Err(e) => {
                error!(error = %e, "Unexpected problem encountered when crawling");
                let entry = FailureLogEntry::new(e.to_string(), context);
                if let Err(log_err) = self.store.append_failure_log(entry).await {
                    warn!(error = %log_err, "Failed to record crawl failure");
                }
                Err(e)
            }
        }
    }

    /// Run one source's pipeline, tagging any failure with the source
    async fn run_source(
        &self,
        source: &Source,
    ) -> Result<SourceOutcome, (SourceFailure, DateTime<Utc>)> {
        let mut run = SourceRun::new(source);
        info!(source = %source.name, adapter = %source.adapter, "Now updating data from source");

        match self.pipeline(&mut run).await {
            Ok((summary, attempted_on)) => {
                info!(source = %source.name, "Done updating data from source");
                Ok(SourceOutcome {
                    source_id: source.id,
                    source_name: source.name.clone(),
                    state: run.state,
                    summary: Some(summary),
                    attempted_on,
                })
            }
            Err(error) => {
                run.transition_to(SourceState::Failed);
                Err((
                    SourceFailure {
                        source_id: source.id,
                        source_name: source.name.clone(),
                        error,
                    },
                    smithers_common::time::now(),
                ))
            }
        }
    }

    async fn pipeline(
        &self,
        run: &mut SourceRun<'_>,
    ) -> CrawlResult<(ReconcileSummary, DateTime<Utc>)> {
        let source = run.source;

        run.transition_to(SourceState::Fetching);
        let job = self.dispatch.dispatch(source, self.fetch_options)?;
        let fetched = job.await?;

        run.transition_to(SourceState::Reconciling);
        let summary = self
            .reconciler
            .reconcile(self.store.as_ref(), &self.write_queue, source.id, fetched)
            .await?;

        let attempted_on = smithers_common::time::now();
        self.store
            .update_source_status(
                source.id,
                SourceStatus {
                    success: true,
                    last_attempted_on: attempted_on,
                },
            )
            .await?;

        run.transition_to(SourceState::Succeeded);
        Ok((summary, attempted_on))
    }
}

impl std::fmt::Debug for BatchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchOrchestrator")
            .field("write_queue", &self.write_queue)
            .field("reconciler", &self.reconciler)
            .field("fetch_options", &self.fetch_options)
            .finish()
    }
}
