//! Reconciliation of fetched updates against stored history
//!
//! For one source, every fetched update is matched against the stored
//! records read once up front. Unmatched updates become inserts; matched
//! ones become partial updates carrying only the mutable fields that
//! changed, or nothing at all. Writes run on the shared write queue.
//!
//! `origin_id`, `chapter` and the owning source are never written for an
//! existing record.

use crate::db::UpdateStore;
use crate::error::{CrawlError, CrawlResult};
use crate::scheduler::ExecutionQueue;
use futures::future::join_all;
use smithers_common::db::{FetchedUpdate, UpdatePatch, UpdateRecord};
use smithers_common::float::{precision_equals, precision_key};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One storage write produced by reconciliation
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Insert(FetchedUpdate),
    Update { id: Uuid, patch: UpdatePatch },
}

/// Writes needed to converge one source's storage to the fetched state
#[derive(Debug, Clone, Default)]
pub struct ReconcilePlan {
    pub writes: Vec<WriteOp>,
    /// Fetched updates that matched a stored record with nothing to change
    pub unchanged: usize,
}

impl ReconcilePlan {
    pub fn insert_count(&self) -> usize {
        self.writes
            .iter()
            .filter(|op| matches!(op, WriteOp::Insert(_)))
            .count()
    }

    pub fn update_count(&self) -> usize {
        self.writes
            .iter()
            .filter(|op| matches!(op, WriteOp::Update { .. }))
            .count()
    }

    pub fn is_noop(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Outcome counts of an applied plan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

enum Written {
    Inserted,
    Updated,
}

/// Matches fetched updates to stored records at a fixed chapter precision
#[derive(Debug, Clone, Copy)]
pub struct Reconciler {
    precision: u32,
}

impl Reconciler {
    pub fn new(precision: u32) -> Self {
        Self { precision }
    }

    /// Same logical chapter: same source, same origin id, equal chapter
    /// number at the configured precision
    pub fn is_same_chapter(&self, stored: &UpdateRecord, fetched: &FetchedUpdate) -> bool {
        stored.source_id == fetched.source_id
            && stored.origin_id == fetched.origin_id
            && precision_equals(stored.chapter, fetched.chapter, self.precision)
    }

    /// Stored record holding the same logical chapter as `update`
    ///
    /// A record with the same rounded chapter key wins. Only when there is
    /// none does a record within half a step count, so matching never picks
    /// between two rows the storage key keeps apart.
    fn find_match<'a>(
        &self,
        stored: &'a [UpdateRecord],
        update: &FetchedUpdate,
    ) -> CrawlResult<Option<&'a UpdateRecord>> {
        let key = precision_key(update.chapter, self.precision);
        let same_origin = || {
            stored.iter().filter(move |record| {
                record.source_id == update.source_id && record.origin_id == update.origin_id
            })
        };

        let keyed: Vec<&UpdateRecord> = same_origin()
            .filter(|record| precision_key(record.chapter, self.precision) == key)
            .collect();
        let candidates: Vec<&UpdateRecord> = if keyed.is_empty() {
            same_origin()
                .filter(|record| self.is_same_chapter(record, update))
                .collect()
        } else {
            keyed
        };

        match candidates.as_slice() {
            [] => Ok(None),
            [existing] => Ok(Some(*existing)),
            many => Err(CrawlError::AmbiguousMatch {
                origin_id: update.origin_id.clone(),
                chapter: update.chapter,
                candidates: many.len(),
            }),
        }
    }

    /// Mutable fields whose fetched value differs from the stored one
    ///
    /// A fetched `read_at` of None means the adapter has no read state, so the
    /// stored marker is kept.
    pub fn diff(stored: &UpdateRecord, fetched: &FetchedUpdate) -> UpdatePatch {
        let mut patch = UpdatePatch::default();

        if stored.observed_on != fetched.observed_on {
            patch.observed_on = Some(fetched.observed_on);
        }
        if stored.chapter_name != fetched.chapter_name {
            patch.chapter_name = Some(fetched.chapter_name.clone());
        }
        if fetched.read_at.is_some() && stored.read_at != fetched.read_at {
            patch.read_at = fetched.read_at;
        }

        patch
    }

    /// Compute the writes for one source without touching storage
    ///
    /// A fetched update matching more than one stored record with the same
    /// chapter key is a data integrity error for the whole source.
    pub fn plan(
        &self,
        source_id: Uuid,
        stored: &[UpdateRecord],
        fetched: Vec<FetchedUpdate>,
    ) -> CrawlResult<ReconcilePlan> {
        let mut plan = ReconcilePlan::default();

        for mut update in fetched {
            update.source_id = source_id;

            match self.find_match(stored, &update)? {
                None => plan.writes.push(WriteOp::Insert(update)),
                Some(existing) => {
                    let patch = Self::diff(existing, &update);
                    if patch.is_empty() {
                        plan.unchanged += 1;
                    } else {
                        debug!(
                            source_id = %source_id,
                            update_id = %existing.id,
                            fields = ?patch.fields(),
                            "Stored update differs from fetched"
                        );
                        plan.writes.push(WriteOp::Update {
                            id: existing.id,
                            patch,
                        });
                    }
                }
            }
        }

        Ok(plan)
    }

    /// Run every write of `plan` on `queue` and wait for all of them
    ///
    /// Writes are not cancelled when one fails; the first failure is
    /// returned once every admitted write has settled.
    pub async fn apply(
        &self,
        store: &dyn UpdateStore,
        queue: &ExecutionQueue,
        plan: ReconcilePlan,
    ) -> CrawlResult<ReconcileSummary> {
        let mut summary = ReconcileSummary {
            unchanged: plan.unchanged,
            ..ReconcileSummary::default()
        };

        let writes = plan.writes.into_iter().map(|op| {
            queue.schedule(async move {
                match op {
                    WriteOp::Insert(update) => store
                        .insert_update_record(update)
                        .await
                        .map(|_| Written::Inserted),
                    WriteOp::Update { id, patch } => store
                        .update_update_record(id, patch)
                        .await
                        .map(|_| Written::Updated),
                }
            })
        });

        let mut first_error = None;
        for result in join_all(writes).await {
            match result {
                Ok(Written::Inserted) => summary.inserted += 1,
                Ok(Written::Updated) => summary.updated += 1,
                Err(e) if first_error.is_none() => first_error = Some(e),
                Err(e) => warn!(error = %e, "Additional write failure"),
            }
        }

        match first_error {
            Some(e) => Err(CrawlError::from(e)),
            None => Ok(summary),
        }
    }

    /// Reconcile one source: read stored records once, plan, apply
    pub async fn reconcile(
        &self,
        store: &dyn UpdateStore,
        queue: &ExecutionQueue,
        source_id: Uuid,
        fetched: Vec<FetchedUpdate>,
    ) -> CrawlResult<ReconcileSummary> {
        let stored = store.list_update_records(source_id).await?;
        let plan = self.plan(source_id, &stored, fetched)?;

        debug!(
            source_id = %source_id,
            stored = stored.len(),
            inserts = plan.insert_count(),
            updates = plan.update_count(),
            unchanged = plan.unchanged,
            "Reconciliation planned"
        );

        let summary = self.apply(store, queue, plan).await?;

        info!(
            source_id = %source_id,
            inserted = summary.inserted,
            updated = summary.updated,
            unchanged = summary.unchanged,
            "Reconciliation complete"
        );

        Ok(summary)
    }
}
