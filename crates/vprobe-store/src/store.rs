//! Job registry keyed by [`JobId`].
//!
//! Records and logs live in a single [`DashMap`] entry per job. The map is
//! sharded by key hash, so operations on different jobs rarely contend, and
//! each operation holds its shard lock only for the map access itself. Callers
//! must never hold a store reference across a tool invocation; every method
//! here returns owned snapshots for that reason.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use vprobe_models::{JobId, JobRecord, JobState, JobUpdate};

use crate::error::{StoreError, StoreResult};

struct JobEntry {
    record: JobRecord,
    /// Full decode log; replaced as a whole, never appended to
    log: Option<Arc<str>>,
}

/// Number of stored jobs per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateCounts {
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl StateCounts {
    pub fn total(&self) -> usize {
        self.queued + self.processing + self.completed + self.failed
    }
}

/// Concurrency-safe store of job records and their log artifacts.
#[derive(Default)]
pub struct JobStore {
    jobs: DashMap<JobId, JobEntry>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new `Processing` record at progress 0.
    pub fn create(&self, id: &JobId) -> StoreResult<JobRecord> {
        self.insert_new(JobRecord::new(id.clone()))
    }

    /// Insert a new `Queued` record at progress 0.
    pub fn create_queued(&self, id: &JobId) -> StoreResult<JobRecord> {
        self.insert_new(JobRecord::queued(id.clone()))
    }

    fn insert_new(&self, record: JobRecord) -> StoreResult<JobRecord> {
        match self.jobs.entry(record.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists(record.id)),
            Entry::Vacant(slot) => {
                slot.insert(JobEntry {
                    record: record.clone(),
                    log: None,
                });
                debug!(job_id = %record.id, state = %record.state, "Job record created");
                Ok(record)
            }
        }
    }

    /// Atomically replace the mutable fields of an existing record.
    ///
    /// Returns the record as it stands after the update.
    pub fn update(&self, id: &JobId, update: JobUpdate) -> StoreResult<JobRecord> {
        let mut entry = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        entry
            .record
            .apply(update)
            .map_err(|source| StoreError::Rejected {
                id: id.clone(),
                source,
            })?;

        Ok(entry.record.clone())
    }

    /// Snapshot of a record.
    pub fn get(&self, id: &JobId) -> Option<JobRecord> {
        self.jobs.get(id).map(|entry| entry.record.clone())
    }

    /// Store the complete log for a job, replacing any previous one.
    pub fn put_log(&self, id: &JobId, log: impl Into<Arc<str>>) -> StoreResult<()> {
        let mut entry = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        entry.log = Some(log.into());
        Ok(())
    }

    /// The stored log for a job, if one has been written.
    pub fn get_log(&self, id: &JobId) -> Option<Arc<str>> {
        self.jobs.get(id).and_then(|entry| entry.log.clone())
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Count stored jobs by state.
    pub fn state_counts(&self) -> StateCounts {
        let mut counts = StateCounts::default();
        for entry in self.jobs.iter() {
            match entry.record.state {
                JobState::Queued => counts.queued += 1,
                JobState::Processing => counts.processing += 1,
                JobState::Completed => counts.completed += 1,
                JobState::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Remove terminal jobs created before `cutoff`, logs included.
    ///
    /// Jobs still queued or processing are never evicted.
    pub fn evict_terminal_created_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut evicted = 0;
        self.jobs.retain(|_, entry| {
            let expired = entry.record.is_terminal() && entry.record.created_at < cutoff;
            if expired {
                evicted += 1;
            }
            !expired
        });
        evicted
    }
}
