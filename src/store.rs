//! Narrow access to the jobs collection.
//!
//! The dashboard never reads a job and then writes it back: every guarded
//! transition is handed to the store as one [`JobStore::update_guarded`]
//! call so the store evaluates the guard and the patch together per document.

use std::collections::HashMap;

use async_trait::async_trait;
use mongodb::bson::{oid::ObjectId, DateTime};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::job::JobRecord;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobQuery {
    pub name: Option<String>,
}

impl JobQuery {
    pub fn all() -> JobQuery {
        JobQuery::default()
    }

    pub fn named(name: impl Into<String>) -> JobQuery {
        JobQuery {
            name: Some(name.into()),
        }
    }

    pub fn matches(&self, job: &JobRecord) -> bool {
        self.name.as_deref().map_or(true, |name| job.name == name)
    }
}

/// Extra match condition a guarded update requires besides the id set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    Unlocked,
    Locked,
    Disabled,
    Enabled,
}

impl Guard {
    pub fn admits(&self, job: &JobRecord) -> bool {
        match self {
            Guard::Unlocked => job.locked_at.is_none(),
            Guard::Locked => job.locked_at.is_some(),
            Guard::Disabled => job.disabled.is_some(),
            Guard::Enabled => job.disabled.is_none(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Patch {
    RunAt(DateTime),
    ClearLock,
    ClearDisabled,
    Disable,
}

impl Patch {
    pub fn apply(&self, job: &mut JobRecord) {
        match *self {
            Patch::RunAt(at) => job.next_run_at = Some(at),
            Patch::ClearLock => job.locked_at = None,
            Patch::ClearDisabled => job.disabled = None,
            Patch::Disable => job.disabled = Some(true),
        }
    }
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Jobs matching `query`, ascending by next run, last finish, last run,
    /// with absent timestamps first.
    async fn query(&self, query: &JobQuery) -> Result<Vec<JobRecord>>;

    async fn find(&self, ids: &[ObjectId]) -> Result<Vec<JobRecord>>;

    /// Apply `patch` to every job in `ids` that `guard` admits, atomically
    /// per document. Returns how many jobs matched.
    async fn update_guarded(&self, ids: &[ObjectId], guard: Guard, patch: Patch) -> Result<u64>;

    /// Returns how many jobs were removed.
    async fn delete(&self, ids: &[ObjectId]) -> Result<u64>;

    async fn insert(&self, job: JobRecord) -> Result<ObjectId>;
}

/// Jobs kept in process memory. Each call holds the lock for its whole
/// match-and-modify, giving the same per-call atomicity as the database.
#[derive(Debug, Default)]
pub struct MemoryStore {
    jobs: Mutex<HashMap<ObjectId, JobRecord>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    pub fn with_jobs(jobs: impl IntoIterator<Item = JobRecord>) -> MemoryStore {
        MemoryStore {
            jobs: Mutex::new(jobs.into_iter().map(|job| (job.id, job)).collect()),
        }
    }

    pub async fn get(&self, id: &ObjectId) -> Option<JobRecord> {
        self.jobs.lock().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn query(&self, query: &JobQuery) -> Result<Vec<JobRecord>> {
        let jobs = self.jobs.lock().await;
        let mut matched: Vec<JobRecord> = jobs.values().filter(|job| query.matches(job)).cloned().collect();
        matched.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()).then_with(|| a.id.cmp(&b.id)));
        Ok(matched)
    }

    async fn find(&self, ids: &[ObjectId]) -> Result<Vec<JobRecord>> {
        let jobs = self.jobs.lock().await;
        let mut found: Vec<JobRecord> = Vec::new();
        for id in ids {
            if let Some(job) = jobs.get(id) {
                if !found.iter().any(|f| f.id == *id) {
                    found.push(job.clone());
                }
            }
        }
        Ok(found)
    }

    async fn update_guarded(&self, ids: &[ObjectId], guard: Guard, patch: Patch) -> Result<u64> {
        let mut jobs = self.jobs.lock().await;
        let mut matched = 0;
        for job in jobs.values_mut() {
            if ids.contains(&job.id) && guard.admits(job) {
                patch.apply(job);
                matched += 1;
            }
        }
        Ok(matched)
    }

    async fn delete(&self, ids: &[ObjectId]) -> Result<u64> {
        let mut jobs = self.jobs.lock().await;
        let before = jobs.len();
        jobs.retain(|id, _| !ids.contains(id));
        Ok((before - jobs.len()) as u64)
    }

    async fn insert(&self, job: JobRecord) -> Result<ObjectId> {
        let id = job.id;
        self.jobs.lock().await.insert(id, job);
        Ok(id)
    }
}
