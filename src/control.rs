//! Operator controls over individual jobs.
//!
//! Every transition except delete and create carries a guard excluding jobs
//! already in the target state, so "nothing changed" comes back as
//! [`Error::NoMatch`] and the operator learns their selection was stale.

use chrono::Utc;
use futures::future::try_join_all;
use mongodb::bson::{oid::ObjectId, Bson};

use crate::error::{ControlOp, Error, Result};
use crate::job::{from_chrono, JobRecord};
use crate::schedule::{parse_interval, parse_when};
use crate::store::{Guard, JobStore, Patch};

/// A job an operator asks for. At least one of `schedule` and
/// `repeat_every` is required; blank strings count as absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateJob {
    pub name: String,
    pub schedule: Option<String>,
    pub repeat_every: Option<String>,
    pub data: Option<Bson>,
    pub repeat_timezone: Option<String>,
}

async fn guarded(
    store: &dyn JobStore,
    op: ControlOp,
    ids: &[ObjectId],
    guard: Guard,
    patch: Patch,
) -> Result<u64> {
    if ids.is_empty() {
        return Ok(0);
    }

    let matched = store.update_guarded(ids, guard, patch).await?;
    if matched == 0 {
        tracing::debug!(operation = %op, requested = ids.len(), "No job matched");
        return Err(Error::NoMatch(op));
    }

    tracing::info!(operation = %op, jobs = matched, "Updated jobs");
    Ok(matched)
}

/// Makes unlocked jobs due immediately. Locked jobs are skipped so a running
/// job is never started a second time.
pub async fn run(store: &dyn JobStore, ids: &[ObjectId]) -> Result<u64> {
    let now = from_chrono(Utc::now());
    guarded(store, ControlOp::Run, ids, Guard::Unlocked, Patch::RunAt(now)).await
}

pub async fn unlock(store: &dyn JobStore, ids: &[ObjectId]) -> Result<u64> {
    guarded(store, ControlOp::Unlock, ids, Guard::Locked, Patch::ClearLock).await
}

pub async fn enable(store: &dyn JobStore, ids: &[ObjectId]) -> Result<u64> {
    guarded(store, ControlOp::Enable, ids, Guard::Disabled, Patch::ClearDisabled).await
}

pub async fn disable(store: &dyn JobStore, ids: &[ObjectId]) -> Result<u64> {
    guarded(store, ControlOp::Disable, ids, Guard::Enabled, Patch::Disable).await
}

pub async fn delete(store: &dyn JobStore, ids: &[ObjectId]) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }

    let deleted = store.delete(ids).await?;
    if deleted == 0 {
        return Err(Error::NotFound);
    }

    tracing::info!(operation = %ControlOp::Delete, jobs = deleted, "Deleted jobs");
    Ok(())
}

/// Creates a fresh, immediately due copy (same name and data) of every
/// existing job in `ids`. Succeeds only if every copy was stored.
pub async fn requeue(store: &dyn JobStore, ids: &[ObjectId]) -> Result<Vec<JobRecord>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let originals = store.find(ids).await?;
    if originals.is_empty() {
        return Err(Error::NotFound);
    }

    let now = from_chrono(Utc::now());
    let copies: Vec<JobRecord> = originals
        .iter()
        .map(|job| JobRecord::new(&job.name, job.data.clone(), now))
        .collect();

    try_join_all(copies.iter().cloned().map(|job| store.insert(job))).await?;

    tracing::info!(operation = %ControlOp::Requeue, jobs = copies.len(), "Requeued jobs");
    Ok(copies)
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub async fn create(store: &dyn JobStore, request: CreateJob) -> Result<JobRecord> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(Error::InvalidCreate("a job name is required".into()));
    }

    let now = Utc::now();
    let schedule = present(request.schedule)
        .map(|schedule| parse_when(&schedule, now))
        .transpose()
        .map_err(Error::InvalidCreate)?;
    let repeat_every = present(request.repeat_every)
        .map(|interval| parse_interval(&interval).map(|parsed| (interval, parsed)))
        .transpose()
        .map_err(Error::InvalidCreate)?;

    let mut job = JobRecord::new(name, request.data, from_chrono(now));
    let first_run = match (schedule, &repeat_every) {
        (Some(at), _) => at,
        (None, Some((_, interval))) => interval.first_run(now),
        (None, None) => {
            return Err(Error::InvalidCreate(
                "a schedule or a repeat interval is required".into(),
            ))
        }
    };
    job.next_run_at = Some(from_chrono(first_run));
    job.repeat_interval = repeat_every.map(|(interval, _)| Bson::String(interval));
    job.repeat_timezone = present(request.repeat_timezone);

    store.insert(job.clone()).await?;
    tracing::info!(operation = %ControlOp::Create, name = %job.name, id = %job.id, "Created job");
    Ok(job)
}
