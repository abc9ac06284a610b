//! Lifecycle flags derived from a job's timestamps.
//!
//! Storage has no status field: the execution engine communicates state only
//! by writing timestamps, so [`classify`] is the one place those timestamps
//! are turned into flags. Absent timestamps compare as earlier than any real
//! timestamp, which is exactly how `Option<DateTime>` orders.

use std::fmt;
use std::str::FromStr;

use mongodb::bson::DateTime;

use crate::error::Error;
use crate::job::JobRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusFlag {
    Running,
    Scheduled,
    Queued,
    Completed,
    Failed,
    Repeating,
    Disabled,
}

impl StatusFlag {
    pub const ALL: [StatusFlag; 7] = [
        StatusFlag::Running,
        StatusFlag::Scheduled,
        StatusFlag::Queued,
        StatusFlag::Completed,
        StatusFlag::Failed,
        StatusFlag::Repeating,
        StatusFlag::Disabled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusFlag::Running => "running",
            StatusFlag::Scheduled => "scheduled",
            StatusFlag::Queued => "queued",
            StatusFlag::Completed => "completed",
            StatusFlag::Failed => "failed",
            StatusFlag::Repeating => "repeating",
            StatusFlag::Disabled => "disabled",
        }
    }
}

impl fmt::Display for StatusFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusFlag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StatusFlag::ALL
            .iter()
            .copied()
            .find(|flag| flag.as_str() == s)
            .ok_or_else(|| Error::InvalidState(s.to_owned()))
    }
}

/// Independent flags: a job may be scheduled and repeating at once, or
/// queued while still showing the failure of its previous run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobStatus {
    pub running: bool,
    pub scheduled: bool,
    pub queued: bool,
    pub completed: bool,
    pub failed: bool,
    pub repeating: bool,
    pub disabled: bool,
}

impl JobStatus {
    pub fn get(&self, flag: StatusFlag) -> bool {
        match flag {
            StatusFlag::Running => self.running,
            StatusFlag::Scheduled => self.scheduled,
            StatusFlag::Queued => self.queued,
            StatusFlag::Completed => self.completed,
            StatusFlag::Failed => self.failed,
            StatusFlag::Repeating => self.repeating,
            StatusFlag::Disabled => self.disabled,
        }
    }
}

/// Classify one job. `now` must be captured once per batch by the caller so
/// every job of a listing is judged against the same instant.
pub fn classify(job: &JobRecord, now: DateTime) -> JobStatus {
    let now = Some(now);

    JobStatus {
        running: job.last_run_at.is_some() && job.last_run_at > job.last_finished_at,
        scheduled: job.next_run_at.is_some() && job.next_run_at >= now,
        queued: job.next_run_at.is_some()
            && now >= job.next_run_at
            && job.next_run_at >= job.last_finished_at,
        completed: job.last_finished_at.is_some() && job.last_finished_at > job.failed_at,
        failed: job.last_finished_at.is_some()
            && job.failed_at.is_some()
            && job.last_finished_at == job.failed_at,
        repeating: job.repeat_interval.is_some(),
        disabled: job.disabled == Some(true),
    }
}
