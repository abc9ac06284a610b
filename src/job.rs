use chrono::{TimeZone, Utc};
use mongodb::bson::{oid::ObjectId, Bson, DateTime};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// Type given to jobs created from the dashboard.
pub const DEFAULT_JOB_TYPE: &str = "normal";

/// A persisted job as the execution engine stores it.
///
/// The execution engine owns `locked_at`, `last_run_at`, `last_finished_at`
/// and `failed_at`. The dashboard only writes `next_run_at`, `disabled` and
/// clears `locked_at`. A BSON `null` reads back as `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Bson>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub job_type: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_integer",
        skip_serializing_if = "Option::is_none"
    )]
    pub priority: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run_at: Option<DateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_finished_at: Option<DateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_at: Option<DateTime>,
    /// Human interval or cron text, or a number of milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_interval: Option<Bson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat_timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified_by: Option<String>,
}

impl JobRecord {
    /// A fresh job due immediately, the way the execution engine creates one.
    pub fn new(name: &str, data: Option<Bson>, now: DateTime) -> JobRecord {
        JobRecord {
            id: ObjectId::new(),
            name: name.to_owned(),
            data,
            job_type: Some(DEFAULT_JOB_TYPE.to_owned()),
            priority: Some(0),
            next_run_at: Some(now),
            last_run_at: None,
            last_finished_at: None,
            failed_at: None,
            locked_at: None,
            repeat_interval: None,
            repeat_timezone: None,
            disabled: None,
            fail_reason: None,
            fail_count: None,
            last_modified_by: None,
        }
    }

    /// `repeat_interval` as display text, whatever its stored type.
    pub fn repeat_interval_text(&self) -> Option<String> {
        self.repeat_interval.as_ref().map(|interval| match interval {
            Bson::String(text) => text.clone(),
            Bson::Int32(millis) => millis.to_string(),
            Bson::Int64(millis) => millis.to_string(),
            Bson::Double(millis) => millis.to_string(),
            other => other.to_string(),
        })
    }

    pub fn meta(&self) -> JobMeta {
        JobMeta {
            job_type: self.job_type.clone(),
            priority: self.priority,
            repeat_interval: self.repeat_interval_text(),
            repeat_timezone: self.repeat_timezone.clone(),
        }
    }

    /// Listing order: next run, then last finish, then last run, absent first.
    pub fn sort_key(&self) -> (Option<DateTime>, Option<DateTime>, Option<DateTime>) {
        (self.next_run_at, self.last_finished_at, self.last_run_at)
    }
}

/// Scheduling configuration of a job, compared across jobs sharing a name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobMeta {
    pub job_type: Option<String>,
    pub priority: Option<i64>,
    pub repeat_interval: Option<String>,
    pub repeat_timezone: Option<String>,
}

/// Numbers written as int32, int64 or double all read as an integer.
/// Anything else reads as absent rather than failing the whole document.
fn lenient_integer<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Bson>::deserialize(deserializer)?;
    Ok(match value {
        Some(Bson::Int32(n)) => Some(i64::from(n)),
        Some(Bson::Int64(n)) => Some(n),
        Some(Bson::Double(n)) if n.is_finite() => Some(n.round() as i64),
        _ => None,
    })
}

pub fn parse_job_ids<S: AsRef<str>>(ids: &[S]) -> Result<Vec<ObjectId>> {
    ids.iter()
        .map(|id| {
            let id = id.as_ref();
            ObjectId::parse_str(id).map_err(|_| Error::InvalidJobId(id.to_owned()))
        })
        .collect()
}

pub fn from_chrono(ts: chrono::DateTime<Utc>) -> DateTime {
    DateTime::from_millis(ts.timestamp_millis())
}

pub fn to_chrono(ts: DateTime) -> chrono::DateTime<Utc> {
    Utc.timestamp_millis_opt(ts.timestamp_millis())
        .single()
        .unwrap_or_else(|| chrono::DateTime::<Utc>::from(std::time::UNIX_EPOCH))
}

pub fn to_rfc3339(ts: Option<DateTime>) -> String {
    ts.map(|ts| to_chrono(ts).to_rfc3339()).unwrap_or_default()
}
