//! Listing and per-name overview built from one classification pass.

use std::collections::{BTreeMap, BTreeSet};

use mongodb::bson::DateTime;

use crate::job::{JobMeta, JobRecord};
use crate::status::{classify, JobStatus, StatusFlag};

/// Name of the synthetic overview row totalling every job.
pub const ALL_JOBS: &str = "All Jobs";

pub const PAGE_LIMIT: usize = 200;

/// Window into a listing. Only the first page is reachable from the public
/// surface today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Page {
            offset: 0,
            limit: PAGE_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedJob {
    pub job: JobRecord,
    pub status: JobStatus,
}

/// Classifies already sorted jobs, keeps those with `state` set, then pages.
pub fn listing(
    jobs: Vec<JobRecord>,
    state: Option<StatusFlag>,
    page: Page,
    now: DateTime,
) -> Vec<ClassifiedJob> {
    jobs.into_iter()
        .map(|job| {
            let status = classify(&job, now);
            ClassifiedJob { job, status }
        })
        .filter(|classified| state.map_or(true, |flag| classified.status.get(flag)))
        .skip(page.offset)
        .take(page.limit)
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub total: u64,
    pub running: u64,
    pub scheduled: u64,
    pub queued: u64,
    pub completed: u64,
    pub failed: u64,
    pub repeating: u64,
    pub disabled: u64,
}

impl StatusCounts {
    pub fn count(&mut self, status: &JobStatus) {
        self.total += 1;
        self.running += status.running as u64;
        self.scheduled += status.scheduled as u64;
        self.queued += status.queued as u64;
        self.completed += status.completed as u64;
        self.failed += status.failed as u64;
        self.repeating += status.repeating as u64;
        self.disabled += status.disabled as u64;
    }

    pub fn merge(&mut self, other: &StatusCounts) {
        self.total += other.total;
        self.running += other.running;
        self.scheduled += other.scheduled;
        self.queued += other.queued;
        self.completed += other.completed;
        self.failed += other.failed;
        self.repeating += other.repeating;
        self.disabled += other.disabled;
    }

    pub fn get(&self, flag: StatusFlag) -> u64 {
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

/// One overview row. `meta` holds every distinct configuration seen under
/// the name; more than one means jobs sharing a name have diverged.
#[derive(Debug, Clone, PartialEq)]
pub struct OverviewRow {
    pub display_name: String,
    pub meta: BTreeSet<JobMeta>,
    pub counts: StatusCounts,
}

impl OverviewRow {
    fn new(display_name: &str) -> OverviewRow {
        OverviewRow {
            display_name: display_name.to_owned(),
            meta: BTreeSet::new(),
            counts: StatusCounts::default(),
        }
    }
}

/// Groups by name, ordered by name, behind an [`ALL_JOBS`] row holding the
/// sum of every group. The totals row is present even with no jobs.
pub fn overview(jobs: &[JobRecord], now: DateTime) -> Vec<OverviewRow> {
    let mut groups: BTreeMap<&str, OverviewRow> = BTreeMap::new();
    for job in jobs {
        let row = groups
            .entry(job.name.as_str())
            .or_insert_with(|| OverviewRow::new(&job.name));
        row.meta.insert(job.meta());
        row.counts.count(&classify(job, now));
    }

    let mut totals = OverviewRow::new(ALL_JOBS);
    for row in groups.values() {
        totals.counts.merge(&row.counts);
    }

    let mut rows = Vec::with_capacity(groups.len() + 1);
    rows.push(totals);
    rows.extend(groups.into_values());
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    fn job(name: &str, next_run_offset: Option<i64>) -> JobRecord {
        let mut job = JobRecord::new(name, None, DateTime::from_millis(NOW));
        job.next_run_at = next_run_offset.map(|offset| DateTime::from_millis(NOW + offset));
        job
    }

    fn now() -> DateTime {
        DateTime::from_millis(NOW)
    }

    fn sample() -> Vec<JobRecord> {
        let mut failed = job("email", None);
        failed.last_finished_at = Some(DateTime::from_millis(NOW - 1_000));
        failed.failed_at = failed.last_finished_at;

        let mut repeating = job("report", Some(60_000));
        repeating.repeat_interval = Some("1 hour".into());

        let mut disabled = job("report", Some(-60_000));
        disabled.disabled = Some(true);
        disabled.priority = Some(10);

        let mut running = job("cleanup", None);
        running.last_run_at = Some(DateTime::from_millis(NOW - 500));

        vec![job("email", Some(5_000)), failed, repeating, disabled, running]
    }

    #[test]
    fn all_jobs_row_is_the_sum_of_the_groups() {
        let rows = overview(&sample(), now());
        let (all, groups) = rows.split_first().unwrap();
        assert_eq!(all.display_name, ALL_JOBS);
        assert!(all.meta.is_empty());

        let total: u64 = groups.iter().map(|row| row.counts.total).sum();
        assert_eq!(total, all.counts.total);
        assert_eq!(all.counts.total, 5);
        for flag in StatusFlag::ALL {
            let sum: u64 = groups.iter().map(|row| row.counts.get(flag)).sum();
            assert_eq!(sum, all.counts.get(flag), "{}", flag);
        }
        assert_eq!(all.counts.failed, 1);
        assert_eq!(all.counts.running, 1);
        assert_eq!(all.counts.disabled, 1);
    }

    #[test]
    fn groups_are_ordered_by_name_with_distinct_meta() {
        let rows = overview(&sample(), now());
        let names: Vec<&str> = rows.iter().map(|row| row.display_name.as_str()).collect();
        assert_eq!(names, vec![ALL_JOBS, "cleanup", "email", "report"]);

        let report = &rows[3];
        assert_eq!(report.counts.total, 2);
        assert_eq!(report.meta.len(), 2);
        let email = &rows[2];
        assert_eq!(email.meta.len(), 1);
    }

    #[test]
    fn empty_store_still_has_a_totals_row() {
        let rows = overview(&[], now());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].display_name, ALL_JOBS);
        assert_eq!(rows[0].counts, StatusCounts::default());
    }

    #[test]
    fn listing_filters_by_flag_and_keeps_order() {
        let jobs = sample();
        let scheduled = listing(jobs.clone(), Some(StatusFlag::Scheduled), Page::default(), now());
        let names: Vec<&str> = scheduled.iter().map(|c| c.job.name.as_str()).collect();
        assert_eq!(names, vec!["email", "report"]);
        assert!(scheduled.iter().all(|c| c.status.scheduled));

        assert_eq!(listing(jobs, None, Page::default(), now()).len(), 5);
    }

    #[test]
    fn listing_is_bounded_by_the_page() {
        let jobs: Vec<JobRecord> = (0..250).map(|i| job("bulk", Some(i))).collect();
        let first = listing(jobs.clone(), None, Page::default(), now());
        assert_eq!(first.len(), PAGE_LIMIT);
        assert_eq!(first[0].job.id, jobs[0].id);

        let rest = listing(jobs.clone(), None, Page { offset: 200, limit: PAGE_LIMIT }, now());
        assert_eq!(rest.len(), 50);
        assert_eq!(rest[0].job.id, jobs[200].id);
    }
}
