use std::sync::Arc;

use chrono::Utc;
use once_cell::sync::OnceCell;

use crate::control::{self, CreateJob};
use crate::error::{Error, Result};
use crate::job::{from_chrono, parse_job_ids, JobRecord};
use crate::overview::{listing, overview, ClassifiedJob, OverviewRow, Page, ALL_JOBS};
use crate::status::StatusFlag;
use crate::store::{JobQuery, JobStore};

#[derive(Debug, Clone, PartialEq)]
pub struct CurrentRequest {
    pub title: String,
    pub job: String,
    pub state: Option<StatusFlag>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub overview: Vec<OverviewRow>,
    pub jobs: Vec<ClassifiedJob>,
    pub title: String,
    pub current_request: CurrentRequest,
}

/// Entry point for every read and control operation.
///
/// The store is attached once it has connected; until then every operation
/// fails with [`Error::NotReady`].
pub struct Dashboard {
    title: String,
    store: OnceCell<Arc<dyn JobStore>>,
}

impl Dashboard {
    pub fn new(title: impl Into<String>) -> Dashboard {
        Dashboard {
            title: title.into(),
            store: OnceCell::new(),
        }
    }

    pub fn with_store(title: impl Into<String>, store: Arc<dyn JobStore>) -> Dashboard {
        let dashboard = Dashboard::new(title);
        dashboard.attach(store);
        dashboard
    }

    /// Returns false if a store was already attached.
    pub fn attach(&self, store: Arc<dyn JobStore>) -> bool {
        self.store.set(store).is_ok()
    }

    pub fn is_ready(&self) -> bool {
        self.store.get().is_some()
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    fn store(&self) -> Result<&dyn JobStore> {
        self.store.get().map(|store| store.as_ref()).ok_or(Error::NotReady)
    }

    /// Overview of every job plus the listing for an optional job name and
    /// state. Both are judged against the same instant.
    pub async fn api(&self, job: Option<&str>, state: Option<&str>) -> Result<ApiResponse> {
        let store = self.store()?;
        let job = job.filter(|name| !name.is_empty() && *name != ALL_JOBS);
        let state = state
            .filter(|state| !state.is_empty())
            .map(str::parse::<StatusFlag>)
            .transpose()?;

        let all = store.query(&JobQuery::all()).await?;
        let matching = match job {
            Some(name) => {
                let named = JobQuery::named(name);
                all.iter().filter(|record| named.matches(record)).cloned().collect()
            }
            None => all.clone(),
        };

        let now = from_chrono(Utc::now());
        let response = ApiResponse {
            overview: overview(&all, now),
            jobs: listing(matching, state, Page::default(), now),
            title: self.title.clone(),
            current_request: CurrentRequest {
                title: self.title.clone(),
                job: job.unwrap_or(ALL_JOBS).to_owned(),
                state,
            },
        };

        tracing::debug!(
            job = %response.current_request.job,
            state = ?state,
            listed = response.jobs.len(),
            "Served job listing"
        );
        Ok(response)
    }

    pub async fn run_jobs<S: AsRef<str>>(&self, ids: &[S]) -> Result<u64> {
        let store = self.store()?;
        control::run(store, &parse_job_ids(ids)?).await
    }

    pub async fn requeue_jobs<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<JobRecord>> {
        let store = self.store()?;
        control::requeue(store, &parse_job_ids(ids)?).await
    }

    pub async fn unlock_jobs<S: AsRef<str>>(&self, ids: &[S]) -> Result<u64> {
        let store = self.store()?;
        control::unlock(store, &parse_job_ids(ids)?).await
    }

    pub async fn enable_jobs<S: AsRef<str>>(&self, ids: &[S]) -> Result<u64> {
        let store = self.store()?;
        control::enable(store, &parse_job_ids(ids)?).await
    }

    pub async fn disable_jobs<S: AsRef<str>>(&self, ids: &[S]) -> Result<u64> {
        let store = self.store()?;
        control::disable(store, &parse_job_ids(ids)?).await
    }

    pub async fn delete_jobs<S: AsRef<str>>(&self, ids: &[S]) -> Result<()> {
        let store = self.store()?;
        control::delete(store, &parse_job_ids(ids)?).await
    }

    pub async fn create_job(&self, request: CreateJob) -> Result<JobRecord> {
        let store = self.store()?;
        control::create(store, request).await
    }
}
