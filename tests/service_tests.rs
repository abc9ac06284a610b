use std::sync::Arc;

use chrono::Utc;
use tonic::{Code, Request};

use jobdash::job::from_chrono;
use jobdash::proto::job_dashboard_server::JobDashboard;
use jobdash::proto::{ApiRequest, CreateJobRequest, JobIdsRequest};
use jobdash::service::DashboardService;
use jobdash::{Dashboard, JobRecord, MemoryStore};

fn service(jobs: Vec<JobRecord>) -> (Arc<MemoryStore>, DashboardService) {
    let store = Arc::new(MemoryStore::with_jobs(jobs));
    let dashboard = Arc::new(Dashboard::with_store("Operations", store.clone()));
    (store, DashboardService::new(dashboard))
}

fn ids(jobs: &[&JobRecord]) -> Request<JobIdsRequest> {
    Request::new(JobIdsRequest {
        job_ids: jobs.iter().map(|job| job.id.to_hex()).collect(),
    })
}

#[tokio::test]
async fn api_reports_overview_jobs_and_request() {
    let job = JobRecord::new("email", None, from_chrono(Utc::now()));
    let (_, service) = service(vec![job.clone()]);

    let response = service
        .api(Request::new(ApiRequest {
            job: String::new(),
            state: "queued".into(),
        }))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(response.title, "Operations");
    assert_eq!(response.overview.len(), 2);
    assert_eq!(response.overview[0].display_name, "All Jobs");
    assert_eq!(response.overview[1].display_name, "email");
    assert_eq!(response.overview[1].meta[0].r#type, "normal");
    assert_eq!(response.jobs.len(), 1);
    assert_eq!(response.jobs[0].id, job.id.to_hex());
    assert!(response.jobs[0].status.as_ref().unwrap().queued);
    assert!(response.jobs[0].last_run_at.is_empty());

    let current = response.current_request.unwrap();
    assert_eq!(current.job, "All Jobs");
    assert_eq!(current.state, "queued");
}

#[tokio::test]
async fn guard_failures_are_failed_preconditions() {
    let job = JobRecord::new("email", None, from_chrono(Utc::now()));
    let (_, service) = service(vec![job.clone()]);

    let modified = service.disable_jobs(ids(&[&job])).await.unwrap().into_inner().modified;
    assert_eq!(modified, 1);

    let status = service.disable_jobs(ids(&[&job])).await.unwrap_err();
    assert_eq!(status.code(), Code::FailedPrecondition);
    assert_eq!(status.message(), "jobs not found, or jobs were already disabled");

    let status = service.unlock_jobs(ids(&[&job])).await.unwrap_err();
    assert_eq!(status.code(), Code::FailedPrecondition);
}

#[tokio::test]
async fn requeue_and_delete_round_trip() {
    let job = JobRecord::new("email", None, from_chrono(Utc::now()));
    let (store, service) = service(vec![job.clone()]);

    let copies = service.requeue_jobs(ids(&[&job])).await.unwrap().into_inner().jobs;
    assert_eq!(copies.len(), 1);
    assert_ne!(copies[0].id, job.id.to_hex());
    assert_eq!(store.len().await, 2);

    service.delete_jobs(ids(&[&job])).await.unwrap();
    assert_eq!(store.len().await, 1);
    let status = service.delete_jobs(ids(&[&job])).await.unwrap_err();
    assert_eq!(status.code(), Code::NotFound);
}

#[tokio::test]
async fn create_validates_its_input() {
    let (store, service) = service(Vec::new());

    let status = service
        .create_job(Request::new(CreateJobRequest {
            name: "report".into(),
            ..Default::default()
        }))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    let job = service
        .create_job(Request::new(CreateJobRequest {
            name: "report".into(),
            repeat_every: "1 hour".into(),
            data: r#"{"format": "pdf"}"#.into(),
            ..Default::default()
        }))
        .await
        .unwrap()
        .into_inner()
        .job
        .unwrap();
    assert_eq!(job.repeat_interval, "1 hour");
    assert!(job.status.unwrap().repeating);
    assert!(job.data.contains("pdf"));
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn not_ready_is_unavailable() {
    let service = DashboardService::new(Arc::new(Dashboard::new("Operations")));
    let status = service
        .api(Request::new(ApiRequest::default()))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unavailable);
}

#[tokio::test]
async fn malformed_ids_are_invalid_arguments() {
    let (_, service) = service(Vec::new());
    let status = service
        .run_jobs(Request::new(JobIdsRequest {
            job_ids: vec!["42".into()],
        }))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
}
