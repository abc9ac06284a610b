//! gRPC control surface over [`Dashboard`].

use std::sync::Arc;

use chrono::Utc;
use mongodb::bson::Bson;
use tonic::{Request, Response, Status};

use crate::control::CreateJob;
use crate::dashboard::{ApiResponse, Dashboard};
use crate::error::Error;
use crate::job::{from_chrono, to_rfc3339, JobMeta, JobRecord};
use crate::overview::OverviewRow;
use crate::proto;
use crate::proto::job_dashboard_server::JobDashboard;
use crate::status::{classify, JobStatus};

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        let message = err.to_string();
        match err {
            Error::NotReady => Status::unavailable(message),
            Error::NoMatch(_) => Status::failed_precondition(message),
            Error::NotFound => Status::not_found(message),
            Error::InvalidCreate(_) | Error::InvalidJobId(_) | Error::InvalidState(_) => {
                Status::invalid_argument(message)
            }
            Error::Store(_) => Status::internal(message),
        }
    }
}

fn meta_to_proto(meta: &JobMeta) -> proto::JobMeta {
    proto::JobMeta {
        r#type: meta.job_type.clone().unwrap_or_default(),
        has_priority: meta.priority.is_some(),
        priority: meta.priority.unwrap_or_default(),
        repeat_interval: meta.repeat_interval.clone().unwrap_or_default(),
        repeat_timezone: meta.repeat_timezone.clone().unwrap_or_default(),
    }
}

fn row_to_proto(row: &OverviewRow) -> proto::OverviewRow {
    proto::OverviewRow {
        display_name: row.display_name.clone(),
        meta: row.meta.iter().map(meta_to_proto).collect(),
        total: row.counts.total,
        running: row.counts.running,
        scheduled: row.counts.scheduled,
        queued: row.counts.queued,
        completed: row.counts.completed,
        failed: row.counts.failed,
        repeating: row.counts.repeating,
        disabled: row.counts.disabled,
    }
}

fn data_to_json(data: &Option<Bson>) -> String {
    data.clone()
        .map(|data| data.into_relaxed_extjson().to_string())
        .unwrap_or_default()
}

fn data_from_json(data: &str) -> Result<Option<Bson>, Error> {
    if data.trim().is_empty() {
        return Ok(None);
    }
    let value: serde_json::Value = serde_json::from_str(data)
        .map_err(|err| Error::InvalidCreate(format!("job data is not valid JSON: {}", err)))?;
    mongodb::bson::to_bson(&value)
        .map(Some)
        .map_err(|err| Error::InvalidCreate(format!("job data cannot be stored: {}", err)))
}

pub fn job_to_proto(job: &JobRecord, status: &JobStatus) -> proto::Job {
    proto::Job {
        id: job.id.to_hex(),
        name: job.name.clone(),
        data: data_to_json(&job.data),
        r#type: job.job_type.clone().unwrap_or_default(),
        has_priority: job.priority.is_some(),
        priority: job.priority.unwrap_or_default(),
        next_run_at: to_rfc3339(job.next_run_at),
        last_run_at: to_rfc3339(job.last_run_at),
        last_finished_at: to_rfc3339(job.last_finished_at),
        failed_at: to_rfc3339(job.failed_at),
        locked_at: to_rfc3339(job.locked_at),
        repeat_interval: job.repeat_interval_text().unwrap_or_default(),
        repeat_timezone: job.repeat_timezone.clone().unwrap_or_default(),
        disabled: job.disabled.unwrap_or_default(),
        fail_reason: job.fail_reason.clone().unwrap_or_default(),
        fail_count: job.fail_count.unwrap_or_default(),
        status: Some(proto::JobStatus {
            running: status.running,
            scheduled: status.scheduled,
            queued: status.queued,
            completed: status.completed,
            failed: status.failed,
            repeating: status.repeating,
            disabled: status.disabled,
        }),
    }
}

fn api_to_proto(response: ApiResponse) -> proto::ApiResponse {
    proto::ApiResponse {
        overview: response.overview.iter().map(row_to_proto).collect(),
        jobs: response
            .jobs
            .iter()
            .map(|classified| job_to_proto(&classified.job, &classified.status))
            .collect(),
        title: response.title,
        current_request: Some(proto::CurrentRequest {
            title: response.current_request.title,
            job: response.current_request.job,
            state: response
                .current_request
                .state
                .map(|state| state.to_string())
                .unwrap_or_default(),
        }),
    }
}

fn log_rejection(operation: &str, err: &Error) {
    match err {
        Error::Store(_) => tracing::error!(operation, error = %err, "Job store call failed"),
        _ => tracing::warn!(operation, error = %err, "Request rejected"),
    }
}

pub struct DashboardService {
    dashboard: Arc<Dashboard>,
}

impl DashboardService {
    pub fn new(dashboard: Arc<Dashboard>) -> DashboardService {
        DashboardService { dashboard }
    }
}

#[tonic::async_trait]
impl JobDashboard for DashboardService {
    async fn api(
        &self,
        request: Request<proto::ApiRequest>,
    ) -> Result<Response<proto::ApiResponse>, Status> {
        let request = request.into_inner();
        let response = self
            .dashboard
            .api(Some(request.job.as_str()), Some(request.state.as_str()))
            .await
            .map_err(|err| {
                log_rejection("api", &err);
                err
            })?;
        Ok(Response::new(api_to_proto(response)))
    }

    async fn run_jobs(
        &self,
        request: Request<proto::JobIdsRequest>,
    ) -> Result<Response<proto::ModifiedResponse>, Status> {
        let ids = request.into_inner().job_ids;
        let modified = self.dashboard.run_jobs(&ids).await.map_err(|err| {
            log_rejection("run", &err);
            err
        })?;
        Ok(Response::new(proto::ModifiedResponse { modified }))
    }

    async fn requeue_jobs(
        &self,
        request: Request<proto::JobIdsRequest>,
    ) -> Result<Response<proto::RequeueResponse>, Status> {
        let ids = request.into_inner().job_ids;
        let jobs = self.dashboard.requeue_jobs(&ids).await.map_err(|err| {
            log_rejection("requeue", &err);
            err
        })?;
        let now = from_chrono(Utc::now());
        Ok(Response::new(proto::RequeueResponse {
            jobs: jobs
                .iter()
                .map(|job| job_to_proto(job, &classify(job, now)))
                .collect(),
        }))
    }

    async fn unlock_jobs(
        &self,
        request: Request<proto::JobIdsRequest>,
    ) -> Result<Response<proto::ModifiedResponse>, Status> {
        let ids = request.into_inner().job_ids;
        let modified = self.dashboard.unlock_jobs(&ids).await.map_err(|err| {
            log_rejection("unlock", &err);
            err
        })?;
        Ok(Response::new(proto::ModifiedResponse { modified }))
    }

    async fn enable_jobs(
        &self,
        request: Request<proto::JobIdsRequest>,
    ) -> Result<Response<proto::ModifiedResponse>, Status> {
        let ids = request.into_inner().job_ids;
        let modified = self.dashboard.enable_jobs(&ids).await.map_err(|err| {
            log_rejection("enable", &err);
            err
        })?;
        Ok(Response::new(proto::ModifiedResponse { modified }))
    }

    async fn disable_jobs(
        &self,
        request: Request<proto::JobIdsRequest>,
    ) -> Result<Response<proto::ModifiedResponse>, Status> {
        let ids = request.into_inner().job_ids;
        let modified = self.dashboard.disable_jobs(&ids).await.map_err(|err| {
            log_rejection("disable", &err);
            err
        })?;
        Ok(Response::new(proto::ModifiedResponse { modified }))
    }

    async fn delete_jobs(
        &self,
        request: Request<proto::JobIdsRequest>,
    ) -> Result<Response<proto::DeleteResponse>, Status> {
        let ids = request.into_inner().job_ids;
        self.dashboard.delete_jobs(&ids).await.map_err(|err| {
            log_rejection("delete", &err);
            err
        })?;
        Ok(Response::new(proto::DeleteResponse {}))
    }

    async fn create_job(
        &self,
        request: Request<proto::CreateJobRequest>,
    ) -> Result<Response<proto::CreateJobResponse>, Status> {
        let request = request.into_inner();
        let create = CreateJob {
            name: request.name,
            schedule: Some(request.schedule),
            repeat_every: Some(request.repeat_every),
            data: data_from_json(&request.data)?,
            repeat_timezone: Some(request.repeat_timezone),
        };

        let job = self.dashboard.create_job(create).await.map_err(|err| {
            log_rejection("create", &err);
            err
        })?;
        let status = classify(&job, from_chrono(Utc::now()));
        Ok(Response::new(proto::CreateJobResponse {
            job: Some(job_to_proto(&job, &status)),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_distinct_status_codes() {
        use crate::error::ControlOp;
        use tonic::Code;

        assert_eq!(Status::from(Error::NotReady).code(), Code::Unavailable);
        assert_eq!(
            Status::from(Error::NoMatch(ControlOp::Unlock)).code(),
            Code::FailedPrecondition
        );
        assert_eq!(Status::from(Error::NotFound).code(), Code::NotFound);
        assert_eq!(
            Status::from(Error::InvalidCreate("x".into())).code(),
            Code::InvalidArgument
        );
        assert_eq!(Status::from(Error::Store("boom".into())).code(), Code::Internal);
        assert_eq!(Status::from(Error::NotFound).message(), "jobs not found");
    }

    #[test]
    fn data_travels_as_json() {
        let data = data_from_json(r#"{"to": "ops@example.com", "retries": 3}"#).unwrap();
        let doc = match &data {
            Some(Bson::Document(doc)) => doc.clone(),
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(doc.get_str("to").unwrap(), "ops@example.com");
        assert!(doc.contains_key("retries"));
        assert_eq!(data_from_json("  ").unwrap(), None);
        assert!(matches!(data_from_json("{nope"), Err(Error::InvalidCreate(_))));

        let json = data_to_json(&data);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["to"], "ops@example.com");
        assert_eq!(value["retries"], 3);
    }
}
