pub mod config;
pub mod control;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod job;
pub mod logging;
pub mod overview;
pub mod schedule;
pub mod service;
pub mod status;
pub mod store;

pub mod proto {
    tonic::include_proto!("jobdash"); // The string specified here must match the proto package name
}

pub use control::CreateJob;
pub use dashboard::{ApiResponse, Dashboard};
pub use error::{ControlOp, Error, Result};
pub use job::JobRecord;
pub use status::{classify, JobStatus, StatusFlag};
pub use store::{JobStore, MemoryStore};
