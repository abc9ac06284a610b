use std::fmt;

use thiserror::Error;

/// Operations exposed to operators. Used to name the operation in logs and
/// to word a [`Error::NoMatch`] failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOp {
    Run,
    Requeue,
    Unlock,
    Enable,
    Disable,
    Delete,
    Create,
}

impl ControlOp {
    fn no_match_reason(&self) -> &'static str {
        match self {
            ControlOp::Run => "jobs not found, or jobs were locked",
            ControlOp::Unlock => "jobs not found, or jobs were not locked",
            ControlOp::Enable => "jobs not found, or jobs were already enabled",
            ControlOp::Disable => "jobs not found, or jobs were already disabled",
            ControlOp::Requeue | ControlOp::Delete | ControlOp::Create => "jobs not found",
        }
    }
}

impl fmt::Display for ControlOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ControlOp::Run => "run",
            ControlOp::Requeue => "requeue",
            ControlOp::Unlock => "unlock",
            ControlOp::Enable => "enable",
            ControlOp::Disable => "disable",
            ControlOp::Delete => "delete",
            ControlOp::Create => "create",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("job store is not ready")]
    NotReady,

    #[error("{}", .0.no_match_reason())]
    NoMatch(ControlOp),

    #[error("jobs not found")]
    NotFound,

    #[error("job not created: {0}")]
    InvalidCreate(String),

    #[error("invalid job id: {0}")]
    InvalidJobId(String),

    #[error("unknown job state: {0}")]
    InvalidState(String),

    #[error("store error: {0}")]
    Store(String),
}

impl From<mongodb::error::Error> for Error {
    fn from(err: mongodb::error::Error) -> Self {
        Error::Store(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_match_names_the_rejected_transition() {
        assert_eq!(
            Error::NoMatch(ControlOp::Disable).to_string(),
            "jobs not found, or jobs were already disabled"
        );
        assert_eq!(
            Error::NoMatch(ControlOp::Run).to_string(),
            "jobs not found, or jobs were locked"
        );
    }
}
