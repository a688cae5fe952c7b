//! Terminal results of a preview job.

use std::path::PathBuf;

/// Stable outcome of one job. Each code maps to exactly one HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Success,
    UnsupportedType,
    RenderFailure,
    Timeout,
}

impl ResultCode {
    pub fn http_status(self) -> u16 {
        match self {
            ResultCode::Success => 200,
            ResultCode::UnsupportedType => 415,
            ResultCode::RenderFailure => 500,
            ResultCode::Timeout => 408,
        }
    }
}

/// What a job hands back to the front door.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub code: ResultCode,
    /// Set only for [`ResultCode::Success`].
    pub artifact: Option<PathBuf>,
}

impl JobOutcome {
    pub fn success(artifact: PathBuf) -> Self {
        Self {
            code: ResultCode::Success,
            artifact: Some(artifact),
        }
    }

    pub fn failed(code: ResultCode) -> Self {
        debug_assert!(code != ResultCode::Success);
        Self {
            code,
            artifact: None,
        }
    }
}
