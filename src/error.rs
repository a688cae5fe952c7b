//! App error type for the preview pipeline. Every variant maps to one [`ResultCode`].

use std::path::PathBuf;

use crate::outcome::ResultCode;
use crate::tools::{Tool, summarize_tool_failure};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{} not found: {}", .0, .0.install_hint())]
    ToolNotFound(Tool),

    #[error("{tool} failed (code {code}): {stderr}")]
    ToolFailed {
        tool: Tool,
        code: i32,
        stderr: String,
    },

    #[error("Expected output was not produced: {}", .0.display())]
    MissingArtifact(PathBuf),

    #[error("Unsupported content type ({})", .mime.unwrap_or("no signature"))]
    Unsupported { mime: Option<&'static str> },

    #[error("Timed out")]
    TimedOut,

    #[error("Render job panicked: {0}")]
    JobPanicked(String),

    #[error("{0}")]
    Other(String),
}

impl AppError {
    pub fn tool_failed(tool: Tool, code: i32, stderr: impl Into<String>) -> Self {
        Self::ToolFailed {
            tool,
            code,
            stderr: stderr.into(),
        }
    }

    pub fn result_code(&self) -> ResultCode {
        match self {
            AppError::Unsupported { .. } => ResultCode::UnsupportedType,
            AppError::TimedOut => ResultCode::Timeout,
            AppError::Io(_)
            | AppError::ToolNotFound(_)
            | AppError::ToolFailed { .. }
            | AppError::MissingArtifact(_)
            | AppError::JobPanicked(_)
            | AppError::Other(_) => ResultCode::RenderFailure,
        }
    }

    /// One-line description for logs. Tool stderr is reduced to its summary.
    pub fn log_summary(&self) -> String {
        match self {
            AppError::ToolFailed { tool, code, stderr } => {
                let summary = summarize_tool_failure(*tool, stderr, Some(*code));
                if summary.detail.is_empty() {
                    summary.summary
                } else {
                    format!("{} {}", summary.summary, summary.last_lines(3))
                }
            }
            _ => self.to_string(),
        }
    }
}

impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::Other(s)
    }
}

impl From<&str> for AppError {
    fn from(s: &str) -> Self {
        s.to_string().into()
    }
}
