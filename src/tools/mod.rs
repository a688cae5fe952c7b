//! External tool layer: ffmpeg, ffprobe, pdftoppm and headless Chromium.
//!
//! Every tool runs from a structured argument vector ([`ToolInvocation`]); no
//! shell is ever involved, so identifiers containing shell metacharacters are
//! passed through as plain arguments.

pub mod discovery;
mod error;
pub mod ffprobe;
mod runner;
mod temp;

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::future::Future;
use std::pin::Pin;

pub use discovery::ToolPaths;
pub use error::{ToolFailureSummary, summarize_tool_failure};
pub use runner::ProcessRunner;
pub use temp::{TempCleanup, TempFileManager};
pub(crate) use temp::{sweep_matching, unique_token};

use crate::error::AppError;

/// External programs the pipeline knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    Ffmpeg,
    Ffprobe,
    Pdftoppm,
    Chromium,
}

impl Tool {
    pub fn name(self) -> &'static str {
        match self {
            Tool::Ffmpeg => "ffmpeg",
            Tool::Ffprobe => "ffprobe",
            Tool::Pdftoppm => "pdftoppm",
            Tool::Chromium => "chromium",
        }
    }

    /// Environment variable that overrides discovery for this tool.
    pub fn env_override(self) -> &'static str {
        match self {
            Tool::Ffmpeg => "FFMPEG_PATH",
            Tool::Ffprobe => "FFPROBE_PATH",
            Tool::Pdftoppm => "PDFTOPPM_PATH",
            Tool::Chromium => "CHROMIUM_PATH",
        }
    }

    pub fn install_hint(self) -> &'static str {
        match self {
            Tool::Ffmpeg | Tool::Ffprobe => "install FFmpeg (e.g. sudo apt install ffmpeg)",
            Tool::Pdftoppm => "install poppler (e.g. sudo apt install poppler-utils)",
            Tool::Chromium => "install Chromium (e.g. sudo apt install chromium)",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One external program call: which tool, and its argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub tool: Tool,
    pub args: Vec<OsString>,
}

impl ToolInvocation {
    pub fn new(tool: Tool) -> Self {
        Self {
            tool,
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Arguments rendered lossily, for logs and assertions.
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }
}

/// Captured output of a tool that exited successfully.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
}

pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = Result<ToolOutput, AppError>> + Send + 'a>>;

/// Seam between the pipeline and the operating system.
///
/// Implementations must resolve to `Err(AppError::ToolFailed { .. })` on a
/// non-zero exit and to `Err(AppError::ToolNotFound(..))` when the program is
/// not available. Dropping the returned future must stop the program.
pub trait ToolRunner: Send + Sync {
    fn run<'a>(&'a self, invocation: &'a ToolInvocation) -> ToolFuture<'a>;
}
