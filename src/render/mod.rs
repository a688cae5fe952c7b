//! Rendering strategies. Each one turns an upload into a square WebP at a
//! staging path; promotion into the cache is the runner's job.

mod browser;
mod frame;
mod pdf;
mod waveform;

use std::path::{Path, PathBuf};

pub use browser::{
    BrowserTarget, VIRTUAL_TIME_BUDGET_MS, font_harness_url, page_url, screenshot_invocation,
};
pub use frame::{VIDEO_SEEK, encode_invocation, frame_filter};
pub use pdf::{PDF_RASTER_SIZE, rasterize_invocation};
pub use waveform::waveform_invocation;

use crate::config::PreviewConfig;
use crate::dispatch::Strategy;
use crate::error::AppError;
use crate::logging::JobLogger;
use crate::tools::{TempFileManager, Tool, ToolInvocation, ToolOutput, ToolRunner};
use crate::watchdog::Watchdog;

#[derive(Debug, Clone)]
pub struct RenderSettings {
    /// Artifact width and height in pixels.
    pub resolution: u32,
    pub font_harness: PathBuf,
    pub browser_no_sandbox: bool,
}

impl RenderSettings {
    pub fn from_config(config: &PreviewConfig) -> Self {
        Self {
            resolution: config.resolution,
            font_harness: config.font_harness.clone(),
            browser_no_sandbox: config.browser_no_sandbox,
        }
    }
}

/// Collaborators handed to every strategy for one job.
pub struct RenderContext<'a> {
    pub tools: &'a dyn ToolRunner,
    pub watchdog: &'a Watchdog,
    pub log: &'a JobLogger,
    pub settings: &'a RenderSettings,
    pub temp: &'a TempFileManager,
}

impl RenderContext<'_> {
    /// Run one tool call. Both its start and its completion count as progress.
    pub(crate) async fn run_tool(&self, invocation: &ToolInvocation) -> Result<ToolOutput, AppError> {
        self.watchdog.kick();
        self.log.debug(format!(
            "{} {}",
            invocation.tool,
            invocation.args_lossy().join(" ")
        ));
        let output = self.tools.run(invocation).await?;
        self.watchdog.kick();
        Ok(output)
    }
}

/// Where a strategy reads from and writes to.
#[derive(Debug, Clone, Copy)]
pub struct RenderTarget<'a> {
    pub file_id: &'a str,
    pub upload: &'a Path,
    pub staging: &'a Path,
}

/// Run `strategy` to completion. `Ok` guarantees a non-empty staging file.
pub async fn render(
    strategy: Strategy,
    ctx: &RenderContext<'_>,
    target: RenderTarget<'_>,
) -> Result<(), AppError> {
    match strategy {
        Strategy::VideoFrame => frame::render_video_frame(ctx, target.upload, target.staging).await?,
        Strategy::ImageFrame => frame::render_image_frame(ctx, target.upload, target.staging).await?,
        Strategy::Pdf => pdf::render_pdf(ctx, target.upload, target.staging).await?,
        Strategy::Html => browser::render_page(ctx, BrowserTarget::Page, target).await?,
        Strategy::Font => browser::render_page(ctx, BrowserTarget::FontHarness, target).await?,
        Strategy::Waveform => waveform::render_waveform(ctx, target.upload, target.staging).await?,
    }
    ensure_output(Tool::Ffmpeg, target.staging).await
}

/// A tool that exits 0 without writing its output still failed.
pub(crate) async fn ensure_output(tool: Tool, path: &Path) -> Result<(), AppError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        _ => {
            log::debug!(
                target: "nimbus_preview::render",
                "{} produced no output at {}",
                tool,
                path.display()
            );
            Err(AppError::MissingArtifact(path.to_path_buf()))
        }
    }
}

/// Common ffmpeg prefix: quiet, overwrite.
pub(crate) fn ffmpeg() -> ToolInvocation {
    ToolInvocation::new(Tool::Ffmpeg).args(["-hide_banner", "-loglevel", "error", "-y"])
}

/// Single-frame WebP output options followed by the output path.
pub(crate) fn webp_output(invocation: ToolInvocation, output: &Path) -> ToolInvocation {
    invocation
        .args([
            "-frames:v",
            "1",
            "-an",
            "-c:v",
            "libwebp",
            "-fflags",
            "+bitexact",
            "-f",
            "webp",
        ])
        .arg(output)
}
