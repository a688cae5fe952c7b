//! HTML pages and fonts, rendered through a headless Chromium process.
//!
//! Every launch gets its own throw-away profile directory and runs as a
//! separate process, so a hung page can be killed without touching other jobs.

use std::path::Path;

use url::Url;

use super::{RenderContext, RenderSettings, RenderTarget, ensure_output, frame};
use crate::error::AppError;
use crate::tools::{TempCleanup, Tool, ToolInvocation};

/// Virtual time granted to a page so its network activity settles before capture.
pub const VIRTUAL_TIME_BUDGET_MS: u32 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserTarget {
    /// The upload itself, opened as a page.
    Page,
    /// The font harness page, loading the upload as a web font.
    FontHarness,
}

/// `file://` URL of a local path. Relative paths are resolved first.
pub fn page_url(path: &Path) -> Result<Url, AppError> {
    let absolute = std::path::absolute(path)?;
    Url::from_file_path(&absolute)
        .map_err(|_| AppError::from(format!("Cannot build file URL for {}", absolute.display())))
}

/// Harness URL carrying the font name and source as query parameters.
pub fn font_harness_url(harness: &Path, file_id: &str, font: &Path) -> Result<Url, AppError> {
    let mut url = page_url(harness)?;
    let src = page_url(font)?;
    url.query_pairs_mut()
        .append_pair("font", file_id)
        .append_pair("src", src.as_str());
    Ok(url)
}

pub fn screenshot_invocation(
    settings: &RenderSettings,
    profile_dir: &Path,
    screenshot: &Path,
    url: &Url,
    target: BrowserTarget,
) -> ToolInvocation {
    let mut invocation = ToolInvocation::new(Tool::Chromium).args([
        "--headless=new",
        "--disable-gpu",
        "--no-first-run",
        "--no-default-browser-check",
        "--hide-scrollbars",
        "--mute-audio",
    ]);
    if settings.browser_no_sandbox {
        invocation = invocation.arg("--no-sandbox");
    }
    let mut profile_arg = std::ffi::OsString::from("--user-data-dir=");
    profile_arg.push(profile_dir.as_os_str());
    let mut screenshot_arg = std::ffi::OsString::from("--screenshot=");
    screenshot_arg.push(screenshot.as_os_str());

    invocation = invocation
        .arg(profile_arg)
        .arg(format!(
            "--window-size={s},{s}",
            s = settings.resolution
        ))
        .arg("--default-background-color=00000000");
    match target {
        BrowserTarget::Page => {
            invocation = invocation.arg(format!(
                "--virtual-time-budget={}",
                VIRTUAL_TIME_BUDGET_MS
            ));
        }
        // the harness is a file:// document with an opaque origin; web fonts
        // are fetched in CORS mode and would be refused without this
        BrowserTarget::FontHarness => {
            invocation = invocation.arg("--allow-file-access-from-files");
        }
    }
    invocation.arg(screenshot_arg).arg(url.as_str())
}

pub(super) async fn render_page(
    ctx: &RenderContext<'_>,
    browser_target: BrowserTarget,
    target: RenderTarget<'_>,
) -> Result<(), AppError> {
    let url = match browser_target {
        BrowserTarget::Page => page_url(target.upload)?,
        BrowserTarget::FontHarness => {
            font_harness_url(&ctx.settings.font_harness, target.file_id, target.upload)?
        }
    };

    let mut cleanup = TempCleanup::new();
    let profile_dir = ctx.temp.create_dir("profile")?;
    cleanup.add(profile_dir.clone());
    let screenshot = ctx.temp.path("shot.png");
    cleanup.add(screenshot.clone());

    let result = async {
        {
            let _session = ctx.watchdog.browser_session();
            ctx.log.debug(format!("Launching browser for {}", url));
            let invocation = screenshot_invocation(
                ctx.settings,
                &profile_dir,
                &screenshot,
                &url,
                browser_target,
            );
            ctx.run_tool(&invocation).await?;
        }
        ensure_output(Tool::Chromium, &screenshot).await?;
        let encode =
            frame::encode_invocation(&screenshot, target.staging, ctx.settings.resolution, None);
        ctx.run_tool(&encode).await?;
        Ok::<(), AppError>(())
    }
    .await;

    for (path, e) in cleanup.finish() {
        ctx.log
            .warn(format!("Failed to remove browser temp {}: {}", path.display(), e));
    }
    result
}
