use std::path::Path;

use super::{RenderContext, ffmpeg, webp_output};
use crate::error::AppError;
use crate::tools::ToolInvocation;

/// Video frames are taken one second in, past black lead-in frames.
pub const VIDEO_SEEK: &str = "00:00:01.00";

/// Fit inside S×S keeping aspect ratio, then pad to exactly S×S with transparency.
pub fn frame_filter(size: u32) -> String {
    format!(
        "scale={s}:{s}:force_original_aspect_ratio=decrease,format=rgba,pad={s}:{s}:(ow-iw)/2:(oh-ih)/2:color=0x00000000",
        s = size
    )
}

/// Encode one frame of `input` as a padded square WebP.
pub fn encode_invocation(
    input: &Path,
    output: &Path,
    size: u32,
    seek: Option<&str>,
) -> ToolInvocation {
    let mut invocation = ffmpeg();
    if let Some(position) = seek {
        invocation = invocation.args(["-ss", position]);
    }
    let invocation = invocation
        .arg("-i")
        .arg(input)
        .arg("-vf")
        .arg(frame_filter(size));
    webp_output(invocation, output)
}

pub(super) async fn render_video_frame(
    ctx: &RenderContext<'_>,
    input: &Path,
    output: &Path,
) -> Result<(), AppError> {
    let invocation = encode_invocation(input, output, ctx.settings.resolution, Some(VIDEO_SEEK));
    ctx.run_tool(&invocation).await?;
    Ok(())
}

pub(super) async fn render_image_frame(
    ctx: &RenderContext<'_>,
    input: &Path,
    output: &Path,
) -> Result<(), AppError> {
    let invocation = encode_invocation(input, output, ctx.settings.resolution, None);
    ctx.run_tool(&invocation).await?;
    Ok(())
}
