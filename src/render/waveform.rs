use std::path::Path;

use super::{RenderContext, ffmpeg, webp_output};
use crate::error::AppError;
use crate::tools::ToolInvocation;

pub fn waveform_invocation(input: &Path, output: &Path, size: u32) -> ToolInvocation {
    let invocation = ffmpeg()
        .arg("-i")
        .arg(input)
        .arg("-filter_complex")
        .arg(format!("showwavespic=s={s}x{s}:colors=white", s = size));
    webp_output(invocation, output)
}

pub(super) async fn render_waveform(
    ctx: &RenderContext<'_>,
    input: &Path,
    output: &Path,
) -> Result<(), AppError> {
    let invocation = waveform_invocation(input, output, ctx.settings.resolution);
    ctx.run_tool(&invocation).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draws_square_waveform() {
        let inv = waveform_invocation(Path::new("/up/song.mp3"), Path::new("/o/s.webp"), 256);
        let args = inv.args_lossy();
        let fc = args.iter().position(|a| a == "-filter_complex").unwrap();
        assert_eq!(args[fc + 1], "showwavespic=s=256x256:colors=white");
        assert_eq!(args.last().unwrap(), "/o/s.webp");
    }
}
