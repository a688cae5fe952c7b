use std::ffi::OsString;
use std::path::{Path, PathBuf};

use super::{RenderContext, ensure_output, frame};
use crate::error::AppError;
use crate::tools::{TempCleanup, Tool, ToolInvocation};

/// Longest edge of the page-one bitmap.
pub const PDF_RASTER_SIZE: u32 = 1024;

/// pdftoppm writes `<prefix>.png` in single-file mode.
pub fn rasterize_invocation(input: &Path, prefix: &Path) -> ToolInvocation {
    ToolInvocation::new(Tool::Pdftoppm)
        .args(["-png", "-f", "1", "-l", "1", "-singlefile", "-scale-to"])
        .arg(PDF_RASTER_SIZE.to_string())
        .arg(input)
        .arg(prefix)
}

fn bitmap_path(prefix: &Path) -> PathBuf {
    let mut name = OsString::from(prefix.as_os_str());
    name.push(".png");
    PathBuf::from(name)
}

/// Page one to bitmap, bitmap to WebP. The bitmap is removed either way.
pub(super) async fn render_pdf(
    ctx: &RenderContext<'_>,
    input: &Path,
    output: &Path,
) -> Result<(), AppError> {
    let prefix = ctx.temp.path("page");
    let bitmap = bitmap_path(&prefix);
    let mut cleanup = TempCleanup::new();
    cleanup.add(bitmap.clone());

    let result = async {
        ctx.run_tool(&rasterize_invocation(input, &prefix)).await?;
        ensure_output(Tool::Pdftoppm, &bitmap).await?;
        let encode =
            frame::encode_invocation(&bitmap, output, ctx.settings.resolution, None);
        ctx.run_tool(&encode).await?;
        Ok::<(), AppError>(())
    }
    .await;

    for (path, e) in cleanup.finish() {
        ctx.log
            .warn(format!("Failed to remove intermediate {}: {}", path.display(), e));
    }
    result
}
