//! Map external tool exit codes to short log summaries.
//!
//! FFmpeg codes are from ffmpeg.c: 1 (general), 69 (rate exceeded),
//! 123 (hard exit), 255 (signal). pdftoppm documents 1 to 3 and 99.
//! -1 is used for spawn failure or death by signal. Stderr is kept as detail.

/// Root cause of a tool failure, reduced for log lines. Never sent to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolFailureSummary {
    pub summary: String,
    pub detail: String,
}

impl ToolFailureSummary {
    /// Last `n` non-empty stderr lines joined with "; ", newest last.
    pub fn last_lines(&self, n: usize) -> String {
        let mut lines: Vec<&str> = self
            .detail
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .rev()
            .take(n)
            .collect();
        lines.reverse();
        lines.join("; ")
    }
}

pub fn summarize_tool_failure(
    tool: super::Tool,
    stderr: &str,
    exit_code: Option<i32>,
) -> ToolFailureSummary {
    let summary = match exit_code {
        Some(code) => match known_exit_code_summary(tool, code) {
            Some(msg) => msg,
            None => format!("{} failed (exit code {}).", tool, code),
        },
        None => fallback_summary(stderr),
    };
    let detail = stderr.trim().to_string();
    ToolFailureSummary { summary, detail }
}

fn known_exit_code_summary(tool: super::Tool, code: i32) -> Option<String> {
    use super::Tool;

    if code == -1 {
        return Some(format!("{} not found, failed to start, or was killed.", tool));
    }
    match (tool, code) {
        (Tool::Ffmpeg | Tool::Ffprobe, 1) => Some(format!("{} failed.", tool)),
        (Tool::Ffmpeg, 69) => Some("ffmpeg rate limit exceeded.".into()),
        (Tool::Ffmpeg, 123 | 255) => Some("ffmpeg was stopped.".into()),
        (Tool::Pdftoppm, 1) => Some("pdftoppm could not open the PDF.".into()),
        (Tool::Pdftoppm, 2) => Some("pdftoppm could not write its output.".into()),
        (Tool::Pdftoppm, 3) => Some("pdftoppm hit a PDF permission error.".into()),
        (Tool::Pdftoppm, 99) => Some("pdftoppm failed.".into()),
        _ => None,
    }
}

const ELLIPSIS: &str = "…";

/// First non-empty line of stderr, truncated to max_len bytes (adding "…" if truncated).
fn first_line_truncated(stderr: &str, max_len: usize) -> String {
    let first = stderr
        .lines()
        .find(|l| !l.trim().is_empty())
        .map(|l| l.trim())
        .unwrap_or(stderr);
    if first.len() <= max_len {
        return first.to_string();
    }
    let mut cut = max_len.saturating_sub(ELLIPSIS.len());
    while !first.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &first[..cut], ELLIPSIS)
}

fn fallback_summary(stderr: &str) -> String {
    first_line_truncated(stderr, 120)
}

#[cfg(test)]
mod tests {
    use super::super::Tool;
    use super::*;

    #[test]
    fn ffmpeg_exit_code_1() {
        let p = summarize_tool_failure(Tool::Ffmpeg, "", Some(1));
        assert_eq!(p.summary, "ffmpeg failed.");
    }

    #[test]
    fn ffmpeg_exit_code_255() {
        let p = summarize_tool_failure(Tool::Ffmpeg, "", Some(255));
        assert_eq!(p.summary, "ffmpeg was stopped.");
    }

    #[test]
    fn pdftoppm_codes() {
        let p = summarize_tool_failure(Tool::Pdftoppm, "Syntax Error", Some(1));
        assert_eq!(p.summary, "pdftoppm could not open the PDF.");
        assert_eq!(p.detail, "Syntax Error");
    }

    #[test]
    fn minus_one_is_start_failure() {
        let p = summarize_tool_failure(Tool::Chromium, "", Some(-1));
        assert!(p.summary.contains("failed to start"));
    }

    #[test]
    fn unknown_code_short_summary() {
        let p = summarize_tool_failure(
            Tool::Chromium,
            "ERROR:headless_shell.cc crashed",
            Some(42),
        );
        assert_eq!(p.summary, "chromium failed (exit code 42).");
        assert_eq!(p.detail, "ERROR:headless_shell.cc crashed");
    }

    #[test]
    fn no_code_uses_stderr() {
        let p = summarize_tool_failure(Tool::Ffmpeg, "Some random error\nSecond line", None);
        assert_eq!(p.summary, "Some random error");
    }

    #[test]
    fn long_stderr_truncated() {
        let long = "a".repeat(150);
        let p = summarize_tool_failure(Tool::Ffmpeg, &long, None);
        assert!(p.summary.len() <= 120);
        assert!(p.summary.ends_with('…'));
    }

    #[test]
    fn last_lines_keeps_order() {
        let p = summarize_tool_failure(Tool::Ffmpeg, "a\n\nb\nc\nd\n", Some(1));
        assert_eq!(p.last_lines(2), "c; d");
    }
}
