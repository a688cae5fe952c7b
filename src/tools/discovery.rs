use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::Tool;
use crate::error::AppError;

/// Executable names tried for each tool, most specific first.
fn binary_names(tool: Tool) -> &'static [&'static str] {
    match tool {
        Tool::Ffmpeg => &["ffmpeg"],
        Tool::Ffprobe => &["ffprobe"],
        Tool::Pdftoppm => &["pdftoppm"],
        Tool::Chromium => &[
            "chromium",
            "chromium-browser",
            "google-chrome-stable",
            "google-chrome",
            "chrome-headless-shell",
        ],
    }
}

#[cfg(not(target_os = "windows"))]
fn find_in_path(name: &str) -> Option<PathBuf> {
    let output = Command::new("which").arg(name).output().ok()?;
    if output.status.success() {
        let path = String::from_utf8_lossy(&output.stdout);
        let first = path.lines().next()?.trim();
        if !first.is_empty() {
            return Some(PathBuf::from(first));
        }
    }
    None
}

#[cfg(target_os = "windows")]
fn find_in_path(name: &str) -> Option<PathBuf> {
    let output = Command::new("where").arg(name).output().ok()?;
    if output.status.success() {
        let path = String::from_utf8_lossy(&output.stdout);
        let first = path.lines().next()?.trim();
        if !first.is_empty() {
            return Some(PathBuf::from(first));
        }
    }
    None
}

fn common_paths(tool: Tool) -> Vec<PathBuf> {
    #[cfg(target_os = "macos")]
    let dirs: &[&str] = &["/opt/homebrew/bin", "/usr/local/bin", "/opt/local/bin"];
    #[cfg(all(unix, not(target_os = "macos")))]
    let dirs: &[&str] = &["/usr/bin", "/usr/local/bin", "/snap/bin"];
    #[cfg(not(unix))]
    let dirs: &[&str] = &[];

    let paths: Vec<PathBuf> = dirs
        .iter()
        .flat_map(|dir| {
            binary_names(tool)
                .iter()
                .map(move |name| Path::new(dir).join(name))
        })
        .collect();

    #[cfg(target_os = "macos")]
    let paths = {
        let mut paths = paths;
        if tool == Tool::Chromium {
            paths.push(PathBuf::from(
                "/Applications/Chromium.app/Contents/MacOS/Chromium",
            ));
            paths.push(PathBuf::from(
                "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            ));
        }
        paths
    };

    paths
}

/// Paths to try for ffprobe given an ffmpeg binary path (suffixed first, then plain).
pub fn ffprobe_candidates(ffmpeg_path: &Path) -> Vec<PathBuf> {
    let parent = match ffmpeg_path.parent() {
        Some(p) => p,
        None => return vec![],
    };
    let mut candidates = Vec::with_capacity(2);
    let stem = ffmpeg_path.file_stem().and_then(|s| s.to_str());
    if let Some(stem) = stem
        && let Some(suffix) = stem.strip_prefix("ffmpeg")
        && !suffix.is_empty()
    {
        #[cfg(target_os = "windows")]
        candidates.push(parent.join(format!("ffprobe{suffix}.exe")));
        #[cfg(not(target_os = "windows"))]
        candidates.push(parent.join(format!("ffprobe{suffix}")));
    }
    #[cfg(target_os = "windows")]
    candidates.push(parent.join("ffprobe.exe"));
    #[cfg(not(target_os = "windows"))]
    candidates.push(parent.join("ffprobe"));
    candidates
}

fn resolve_tool(
    tool: Tool,
    env: &dyn Fn(&str) -> Option<String>,
    resolved_ffmpeg: Option<&Path>,
) -> Option<PathBuf> {
    // 1. Explicit override
    if let Some(env_path) = env(tool.env_override()) {
        let p = PathBuf::from(&env_path);
        if p.exists() {
            log::debug!(
                target: "nimbus_preview::tools::discovery",
                "{} path from {} env: {}",
                tool,
                tool.env_override(),
                p.display()
            );
            return Some(p);
        }
        log::warn!(
            target: "nimbus_preview::tools::discovery",
            "{}={} does not exist, falling back to discovery",
            tool.env_override(),
            env_path
        );
    }

    // 2. ffprobe ships next to ffmpeg
    if tool == Tool::Ffprobe
        && let Some(ffmpeg) = resolved_ffmpeg
        && let Some(p) = ffprobe_candidates(ffmpeg).into_iter().find(|c| c.exists())
    {
        log::debug!(
            target: "nimbus_preview::tools::discovery",
            "ffprobe found next to ffmpeg: {}",
            p.display()
        );
        return Some(p);
    }

    // 3. Common paths first to avoid spawning which/where
    if let Some(p) = common_paths(tool).into_iter().find(|p| p.exists()) {
        log::debug!(
            target: "nimbus_preview::tools::discovery",
            "{} found in common path: {}",
            tool,
            p.display()
        );
        return Some(p);
    }

    // 4. PATH
    for name in binary_names(tool) {
        if let Some(p) = find_in_path(name)
            && p.exists()
        {
            log::debug!(
                target: "nimbus_preview::tools::discovery",
                "{} found in PATH: {}",
                tool,
                p.display()
            );
            return Some(p);
        }
    }

    log::warn!(
        target: "nimbus_preview::tools::discovery",
        "{} not found in PATH or common locations; {}",
        tool,
        tool.install_hint()
    );
    None
}

/// Resolved executable per tool. Missing tools surface as
/// [`AppError::ToolNotFound`] when a job needs them, not at startup.
#[derive(Debug, Clone, Default)]
pub struct ToolPaths {
    paths: HashMap<Tool, PathBuf>,
}

impl ToolPaths {
    /// Discover every tool using the process environment.
    pub fn discover() -> Self {
        Self::discover_with(&|key| std::env::var(key).ok())
    }

    pub fn discover_with(env: &dyn Fn(&str) -> Option<String>) -> Self {
        let mut paths = HashMap::new();
        let ffmpeg = resolve_tool(Tool::Ffmpeg, env, None);
        if let Some(ffprobe) = resolve_tool(Tool::Ffprobe, env, ffmpeg.as_deref()) {
            paths.insert(Tool::Ffprobe, ffprobe);
        }
        if let Some(ffmpeg) = ffmpeg {
            paths.insert(Tool::Ffmpeg, ffmpeg);
        }
        for tool in [Tool::Pdftoppm, Tool::Chromium] {
            if let Some(p) = resolve_tool(tool, env, None) {
                paths.insert(tool, p);
            }
        }
        Self { paths }
    }

    pub fn with(mut self, tool: Tool, path: impl Into<PathBuf>) -> Self {
        self.paths.insert(tool, path.into());
        self
    }

    pub fn get(&self, tool: Tool) -> Result<&Path, AppError> {
        self.paths
            .get(&tool)
            .map(PathBuf::as_path)
            .ok_or(AppError::ToolNotFound(tool))
    }
}
