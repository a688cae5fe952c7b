use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Prefix shared by every temp entry this process creates, so startup sweeps
/// never touch foreign files.
const TEMP_PREFIX: &str = "nimbus-preview-";

/// Factory for job-private temp paths (PDF bitmaps, browser profiles).
/// Paths must be handed to a [`TempCleanup`] for removal.
#[derive(Debug, Clone)]
pub struct TempFileManager {
    root: PathBuf,
}

impl Default for TempFileManager {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

/// Short unique token for temp names. Not cryptographically secure; for uniqueness only.
pub(crate) fn unique_token() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!(
        "{}-{}-{}",
        millis,
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

impl TempFileManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// A fresh path (nothing is created) ending in `suffix`.
    pub fn path(&self, suffix: &str) -> PathBuf {
        self.root
            .join(format!("{}{}-{}", TEMP_PREFIX, unique_token(), suffix))
    }

    /// A fresh, empty directory.
    pub fn create_dir(&self, suffix: &str) -> io::Result<PathBuf> {
        let path = self.path(suffix);
        fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Remove entries left behind by earlier processes (e.g. after a crash).
    pub fn sweep_older_than(&self, max_age: Duration) -> usize {
        sweep_matching(&self.root, |name| name.starts_with(TEMP_PREFIX), max_age)
    }
}

/// Remove entries in `dir` whose name satisfies `matches` and whose mtime is
/// older than `max_age`. Returns how many were removed.
pub(crate) fn sweep_matching(
    dir: &Path,
    matches: impl Fn(&str) -> bool,
    max_age: Duration,
) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    let now = SystemTime::now();
    let mut removed = 0;
    for entry in entries.flatten() {
        if !matches(&entry.file_name().to_string_lossy()) {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        let age = meta
            .modified()
            .ok()
            .and_then(|m| now.duration_since(m).ok())
            .unwrap_or_default();
        if age < max_age {
            continue;
        }
        let path = entry.path();
        let result = if meta.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match result {
            Ok(()) => removed += 1,
            Err(e) => log::warn!(
                target: "nimbus_preview::tools::temp",
                "Failed to sweep {}: {}",
                path.display(),
                e
            ),
        }
    }
    removed
}

/// Removes registered paths on drop.
///
/// Use [`TempCleanup::finish`] on the normal path so failures can be reported;
/// the drop path (e.g. a job cancelled by the watchdog) is best-effort.
#[derive(Debug, Default)]
pub struct TempCleanup {
    paths: Vec<PathBuf>,
}

impl TempCleanup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    /// Remove everything now. Returns the paths that could not be removed.
    /// Entries that were never created are not failures.
    pub fn finish(mut self) -> Vec<(PathBuf, io::Error)> {
        let paths = std::mem::take(&mut self.paths);
        paths
            .into_iter()
            .filter_map(|p| remove_path(&p).err().map(|e| (p, e)))
            .collect()
    }
}

fn remove_path(path: &Path) -> io::Result<()> {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) => Err(e),
    };
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

impl Drop for TempCleanup {
    fn drop(&mut self) {
        for path in &self.paths {
            if let Err(e) = remove_path(path) {
                log::warn!(
                    target: "nimbus_preview::tools::temp",
                    "Failed to remove temp {}: {}",
                    path.display(),
                    e
                );
            }
        }
    }
}
