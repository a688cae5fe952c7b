//! Preview cache: one immutable `<id>.webp` per identifier under the output root.
//!
//! Artifacts are never evicted. Renders write to a staging file in the same
//! directory and are promoted with a rename, so a reader sees either no file
//! or the complete artifact. A per-identifier in-flight lock keeps two
//! concurrent requests for the same identifier from rendering twice.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::tools::{sweep_matching, unique_token};

pub const ARTIFACT_EXTENSION: &str = "webp";
const STAGING_PREFIX: &str = ".staging-";
const STAGING_SUFFIX: &str = ".partial.webp";

#[derive(Debug, Clone)]
pub struct PreviewCache {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    root: PathBuf,
    in_flight: parking_lot::Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl PreviewCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                root: root.into(),
                in_flight: parking_lot::Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn ensure_root(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.inner.root)
    }

    /// `<root>/<id>.webp`, with the identifier used verbatim.
    pub fn artifact_path(&self, file_id: &str) -> PathBuf {
        self.inner
            .root
            .join(format!("{}.{}", file_id, ARTIFACT_EXTENSION))
    }

    /// Path of the finished artifact, if one exists.
    pub async fn lookup(&self, file_id: &str) -> Option<PathBuf> {
        let path = self.artifact_path(file_id);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Some(path),
            _ => None,
        }
    }

    /// A fresh staging path next to the artifacts. Nothing is created.
    ///
    /// The name does not embed the identifier, so any identifier whose
    /// artifact name fits the filesystem can be staged too.
    pub fn staging_path(&self) -> PathBuf {
        self.inner.root.join(format!(
            "{}{}{}",
            STAGING_PREFIX,
            unique_token(),
            STAGING_SUFFIX
        ))
    }

    /// Move a finished staging file into place.
    pub async fn promote(&self, staging: &Path, file_id: &str) -> io::Result<PathBuf> {
        let target = self.artifact_path(file_id);
        tokio::fs::rename(staging, &target).await?;
        Ok(target)
    }

    /// Wait for exclusive ownership of `file_id`. Held until the claim drops.
    pub async fn claim(&self, file_id: &str) -> InFlightClaim {
        let slot = self
            .inner
            .in_flight
            .lock()
            .entry(file_id.to_string())
            .or_default()
            .clone();
        let guard = slot.lock_owned().await;
        InFlightClaim {
            cache: self.clone(),
            file_id: file_id.to_string(),
            guard,
        }
    }

    /// Identifiers with a claim held or awaited.
    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight.lock().len()
    }

    /// Remove staging files left by a crashed process.
    pub fn sweep_stale_staging(&self, max_age: Duration) -> usize {
        sweep_matching(
            &self.inner.root,
            |name| name.starts_with(STAGING_PREFIX) && name.ends_with(STAGING_SUFFIX),
            max_age,
        )
    }
}

/// Exclusive in-flight ownership of one identifier.
#[derive(Debug)]
pub struct InFlightClaim {
    cache: PreviewCache,
    file_id: String,
    guard: OwnedMutexGuard<()>,
}

impl InFlightClaim {
    pub fn file_id(&self) -> &str {
        &self.file_id
    }
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        let mut map = self.cache.inner.in_flight.lock();
        // map + this guard; anything more is a waiter that still needs the slot
        if Arc::strong_count(OwnedMutexGuard::mutex(&self.guard)) <= 2 {
            map.remove(&self.file_id);
        }
    }
}

/// Make a promoted artifact readable by the serving process (mode 0644).
#[cfg(unix)]
pub async fn normalize_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644)).await
}

#[cfg(not(unix))]
pub async fn normalize_permissions(path: &Path) -> io::Result<()> {
    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_readonly(false);
    tokio::fs::set_permissions(path, perms).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_path_uses_identifier_verbatim() {
        let cache = PreviewCache::new("/tmp/out");
        assert_eq!(
            cache.artifact_path("clip.mp4"),
            PathBuf::from("/tmp/out/clip.mp4.webp")
        );
        assert_eq!(
            cache.artifact_path("weird name (1).MP4"),
            PathBuf::from("/tmp/out/weird name (1).MP4.webp")
        );
    }

    #[test]
    fn staging_paths_are_hidden_and_unique() {
        let cache = PreviewCache::new("/tmp/out");
        let a = cache.staging_path();
        let b = cache.staging_path();
        assert_ne!(a, b);
        let name = a.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(".staging-"));
        assert!(name.ends_with(".partial.webp"));
        assert_eq!(a.parent(), Some(Path::new("/tmp/out")));
    }

    #[tokio::test]
    async fn lookup_sees_only_promoted_artifacts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = PreviewCache::new(dir.path());
        assert!(cache.lookup("a.png").await.is_none());

        let staging = cache.staging_path();
        std::fs::write(&staging, b"RIFF").unwrap();
        assert!(cache.lookup("a.png").await.is_none());

        let promoted = cache.promote(&staging, "a.png").await.unwrap();
        assert!(!staging.exists());
        assert_eq!(cache.lookup("a.png").await, Some(promoted));
    }

    #[tokio::test]
    async fn long_identifier_stages_and_promotes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = PreviewCache::new(dir.path());
        let file_id = format!("{}.mp4", "a".repeat(226));

        let staging = cache.staging_path();
        assert!(staging.file_name().unwrap().len() < 64);
        std::fs::write(&staging, b"RIFF").unwrap();
        let promoted = cache.promote(&staging, &file_id).await.unwrap();

        assert_eq!(promoted, cache.artifact_path(&file_id));
        assert_eq!(cache.lookup(&file_id).await, Some(promoted));
    }

    #[tokio::test]
    async fn directory_named_like_artifact_is_not_a_hit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = PreviewCache::new(dir.path());
        std::fs::create_dir(cache.artifact_path("x")).unwrap();
        assert!(cache.lookup("x").await.is_none());
    }

    #[tokio::test]
    async fn claim_serializes_same_identifier() {
        let cache = PreviewCache::new("/tmp/unused");
        let first = cache.claim("same").await;
        let waiter = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.claim("same").await.file_id().to_string() })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        drop(first);
        assert_eq!(waiter.await.unwrap(), "same");
        assert_eq!(cache.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn different_identifiers_do_not_contend() {
        let cache = PreviewCache::new("/tmp/unused");
        let _a = cache.claim("a").await;
        let _b = cache.claim("b").await;
        assert_eq!(cache.in_flight_count(), 2);
    }

    #[test]
    fn sweep_removes_only_staging_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = PreviewCache::new(dir.path());
        let staging = cache.staging_path();
        std::fs::write(&staging, b"x").unwrap();
        let artifact = cache.artifact_path("doc.pdf");
        std::fs::write(&artifact, b"x").unwrap();
        let dotfile = dir.path().join(".keep");
        std::fs::write(&dotfile, b"x").unwrap();

        assert_eq!(cache.sweep_stale_staging(Duration::ZERO), 1);
        assert!(!staging.exists());
        assert!(artifact.exists());
        assert!(dotfile.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn permissions_are_normalized() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a.webp");
        std::fs::write(&path, b"x").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();
        normalize_permissions(&path).await.unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }
}
