//! Output directory and lifecycle of generated audio files.
//!
//! Deletion is best effort: a player may still hold a file open when the
//! consumer asks for it to be removed, so failed paths are queued and retried
//! on every later `delete` call.

use async_trait::async_trait;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::util::now_ms;

#[cfg(test)]
use mockall::automock;

/// Removes a single file. Split out so locked-file behaviour can be simulated.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait FileRemover: Send + Sync {
    async fn remove(&self, path: &Path) -> io::Result<()>;
}

/// Plain `tokio::fs::remove_file`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsRemover;

#[async_trait]
impl FileRemover for FsRemover {
    async fn remove(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }
}

/// A synthesized file on disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedAudioFile {
    path: PathBuf,
    format: String,
}

impl GeneratedAudioFile {
    pub fn new(path: PathBuf, format: impl Into<String>) -> Self {
        Self {
            path,
            format: format.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Output format tag (the file extension).
    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn into_path(self) -> PathBuf {
        self.path
    }
}

#[derive(Default)]
struct FileState {
    // Ordered and de-duplicated.
    pending: Vec<PathBuf>,
    reserved: HashSet<PathBuf>,
}

/// Owns the flat output directory: unique names, startup cleanup, deletion.
pub struct AudioFileManager {
    dir: PathBuf,
    remover: Arc<dyn FileRemover>,
    state: Mutex<FileState>,
}

impl AudioFileManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_remover(dir, Arc::new(FsRemover))
    }

    pub fn with_remover(dir: impl Into<PathBuf>, remover: Arc<dyn FileRemover>) -> Self {
        Self {
            dir: dir.into(),
            remover,
            state: Mutex::new(FileState::default()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the directory, or empty it (non-recursively) if it already exists.
    pub async fn ensure_output_directory(&self) -> io::Result<()> {
        if !tokio::fs::try_exists(&self.dir).await.unwrap_or(false) {
            tokio::fs::create_dir_all(&self.dir).await?;
            info!(target: "audio_files", dir = %self.dir.display(), "Created output directory");
            return Ok(());
        }
        let removed = self.clear_files().await?;
        info!(target: "audio_files", dir = %self.dir.display(), removed, "Cleared output directory");
        Ok(())
    }

    async fn clear_files(&self) -> io::Result<usize> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut removed = 0usize;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            match entry.file_type().await {
                Ok(ft) if ft.is_file() => {}
                _ => continue,
            }
            match self.remover.remove(&path).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!(target: "audio_files", path = %path.display(), error = %e, "Error removing file")
                }
            }
        }
        Ok(removed)
    }

    /// Empty the directory on shutdown. Failures are logged only.
    pub async fn clear(&self) {
        if let Err(e) = self.clear_files().await {
            warn!(target: "audio_files", dir = %self.dir.display(), error = %e, "Failed to clear output directory");
        }
        let mut state = self.state.lock().await;
        state.pending.clear();
        state.reserved.clear();
    }

    /// Reserve `{epochMillis}.{extension}` inside the output directory.
    ///
    /// On collision (file on disk or a name held by an in-flight request) the
    /// millisecond value is decremented until a free name is found.
    pub async fn generate_unique_name(&self, extension: &str) -> PathBuf {
        let mut state = self.state.lock().await;
        let mut millis = now_ms();
        loop {
            let candidate = self.dir.join(format!("{}.{}", millis, extension));
            if !state.reserved.contains(&candidate)
                && !tokio::fs::try_exists(&candidate).await.unwrap_or(false)
            {
                state.reserved.insert(candidate.clone());
                return candidate;
            }
            millis -= 1;
        }
    }

    /// Queue `path` (if it is a file) and retry every queued deletion.
    ///
    /// Always returns `true`; callers must not block on deletion.
    pub async fn delete(&self, path: &Path) -> bool {
        let mut state = self.state.lock().await;
        state.reserved.remove(path);

        let is_file = tokio::fs::metadata(path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if is_file && !state.pending.iter().any(|p| p == path) {
            state.pending.push(path.to_path_buf());
        }

        let queued = std::mem::take(&mut state.pending);
        for p in queued {
            match self.remover.remove(&p).await {
                Ok(()) => debug!(target: "audio_files", path = %p.display(), "Deleted file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(target: "audio_files", path = %p.display(), error = %e, "Error deleting file; will retry");
                    state.pending.push(p);
                }
            }
        }
        true
    }

    pub async fn is_pending_deletion(&self, path: &Path) -> bool {
        self.state.lock().await.pending.iter().any(|p| p == path)
    }

    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn ensure_creates_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("temp");
        let mgr = AudioFileManager::new(&dir);
        mgr.ensure_output_directory().await.unwrap();
        assert!(dir.is_dir());
    }

    #[tokio::test]
    async fn ensure_clears_files_but_not_subdirectories() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("1.wav"), b"x").unwrap();
        std::fs::write(tmp.path().join("2.wav"), b"y").unwrap();
        std::fs::create_dir(tmp.path().join("nested")).unwrap();
        std::fs::write(tmp.path().join("nested").join("3.wav"), b"z").unwrap();

        let mgr = AudioFileManager::new(tmp.path());
        mgr.ensure_output_directory().await.unwrap();

        assert!(!tmp.path().join("1.wav").exists());
        assert!(!tmp.path().join("2.wav").exists());
        assert!(tmp.path().join("nested").join("3.wav").exists());
    }

    #[tokio::test]
    async fn ensure_tolerates_removal_failures() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("1.wav"), b"x").unwrap();
        let mut remover = MockFileRemover::new();
        remover
            .expect_remove()
            .returning(|_| Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked")));
        let mgr = AudioFileManager::with_remover(tmp.path(), Arc::new(remover));
        assert!(mgr.ensure_output_directory().await.is_ok());
    }

    #[tokio::test]
    async fn unique_names_within_the_same_millisecond() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = AudioFileManager::new(tmp.path());
        let mut seen = HashSet::new();
        for _ in 0..50 {
            let p = mgr.generate_unique_name("wav").await;
            assert!(!p.exists());
            assert!(seen.insert(p));
        }
    }

    #[tokio::test]
    async fn unique_name_skips_existing_files_downwards() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = AudioFileManager::new(tmp.path());
        let first = mgr.generate_unique_name("wav").await;
        let stem: i64 = first.file_stem().unwrap().to_str().unwrap().parse().unwrap();
        // Occupy the next few future milliseconds on disk as well.
        for ms in stem..stem + 20 {
            std::fs::write(tmp.path().join(format!("{}.wav", ms)), b"").unwrap();
        }
        let second = mgr.generate_unique_name("wav").await;
        assert!(!second.exists());
        assert_ne!(first, second);
        assert_eq!(second.extension().unwrap(), "wav");
    }

    /// Takes its time, like a removal on a slow or network drive.
    struct SlowRemover(std::time::Duration);

    #[async_trait]
    impl FileRemover for SlowRemover {
        async fn remove(&self, path: &Path) -> io::Result<()> {
            tokio::time::sleep(self.0).await;
            tokio::fs::remove_file(path).await
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn slow_removal_does_not_stall_other_tasks() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("1.wav");
        std::fs::write(&path, b"x").unwrap();
        let mgr = Arc::new(AudioFileManager::with_remover(
            tmp.path(),
            Arc::new(SlowRemover(std::time::Duration::from_millis(300))),
        ));

        let deleting = tokio::spawn({
            let mgr = mgr.clone();
            let path = path.clone();
            async move { mgr.delete(&path).await }
        });
        // One thread: this only wakes before the removal ends if it yielded.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!deleting.is_finished());

        assert!(deleting.await.unwrap());
        assert!(!path.exists());
        assert_eq!(mgr.pending_count().await, 0);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("1.wav");
        std::fs::write(&path, b"x").unwrap();
        let mgr = AudioFileManager::new(tmp.path());

        assert!(mgr.delete(&path).await);
        assert!(!path.exists());
        assert!(mgr.delete(&path).await);
        assert_eq!(mgr.pending_count().await, 0);
    }

    #[tokio::test]
    async fn locked_file_is_retried_on_next_delete() {
        let tmp = tempfile::tempdir().unwrap();
        let locked = tmp.path().join("1.wav");
        let other = tmp.path().join("2.wav");
        std::fs::write(&locked, b"x").unwrap();
        std::fs::write(&other, b"y").unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut remover = MockFileRemover::new();
        remover.expect_remove().returning(move |p| {
            // The first attempt on the locked file fails, later ones succeed.
            if p.ends_with("1.wav") && counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "in use"))
            } else {
                std::fs::remove_file(p)
            }
        });
        let mgr = AudioFileManager::with_remover(tmp.path(), Arc::new(remover));

        assert!(mgr.delete(&locked).await);
        assert!(mgr.is_pending_deletion(&locked).await);
        assert!(locked.exists());

        assert!(mgr.delete(&other).await);
        assert!(!locked.exists());
        assert!(!other.exists());
        assert!(!mgr.is_pending_deletion(&locked).await);
    }
}
