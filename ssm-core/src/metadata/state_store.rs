//! Metadata state store (spec §4.7): atomic JSON snapshot on disk — per-title cooldown expiries
//! plus the sticky-fallback expiry. `read` never fails after startup (falls back to `Empty`,
//! quarantining the previous file); `transform` is the only write path, atomic via
//! temp-write-in-same-dir + rename.

use ssm_contracts::FileSystem;
use ssm_model::MetadataStateSnapshot;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const CORRUPT_FILE_SUFFIX: &str = "metadata_state.corrupt.json";
const CORRUPT_DIR_SUFFIX: &str = "metadata_state.corrupt.dir";
const READ_RETRY_ATTEMPTS: usize = 3;
const READ_RETRY_BACKOFF: std::time::Duration = std::time::Duration::from_millis(20);

pub struct MetadataStateStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl MetadataStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    /// Loads the current snapshot, quarantining and recovering from a corrupt file or directory
    /// at the target path. Bounded read-retry absorbs a rename-over-write race (Open Question in
    /// spec §9) before concluding genuine corruption.
    pub fn read(&self, fs: &dyn FileSystem) -> MetadataStateSnapshot {
        if fs.is_dir(&self.path) {
            self.quarantine_dir(fs);
            return MetadataStateSnapshot::empty();
        }
        if !fs.exists(&self.path) {
            return MetadataStateSnapshot::empty();
        }

        for attempt in 0..READ_RETRY_ATTEMPTS {
            match fs.read(&self.path).ok().and_then(|bytes| serde_json::from_slice(&bytes).ok()) {
                Some(snapshot) => return snapshot,
                None if attempt + 1 < READ_RETRY_ATTEMPTS => {
                    std::thread::sleep(READ_RETRY_BACKOFF);
                }
                None => {}
            }
        }

        tracing::warn!(event = "metadata.state.corrupt", path = %self.path.display());
        self.quarantine_file(fs);
        MetadataStateSnapshot::empty()
    }

    /// Reads the current value, applies `transform`, and persists atomically. Callers serialize
    /// through `write_lock`; concurrent `read`s never observe a partially written file because
    /// the replace is a same-directory rename.
    pub fn transform<F>(&self, fs: &dyn FileSystem, transform: F) -> MetadataStateSnapshot
    where
        F: FnOnce(MetadataStateSnapshot) -> MetadataStateSnapshot,
    {
        let _guard = self.write_lock.lock().unwrap();
        let current = self.read(fs);
        let next = transform(current);
        self.persist(fs, &next);
        next
    }

    fn persist(&self, fs: &dyn FileSystem, snapshot: &MetadataStateSnapshot) {
        let json = match serde_json::to_vec_pretty(snapshot) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(event = "metadata.state.serialize_failed", error = %e);
                return;
            }
        };

        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        let _ = fs.create_dir_all(parent);
        let tmp_path = parent.join(format!(
            ".{}.tmp",
            self.path.file_name().and_then(|n| n.to_str()).unwrap_or("metadata_state.json")
        ));

        if let Err(e) = fs.write(&tmp_path, &json) {
            tracing::warn!(event = "metadata.state.write_failed", error = %e);
            return;
        }
        if let Err(e) = fs.rename(&tmp_path, &self.path) {
            tracing::warn!(event = "metadata.state.rename_failed", error = %e);
            let _ = fs.remove_file(&tmp_path);
        }
    }

    fn quarantine_file(&self, fs: &dyn FileSystem) {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        let target = parent.join(CORRUPT_FILE_SUFFIX);
        let _ = fs.remove_file(&target);
        let _ = fs.rename(&self.path, &target);
    }

    fn quarantine_dir(&self, fs: &dyn FileSystem) {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        let target = parent.join(CORRUPT_DIR_SUFFIX);
        let _ = fs.remove_dir_all(&target);
        let _ = fs.rename(&self.path, &target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_impl::InMemoryFileSystem;
    use chrono::Utc;

    #[test]
    fn read_missing_file_is_empty() {
        let fs = InMemoryFileSystem::new();
        let store = MetadataStateStore::new("/config/state/metadata_state.json");
        assert_eq!(store.read(&fs), MetadataStateSnapshot::empty());
    }

    #[test]
    fn transform_then_read_round_trips() {
        let fs = InMemoryFileSystem::new();
        let store = MetadataStateStore::new("/config/state/metadata_state.json");
        let now = Utc::now();
        store.transform(&fs, |mut snapshot| {
            snapshot.title_cooldowns_utc.insert("one piece".to_string(), now).unwrap();
            snapshot
        });
        let read_back = store.read(&fs);
        assert_eq!(read_back.title_cooldowns_utc.get("one piece").copied(), Some(now));
    }

    #[test]
    fn corrupt_file_is_quarantined_and_read_falls_back_to_empty() {
        let fs = InMemoryFileSystem::new();
        fs.write(Path::new("/config/state/metadata_state.json"), b"not json").unwrap();
        let store = MetadataStateStore::new("/config/state/metadata_state.json");
        let snapshot = store.read(&fs);
        assert_eq!(snapshot, MetadataStateSnapshot::empty());
        assert!(fs.exists(Path::new("/config/state/metadata_state.corrupt.json")));
    }
}
