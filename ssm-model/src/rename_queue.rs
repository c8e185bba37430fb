use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// A chapter directory observed via a filesystem event, pending the rename processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterRenameQueueEntry {
    pub path: PathBuf,
    pub enqueued_at: DateTime<Utc>,
}

impl ChapterRenameQueueEntry {
    pub fn new(path: PathBuf, enqueued_at: DateTime<Utc>) -> Self {
        Self { path, enqueued_at }
    }
}
