use std::io;
use std::path::{Path, PathBuf};

/// Filesystem abstraction used everywhere the daemon touches disk. A real implementation backed
/// by `std::fs` lives in `ssm_core::fs_impl::RealFileSystem`; an in-memory fake for tests lives
/// alongside it.
pub trait FileSystem: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()>;
    /// Rename-with-replace semantics on POSIX; used for the atomic temp-write pattern.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    /// Fails (does not overwrite) if `to` already exists — used for non-overwriting placement of
    /// generated artifacts (details/cover writes racing another writer to the same path).
    fn rename_non_overwriting(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn remove_file(&self, path: &Path) -> io::Result<()>;
    /// Removes a directory only if it is empty.
    fn remove_empty_dir(&self, path: &Path) -> io::Result<()>;
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()>;
    fn file_len(&self, path: &Path) -> io::Result<u64>;
    /// Recursive copy, used by the residual-cleanup cross-device fallback.
    fn copy_dir_recursive(&self, from: &Path, to: &Path) -> io::Result<()>;
    /// Recursive removal, used after a successful cross-device copy.
    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;
}
