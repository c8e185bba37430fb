//! Concrete `FileSystem` implementations: `RealFileSystem` backed by `std::fs`, and
//! `InMemoryFileSystem` for tests.

use ssm_contracts::FileSystem;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Default, Clone, Copy)]
pub struct RealFileSystem;

impl RealFileSystem {
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.try_exists().unwrap_or(false)
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(path)? {
            out.push(entry?.path());
        }
        Ok(out)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        std::fs::write(path, data)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::rename(from, to)
    }

    fn rename_non_overwriting(&self, from: &Path, to: &Path) -> io::Result<()> {
        if to.try_exists().unwrap_or(false) {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "destination exists"));
        }
        // Best-effort race guard: `fs::rename` on POSIX overwrites unconditionally, so use a
        // hard-link + remove-source pair, which fails atomically if the destination appears
        // between the check above and this call.
        std::fs::hard_link(from, to)?;
        std::fs::remove_file(from)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn remove_empty_dir(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir(path)
    }

    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(target, link)
        }
        #[cfg(not(unix))]
        {
            let _ = (target, link);
            Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "symlink is only supported on unix targets",
            ))
        }
    }

    fn file_len(&self, path: &Path) -> io::Result<u64> {
        Ok(std::fs::metadata(path)?.len())
    }

    fn copy_dir_recursive(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::create_dir_all(to)?;
        for entry in std::fs::read_dir(from)? {
            let entry = entry?;
            let src = entry.path();
            let dst = to.join(entry.file_name());
            if entry.file_type()?.is_dir() {
                self.copy_dir_recursive(&src, &dst)?;
            } else {
                std::fs::copy(&src, &dst)?;
            }
        }
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir_all(path)
    }
}

#[derive(Clone)]
enum Node {
    Dir,
    File(Vec<u8>),
    Symlink(PathBuf),
}

/// In-memory filesystem for unit tests. Paths are treated literally; callers should use
/// consistent absolute paths.
#[derive(Default)]
pub struct InMemoryFileSystem {
    nodes: Mutex<HashMap<PathBuf, Node>>,
}

impl InMemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dir(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.ensure_ancestors(&path);
        self.nodes.lock().unwrap().insert(path, Node::Dir);
    }

    pub fn add_file(&self, path: impl Into<PathBuf>, data: impl Into<Vec<u8>>) {
        let path = path.into();
        if let Some(parent) = path.parent() {
            self.ensure_ancestors(parent);
        }
        self.nodes.lock().unwrap().insert(path, Node::File(data.into()));
    }

    fn ensure_ancestors(&self, path: &Path) {
        let mut ancestors: Vec<&Path> = path.ancestors().collect();
        ancestors.reverse();
        let mut nodes = self.nodes.lock().unwrap();
        for ancestor in ancestors {
            nodes.entry(ancestor.to_path_buf()).or_insert(Node::Dir);
        }
    }
}

impl FileSystem for InMemoryFileSystem {
    fn exists(&self, path: &Path) -> bool {
        self.nodes.lock().unwrap().contains_key(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.nodes.lock().unwrap().get(path), Some(Node::Dir))
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let nodes = self.nodes.lock().unwrap();
        if !matches!(nodes.get(path), Some(Node::Dir)) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "not a directory"));
        }
        let mut out: Vec<PathBuf> = nodes
            .keys()
            .filter(|p| p.parent() == Some(path))
            .cloned()
            .collect();
        out.sort();
        Ok(out)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.ensure_ancestors(path);
        self.nodes.lock().unwrap().insert(path.to_path_buf(), Node::Dir);
        Ok(())
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        match self.nodes.lock().unwrap().get(path) {
            Some(Node::File(data)) => Ok(data.clone()),
            _ => Err(io::Error::new(io::ErrorKind::NotFound, "no such file")),
        }
    }

    fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            self.ensure_ancestors(parent);
        }
        self.nodes
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), Node::File(data.to_vec()));
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut nodes = self.nodes.lock().unwrap();
        let node = nodes
            .remove(from)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "source missing"))?;
        nodes.insert(to.to_path_buf(), node);
        Ok(())
    }

    fn rename_non_overwriting(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut nodes = self.nodes.lock().unwrap();
        if nodes.contains_key(to) {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "destination exists"));
        }
        let node = nodes
            .remove(from)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "source missing"))?;
        nodes.insert(to.to_path_buf(), node);
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.nodes
            .lock()
            .unwrap()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))
    }

    fn remove_empty_dir(&self, path: &Path) -> io::Result<()> {
        let mut nodes = self.nodes.lock().unwrap();
        let has_children = nodes.keys().any(|p| p.parent() == Some(path));
        if has_children {
            return Err(io::Error::new(io::ErrorKind::Other, "directory not empty"));
        }
        nodes
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such directory"))
    }

    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        if let Some(parent) = link.parent() {
            self.ensure_ancestors(parent);
        }
        self.nodes
            .lock()
            .unwrap()
            .insert(link.to_path_buf(), Node::Symlink(target.to_path_buf()));
        Ok(())
    }

    fn file_len(&self, path: &Path) -> io::Result<u64> {
        match self.nodes.lock().unwrap().get(path) {
            Some(Node::File(data)) => Ok(data.len() as u64),
            _ => Err(io::Error::new(io::ErrorKind::NotFound, "no such file")),
        }
    }

    fn copy_dir_recursive(&self, from: &Path, to: &Path) -> io::Result<()> {
        let entries = self.read_dir(from)?;
        self.create_dir_all(to)?;
        for entry in entries {
            let name = entry.file_name().expect("child has a name");
            let dst = to.join(name);
            if self.is_dir(&entry) {
                self.copy_dir_recursive(&entry, &dst)?;
            } else {
                let data = self.read(&entry)?;
                self.write(&dst, &data)?;
            }
        }
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut nodes = self.nodes.lock().unwrap();
        let prefix = path.to_path_buf();
        nodes.retain(|p, _| p != &prefix && !p.starts_with(&prefix));
        Ok(())
    }
}
