//! Filesystem capability used by the synchronization engine
//!
//! The engine only needs a handful of primitives: stat, mkdir, symlink,
//! readlink, remove and a directory listing. Keeping them behind `ShareFs`
//! lets the engine run against the real disk (`OsFs`) or the in-memory
//! double (`MemoryFs`) in tests and benchmarks.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Filesystem primitives needed to maintain the share mirror
pub trait ShareFs: Send + Sync {
    /// Whether `path` exists, following symlinks
    fn exists(&self, path: &Path) -> bool;

    /// Whether `path` itself is a symlink (dangling or not)
    fn is_symlink(&self, path: &Path) -> bool;

    /// Create `path` and all missing parents
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Create a symlink at `link` pointing to `target`
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()>;

    /// Target of the symlink at `path`
    fn read_link(&self, path: &Path) -> io::Result<PathBuf>;

    /// Remove a symlink, file or empty directory without following links
    fn remove_entry(&self, path: &Path) -> io::Result<()>;

    /// Names of the entries directly inside `path`
    fn read_dir(&self, path: &Path) -> io::Result<Vec<String>>;

    /// Remove `path` if present; `Ok(false)` when there was nothing to remove
    fn remove_if_present(&self, path: &Path) -> io::Result<bool> {
        match self.remove_entry(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// `ShareFs` backed by the host filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFs;

impl OsFs {
    pub fn new() -> Self {
        Self
    }
}

impl ShareFs for OsFs {
    fn exists(&self, path: &Path) -> bool {
        fs::metadata(path).is_ok()
    }

    fn is_symlink(&self, path: &Path) -> bool {
        fs::symlink_metadata(path)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    #[cfg(unix)]
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        std::os::unix::fs::symlink(target, link)
    }

    #[cfg(windows)]
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        if target.is_dir() {
            std::os::windows::fs::symlink_dir(target, link)
        } else {
            std::os::windows::fs::symlink_file(target, link)
        }
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        fs::read_link(path)
    }

    fn remove_entry(&self, path: &Path) -> io::Result<()> {
        let meta = fs::symlink_metadata(path)?;
        if meta.file_type().is_symlink() {
            // Directory symlinks on Windows need remove_dir
            fs::remove_file(path).or_else(|_| fs::remove_dir(path))
        } else if meta.is_dir() {
            fs::remove_dir(path)
        } else {
            fs::remove_file(path)
        }
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(path)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }
}
