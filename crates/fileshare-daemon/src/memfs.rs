//! In-memory `ShareFs` double
//!
//! Models directories, files and symlinks keyed by absolute path. Symlinks
//! are followed by `exists` (including links in intermediate components),
//! never by `remove_entry`. Paths can be marked as failing to simulate
//! permission errors on a single consumer.

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::fs::ShareFs;

/// Symlink hops before a path is considered unresolvable
const MAX_SYMLINK_DEPTH: usize = 40;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Dir,
    File,
    Symlink(PathBuf),
}

/// Filesystem double held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryFs {
    nodes: Mutex<BTreeMap<PathBuf, Node>>,
    failing: Mutex<HashSet<PathBuf>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a file (and its parent directories)
    pub fn write_file(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            self.create_dir_all(parent)?;
        }
        self.nodes.lock().insert(path.to_path_buf(), Node::File);
        Ok(())
    }

    /// Remove `path` and everything below it
    pub fn remove_all(&self, path: &Path) {
        self.nodes.lock().retain(|p, _| !p.starts_with(path));
    }

    /// Make mkdir and symlink fail at or below `path`
    pub fn fail_on(&self, path: &Path) {
        self.failing.lock().insert(path.to_path_buf());
    }

    pub fn node(&self, path: &Path) -> Option<Node> {
        self.nodes.lock().get(path).cloned()
    }

    /// Target of the symlink at `path`, if it is one
    pub fn symlink_target(&self, path: &Path) -> Option<PathBuf> {
        match self.node(path) {
            Some(Node::Symlink(target)) => Some(target),
            _ => None,
        }
    }

    /// Every symlink below `root` with its target
    pub fn symlinks_under(&self, root: &Path) -> Vec<(PathBuf, PathBuf)> {
        self.nodes
            .lock()
            .iter()
            .filter(|(p, _)| p.starts_with(root))
            .filter_map(|(p, node)| match node {
                Node::Symlink(target) => Some((p.clone(), target.clone())),
                _ => None,
            })
            .collect()
    }

    /// Full copy of the tree, for before/after comparisons
    pub fn snapshot(&self) -> BTreeMap<PathBuf, Node> {
        self.nodes.lock().clone()
    }

    fn check_failing(&self, path: &Path) -> io::Result<()> {
        if self.failing.lock().iter().any(|p| path.starts_with(p)) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("injected failure at {:?}", path),
            ));
        }
        Ok(())
    }

    fn resolve(nodes: &BTreeMap<PathBuf, Node>, path: &Path, depth: usize) -> Option<PathBuf> {
        if depth > MAX_SYMLINK_DEPTH {
            return None;
        }

        let mut current = PathBuf::new();
        let mut components = path.components();
        while let Some(component) = components.next() {
            current.push(component);
            if let Some(Node::Symlink(target)) = nodes.get(&current) {
                let mut next = if target.is_absolute() {
                    target.clone()
                } else {
                    current.parent().unwrap_or(Path::new("/")).join(target)
                };
                next.extend(components);
                return Self::resolve(nodes, &next, depth + 1);
            }
        }
        Some(current)
    }

    fn is_dir_node(nodes: &BTreeMap<PathBuf, Node>, path: &Path) -> bool {
        match Self::resolve(nodes, path, 0) {
            Some(resolved) => {
                resolved.parent().is_none() || nodes.get(&resolved) == Some(&Node::Dir)
            }
            None => false,
        }
    }
}

impl ShareFs for MemoryFs {
    fn exists(&self, path: &Path) -> bool {
        let nodes = self.nodes.lock();
        match Self::resolve(&nodes, path, 0) {
            Some(resolved) => resolved.parent().is_none() || nodes.contains_key(&resolved),
            None => false,
        }
    }

    fn is_symlink(&self, path: &Path) -> bool {
        matches!(self.nodes.lock().get(path), Some(Node::Symlink(_)))
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.check_failing(path)?;
        let mut nodes = self.nodes.lock();

        let mut current = PathBuf::new();
        for component in path.components() {
            current.push(component);
            if current.parent().is_none() {
                continue;
            }
            match nodes.get(&current) {
                None => {
                    nodes.insert(current.clone(), Node::Dir);
                }
                Some(Node::Dir) => {}
                Some(Node::Symlink(_)) if Self::is_dir_node(&nodes, &current) => {}
                Some(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("{:?} exists and is not a directory", current),
                    ));
                }
            }
        }
        Ok(())
    }

    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        self.check_failing(link)?;
        let mut nodes = self.nodes.lock();

        if nodes.contains_key(link) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{:?} already exists", link),
            ));
        }
        let parent_ok = link
            .parent()
            .map(|p| Self::is_dir_node(&nodes, p))
            .unwrap_or(false);
        if !parent_ok {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("parent of {:?} is not a directory", link),
            ));
        }

        nodes.insert(link.to_path_buf(), Node::Symlink(target.to_path_buf()));
        Ok(())
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        match self.nodes.lock().get(path) {
            Some(Node::Symlink(target)) => Ok(target.clone()),
            Some(_) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{:?} is not a symlink", path),
            )),
            None => Err(io::ErrorKind::NotFound.into()),
        }
    }

    fn remove_entry(&self, path: &Path) -> io::Result<()> {
        let mut nodes = self.nodes.lock();
        let is_dir = match nodes.get(path) {
            Some(node) => *node == Node::Dir,
            None => return Err(io::ErrorKind::NotFound.into()),
        };
        if is_dir && nodes.keys().any(|p| p.parent() == Some(path)) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{:?} is not empty", path),
            ));
        }
        nodes.remove(path);
        Ok(())
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<String>> {
        let nodes = self.nodes.lock();
        if nodes.get(path) != Some(&Node::Dir) {
            return Err(io::ErrorKind::NotFound.into());
        }
        Ok(nodes
            .keys()
            .filter(|p| p.parent() == Some(path))
            .filter_map(|p| p.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect())
    }
}
