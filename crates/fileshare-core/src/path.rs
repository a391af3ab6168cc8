//! Path validation and per-user layout
//!
//! Share paths come from clients and are joined onto a user's home
//! directory, so they are validated before any filesystem operation.
//! `Layout` derives every per-user directory from the storage root.

use std::path::{Component, Path, PathBuf};

use crate::error::{Result, ShareError};
use crate::hash::split_symlink_name;
use crate::types::ShareItem;
use crate::{
    GUEST, HOME_DIR, MAX_FILENAME_LEN, MAX_PATH_LEN, PREVIEW_DIR, SHARES_DIR, WEBDAV_DIR,
};

/// Normalize a share path relative to its owner's home directory.
///
/// Leading and trailing slashes and `.` components are dropped. Parent
/// components, null bytes and platform prefixes are rejected so the
/// result can never escape the home directory.
///
/// # Returns
/// * `Ok(String)` - `/`-joined normal components (empty for the whole home)
/// * `Err(ShareError::InvalidPath)` - If the path is unsafe
pub fn normalize_share_path(raw: &str) -> Result<String> {
    if raw.contains('\0') {
        return Err(ShareError::InvalidPath("path contains null byte".into()));
    }

    if raw.len() > MAX_PATH_LEN {
        return Err(ShareError::InvalidPath(format!(
            "path too long: {} bytes (max {})",
            raw.len(),
            MAX_PATH_LEN
        )));
    }

    let mut parts: Vec<String> = Vec::new();

    for component in Path::new(raw).components() {
        match component {
            Component::Normal(name) => {
                let name = name.to_string_lossy();
                if name.len() > MAX_FILENAME_LEN {
                    return Err(ShareError::InvalidPath(format!(
                        "component too long: {} bytes (max {})",
                        name.len(),
                        MAX_FILENAME_LEN
                    )));
                }
                parts.push(name.into_owned());
            }
            Component::ParentDir => {
                return Err(ShareError::InvalidPath(
                    "parent directory (..) not allowed".into(),
                ));
            }
            Component::Prefix(_) => {
                return Err(ShareError::InvalidPath("path prefixes not allowed".into()));
            }
            // Share paths are relative to the home directory either way
            Component::RootDir | Component::CurDir => {}
        }
    }

    Ok(parts.join("/"))
}

/// Validate a username before it names directories on disk
pub fn validate_username(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ShareError::InvalidName("empty username".into()));
    }

    if name.eq_ignore_ascii_case(GUEST) {
        return Err(ShareError::InvalidName(format!("'{}' is reserved", GUEST)));
    }

    if name.len() > MAX_FILENAME_LEN {
        return Err(ShareError::InvalidName(format!(
            "username too long: {} bytes (max {})",
            name.len(),
            MAX_FILENAME_LEN
        )));
    }

    if name == "." || name == ".." {
        return Err(ShareError::InvalidName(
            "special directory names not allowed".into(),
        ));
    }

    if name.contains('/') || name.contains('\\') || name.contains('\0') {
        return Err(ShareError::InvalidName(
            "username contains path separator".into(),
        ));
    }

    Ok(())
}

/// Directory layout of every user under the storage root
///
/// ```text
/// {files_path}/alice/
/// ├── files/                     # real content (home)
/// ├── preview/                   # preview cache
/// ├── shares/
/// │   └── bob/
/// │       └── reports_3fa1...    # -> {files_path}/bob/files/docs/reports
/// └── webdav/
///     ├── files                  # -> {files_path}/alice/files
///     └── shares                 # -> {files_path}/alice/shares
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    files_path: PathBuf,
}

impl Layout {
    pub fn new(files_path: impl Into<PathBuf>) -> Self {
        Self {
            files_path: files_path.into(),
        }
    }

    /// Storage root
    pub fn files_path(&self) -> &Path {
        &self.files_path
    }

    pub fn user_root(&self, username: &str) -> PathBuf {
        self.files_path.join(username)
    }

    pub fn home_dir(&self, username: &str) -> PathBuf {
        self.user_root(username).join(HOME_DIR)
    }

    pub fn preview_dir(&self, username: &str) -> PathBuf {
        self.user_root(username).join(PREVIEW_DIR)
    }

    pub fn shares_dir(&self, username: &str) -> PathBuf {
        self.user_root(username).join(SHARES_DIR)
    }

    pub fn webdav_dir(&self, username: &str) -> PathBuf {
        self.user_root(username).join(WEBDAV_DIR)
    }

    /// Directory holding the mirror entries `consumer` sees from `owner`
    pub fn mirror_dir(&self, consumer: &str, owner: &str) -> PathBuf {
        self.shares_dir(consumer).join(owner)
    }

    /// Mirror entry of `share` inside `consumer`'s tree
    pub fn mirror_entry(&self, consumer: &str, owner: &str, share: &ShareItem) -> Result<PathBuf> {
        Ok(self.mirror_dir(consumer, owner).join(share.symlink_name()?))
    }

    /// Real location of `share` inside its owner's home
    pub fn share_source(&self, owner: &str, share: &ShareItem) -> PathBuf {
        let home = self.home_dir(owner);
        if share.path.is_empty() {
            home
        } else {
            home.join(&share.path)
        }
    }

    /// Preview cache location for `share`, optionally for one file inside it
    pub fn share_preview(&self, owner: &str, share: &ShareItem, file: Option<&str>) -> PathBuf {
        let mut path = self.preview_dir(owner);
        if !share.path.is_empty() {
            path.push(&share.path);
        }
        if let Some(file) = file {
            path.push(file);
        }
        path
    }
}

/// A public share URL split into its parts
///
/// External links look like `/{user}/{name}_{hash}/{rest...}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalRef<'a> {
    pub user: &'a str,
    pub name: &'a str,
    pub hash: &'a str,
    pub rest: Vec<&'a str>,
}

impl<'a> ExternalRef<'a> {
    /// Parse an external share URL path
    pub fn parse(url: &'a str) -> Option<Self> {
        let mut segments = url
            .trim_start_matches('/')
            .split('/')
            .filter(|s| !s.is_empty());

        let user = segments.next()?;
        let (name, hash) = split_symlink_name(segments.next()?)?;

        Some(Self {
            user,
            name,
            hash,
            rest: segments.collect(),
        })
    }

    /// Final segment when it names a file (has an extension)
    pub fn file_name(&self) -> Option<&'a str> {
        self.rest
            .last()
            .copied()
            .filter(|last| Path::new(last).extension().is_some())
    }
}
