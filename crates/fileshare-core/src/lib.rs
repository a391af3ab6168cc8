//! Fileshare Core - Shared types, share permissions, and path layout
//!
//! This crate contains the declarative half of fileshare: the JSON
//! configuration document, users and their shares, the permission rule
//! that decides who sees a share, and the naming scheme of the symlink
//! mirror. It never mutates the filesystem; that is the daemon's job.

pub mod config;
pub mod error;
pub mod hash;
pub mod path;
pub mod types;

pub use config::{AuthConfig, CaptchaConfig, GlobalConfig, PreviewConfig};
pub use error::*;
pub use hash::{generate_share_hash, split_symlink_name, symlink_name};
pub use path::{normalize_share_path, validate_username, ExternalRef, Layout};
pub use types::*;

/// Username of the synthesized anonymous profile
pub const GUEST: &str = "guest";

/// Directory holding a user's real content
pub const HOME_DIR: &str = "files";

/// Directory holding a user's share mirror
pub const SHARES_DIR: &str = "shares";

/// Directory holding a user's preview cache
pub const PREVIEW_DIR: &str = "preview";

/// WebDAV root exposing `files` and `shares` as symlinks
pub const WEBDAV_DIR: &str = "webdav";

/// Maximum share path length in bytes
pub const MAX_PATH_LEN: usize = 4096;

/// Maximum path component length in bytes
pub const MAX_FILENAME_LEN: usize = 255;
