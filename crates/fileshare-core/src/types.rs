//! Users, shares, and the share permission rule

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, ShareError};
use crate::hash::{generate_share_hash, symlink_name};
use crate::path::normalize_share_path;
use crate::GUEST;

/// Identity of whoever is looking at a share
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Viewer<'a> {
    /// A registered, non-guest user
    Registered(&'a str),
    /// The anonymous visitor behind an external hash link
    Guest,
    /// A name the store does not know
    Unknown(&'a str),
}

impl<'a> Viewer<'a> {
    pub fn name(&self) -> &'a str {
        match *self {
            Viewer::Registered(name) | Viewer::Unknown(name) => name,
            Viewer::Guest => GUEST,
        }
    }
}

/// One shared subtree of a user's home directory and its access rules
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ShareItem {
    /// Path relative to the owner's home, never with a trailing slash
    pub path: String,
    /// Visible to anonymous holders of the hash link
    pub allow_external: bool,
    /// Visible to every registered user
    pub allow_local: bool,
    /// Visible to these users only
    #[serde(rename = "allowedUsers")]
    pub allow_users: Vec<String>,
    /// Addressing token, recomputed from owner and path
    #[serde(skip)]
    pub hash: Option<String>,
}

impl ShareItem {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Normalize the path in place
    pub fn normalize(&mut self) -> Result<()> {
        self.path = normalize_share_path(&self.path)?;
        Ok(())
    }

    /// Derive the hash for this share under `owner`
    pub fn assign_hash(&mut self, owner: &str) {
        self.hash = Some(generate_share_hash(owner, &self.path));
    }

    pub fn hash(&self) -> Option<&str> {
        self.hash.as_deref().filter(|h| !h.is_empty())
    }

    /// Name of this share's mirror entry
    pub fn symlink_name(&self) -> Result<String> {
        self.hash()
            .map(|hash| symlink_name(&self.path, hash))
            .ok_or_else(|| ShareError::MissingHash(self.path.clone()))
    }

    /// Whether `viewer` may see this share.
    ///
    /// The first matching branch decides:
    /// 1. registered viewer and `allow_local`
    /// 2. guest viewer, `allow_external` and a known hash
    /// 3. viewer named in `allow_users`
    pub fn is_allowed(&self, viewer: Viewer<'_>) -> bool {
        let name = viewer.name();
        if name.is_empty() {
            return false;
        }

        if self.allow_local && matches!(viewer, Viewer::Registered(_)) {
            true
        } else if self.allow_external && self.hash().is_some() && viewer == Viewer::Guest {
            true
        } else {
            self.allow_users.iter().any(|u| u.eq_ignore_ascii_case(name))
        }
    }

    /// Whether `hash` addresses this share
    pub fn matches_hash(&self, hash: &str) -> bool {
        self.hash().is_some_and(|h| h.eq_ignore_ascii_case(hash))
    }
}

/// A registered user and the shares they publish
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserConfig {
    pub username: String,
    /// Credential hash managed by the auth layer
    #[serde(skip_serializing_if = "String::is_empty")]
    pub password: String,
    pub admin: bool,
    pub allow_new: bool,
    pub allow_edit: bool,
    pub lock_password: bool,
    pub first_run: bool,
    pub locale: String,
    pub view_mode: String,
    #[serde(rename = "UID")]
    pub uid: u32,
    #[serde(rename = "GID")]
    pub gid: u32,
    /// Client addresses that authenticate as this user
    pub ip_auth: Vec<String>,
    /// Published shares, sorted by path
    pub shares: Vec<ShareItem>,
}

impl UserConfig {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Default::default()
        }
    }

    /// Anonymous profile borrowing display settings from the admin
    pub fn guest(admin: Option<&UserConfig>) -> Self {
        let mut guest = Self::new(GUEST);
        if let Some(admin) = admin {
            guest.locale = admin.locale.clone();
            guest.view_mode = admin.view_mode.clone();
        }
        guest
    }

    pub fn is_guest(&self) -> bool {
        self.username.eq_ignore_ascii_case(GUEST)
    }

    /// Case-insensitive username comparison
    pub fn is_named(&self, name: &str) -> bool {
        self.username.eq_ignore_ascii_case(name)
    }

    pub fn share(&self, path: &str) -> Option<&ShareItem> {
        self.shares.iter().find(|s| s.path == path)
    }

    pub fn share_position(&self, path: &str) -> Option<usize> {
        self.shares.iter().position(|s| s.path == path)
    }

    pub fn sort_shares(&mut self) {
        self.shares.sort_by(|a, b| a.path.cmp(&b.path));
    }

    /// Normalize, hash and sort shares, rejecting bad or duplicate paths
    pub fn prepare_shares(&mut self) -> Result<()> {
        for share in &mut self.shares {
            share.normalize()?;
            share.assign_hash(&self.username);
        }
        self.sort_shares();

        if let Some(dup) = self.shares.windows(2).find(|w| w[0].path == w[1].path) {
            return Err(ShareError::AlreadyExists(format!(
                "share '{}' of {}",
                dup[0].path, self.username
            )));
        }
        if let Some((share, other)) = self
            .shares
            .iter()
            .find_map(|share| self.link_conflict(share).map(|other| (share, other)))
        {
            return Err(link_conflict_error(&self.username, share, other));
        }
        Ok(())
    }

    /// Another share whose mirror entry name equals the one of `share`.
    ///
    /// Hashing ignores slashes, so `a/b/c` and `ab/c` would otherwise
    /// produce the same entry in every consumer's mirror.
    pub fn link_conflict(&self, share: &ShareItem) -> Option<&ShareItem> {
        let name = share.symlink_name().ok()?;
        self.shares.iter().find(|other| {
            other.path != share.path && other.symlink_name().is_ok_and(|n| n == name)
        })
    }

    /// Like `prepare_shares`, but drops what it cannot accept
    pub fn repair_shares(&mut self) {
        let owner = self.username.clone();
        self.shares.retain_mut(|share| match share.normalize() {
            Ok(()) => {
                share.assign_hash(&owner);
                true
            }
            Err(e) => {
                warn!("Dropping share {:?} of {}: {}", share.path, owner, e);
                false
            }
        });
        self.sort_shares();
        self.shares.dedup_by(|b, a| {
            let dup = a.path == b.path;
            if dup {
                warn!("Dropping duplicate share {:?} of {}", b.path, owner);
            }
            dup
        });

        // First share in path order keeps a contested mirror entry name
        let mut names = HashSet::new();
        self.shares.retain(|share| {
            let Ok(name) = share.symlink_name() else {
                return true;
            };
            let fresh = names.insert(name);
            if !fresh {
                warn!(
                    "Dropping share {:?} of {}: its link name is already taken",
                    share.path, owner
                );
            }
            fresh
        });
    }

    /// Copy the updatable fields from `update`.
    ///
    /// Username and password are never touched here.
    pub fn merge_from(&mut self, update: &UserConfig) {
        self.admin = update.admin;
        self.view_mode = update.view_mode.clone();
        self.first_run = update.first_run;
        self.shares = update.shares.clone();
        self.ip_auth = update.ip_auth.clone();
        self.locale = update.locale.clone();
        self.allow_edit = update.allow_edit;
        self.allow_new = update.allow_new;
        self.lock_password = update.lock_password;
        self.uid = update.uid;
        self.gid = update.gid;
    }
}

/// `AlreadyExists` for two shares that map to one mirror entry
pub fn link_conflict_error(owner: &str, share: &ShareItem, other: &ShareItem) -> ShareError {
    ShareError::AlreadyExists(format!(
        "share '{}' of {} has the same link name as '{}'",
        share.path, owner, other.path
    ))
}
