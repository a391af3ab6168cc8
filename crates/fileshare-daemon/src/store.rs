//! Configuration store
//!
//! Single authoritative holder of users and shares. One reader/writer lock
//! guards the whole document:
//!
//! - reads (`get_user`, `get_user_by_ip`, `resolve_external`, ...) take the
//!   shared lock
//! - mutations take the exclusive lock through a `WriteSection`, which
//!   rebuilds the index and persists the document when it is dropped
//!
//! Share-topology mutations reconcile the symlink mirror before the section
//! ends, so no reader can observe a declared share whose mirror is stale.
//! Per-user sharding of the lock would be the next step if admin traffic
//! ever contends with reads.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{error, info, warn};

use fileshare_core::{
    link_conflict_error, normalize_share_path, validate_username, ExternalRef, GlobalConfig,
    Layout, Result, ShareError, ShareItem, UserConfig, GUEST,
};

use crate::fs::{OsFs, ShareFs};
use crate::index::UserIndex;
use crate::sync_engine::{SyncEngine, SyncReport};

/// Users, shares and their derived index
struct StoreState {
    config: GlobalConfig,
    index: UserIndex,
    layout: Layout,
}

impl StoreState {
    fn new(config: GlobalConfig, layout: Layout) -> Self {
        Self {
            index: UserIndex::build(&config.users),
            layout,
            config,
        }
    }

    fn reindex(&mut self) {
        self.index = UserIndex::build(&self.config.users);
    }

    fn position(&self, name: &str) -> Result<usize> {
        self.index
            .position_by_name(name)
            .ok_or_else(|| ShareError::NotFound(format!("user {}", name)))
    }

    fn engine<'a, F: ShareFs>(&'a self, fs: &'a F) -> SyncEngine<'a, F> {
        SyncEngine::new(fs, &self.layout, &self.config.users)
    }

    /// Fail if one of `user`'s IPs already authenticates someone else
    fn check_ip_claims(&self, user: &UserConfig, own: Option<usize>) -> Result<()> {
        for ip in &user.ip_auth {
            if let Some(pos) = self.index.position_by_ip(ip) {
                if Some(pos) != own {
                    return Err(ShareError::AlreadyExists(format!(
                        "IP {} belongs to {}",
                        ip, self.config.users[pos].username
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Exclusive critical section; reindexes and persists on drop
struct WriteSection<'a, F: ShareFs> {
    state: RwLockWriteGuard<'a, StoreState>,
    store: &'a ShareStore<F>,
}

impl<F: ShareFs> Deref for WriteSection<'_, F> {
    type Target = StoreState;

    fn deref(&self) -> &StoreState {
        &self.state
    }
}

impl<F: ShareFs> DerefMut for WriteSection<'_, F> {
    fn deref_mut(&mut self) -> &mut StoreState {
        &mut self.state
    }
}

impl<F: ShareFs> Drop for WriteSection<'_, F> {
    fn drop(&mut self) {
        self.state.reindex();
        // Failures are logged and counted; memory stays authoritative
        let _ = self.store.persist_config(&self.state.config);
    }
}

/// Concurrency-safe store of users and shares
pub struct ShareStore<F: ShareFs = OsFs> {
    state: RwLock<StoreState>,
    fs: F,
    /// Config file location, fixed at load
    path: Option<PathBuf>,
    /// Storage root used instead of `filesPath`, never persisted
    root_override: Option<PathBuf>,
    persist_failures: AtomicU64,
}

impl ShareStore<OsFs> {
    /// Load from the first readable candidate and repair the mirror on disk
    pub fn load(candidates: &[PathBuf]) -> Result<Self> {
        Self::load_with(candidates, OsFs::new())
    }
}

impl<F: ShareFs> ShareStore<F> {
    /// Load from the first readable candidate using `fs` for the mirror
    pub fn load_with(candidates: &[PathBuf], fs: F) -> Result<Self> {
        let (config, path) = GlobalConfig::load_first(candidates)?;
        info!("Using config at {:?}", path);
        Ok(Self::open(config, Some(path), fs))
    }

    /// Build a store around an already parsed document.
    ///
    /// Normalizes shares, pins the storage root, indexes users and repairs
    /// the mirror. Without a `path` nothing is persisted.
    pub fn open(config: GlobalConfig, path: Option<PathBuf>, fs: F) -> Self {
        Self::open_at(config, path, fs, None)
    }

    /// Like `open`, but keep the mirror under `root` instead of `filesPath`.
    ///
    /// The override lives for this store only; the persisted document keeps
    /// its own `filesPath`.
    pub fn open_at(
        mut config: GlobalConfig,
        path: Option<PathBuf>,
        fs: F,
        root: Option<PathBuf>,
    ) -> Self {
        pin_files_path(&mut config, path.as_deref());
        config.normalize();

        let root_override = root.map(pin_root);
        let layout = match &root_override {
            Some(root) => Layout::new(root.clone()),
            None => config.layout(),
        };

        let store = Self {
            state: RwLock::new(StoreState::new(config, layout)),
            fs,
            path,
            root_override,
            persist_failures: AtomicU64::new(0),
        };
        store.repair();
        store
    }

    fn write_section(&self) -> WriteSection<'_, F> {
        WriteSection {
            state: self.state.write(),
            store: self,
        }
    }

    fn persist_config(&self, config: &GlobalConfig) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        config.save_to(path).map_err(|e| {
            self.persist_failures.fetch_add(1, Ordering::Relaxed);
            error!(
                "Config not persisted to {:?}, changes will be lost on restart: {}",
                path, e
            );
            ShareError::Persistence {
                path: path.clone(),
                reason: e.to_string(),
            }
        })
    }

    /// Write the whole document to its config path
    pub fn persist(&self) -> Result<()> {
        let state = self.state.read();
        self.persist_config(&state.config)
    }

    /// Number of failed writes since startup
    pub fn persist_failures(&self) -> u64 {
        self.persist_failures.load(Ordering::Relaxed)
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    pub fn layout(&self) -> Layout {
        self.state.read().layout.clone()
    }

    /// Copy of the whole document
    pub fn snapshot(&self) -> GlobalConfig {
        self.state.read().config.clone()
    }

    /// Copy of a user; `guest` yields the synthesized anonymous profile
    pub fn get_user(&self, name: &str) -> Result<UserConfig> {
        let state = self.state.read();
        if name.eq_ignore_ascii_case(GUEST) {
            return Ok(UserConfig::guest(state.config.admin()));
        }

        let pos = state.position(name)?;
        Ok(state.config.users[pos].clone())
    }

    /// Read-only view of the user authenticated by a client address.
    ///
    /// The shared lock is held until the returned guard is dropped.
    pub fn get_user_by_ip(&self, ip: &str) -> Result<MappedRwLockReadGuard<'_, UserConfig>> {
        let state = self.state.read();
        RwLockReadGuard::try_map(state, |s| {
            s.index
                .position_by_ip(ip)
                .and_then(|pos| s.config.users.get(pos))
        })
        .map_err(|_| ShareError::NotFound(format!("user for IP {}", ip)))
    }

    /// Copies of every user in priority order
    pub fn users(&self) -> Vec<UserConfig> {
        self.state.read().config.users.clone()
    }

    /// First user flagged as admin
    pub fn admin(&self) -> Option<UserConfig> {
        self.state.read().config.admin().cloned()
    }

    /// Whether the viewer named `viewer` may see `share`
    pub fn is_allowed(&self, share: &ShareItem, viewer: &str) -> bool {
        let state = self.state.read();
        let engine = state.engine(&self.fs);
        share.is_allowed(engine.viewer(viewer))
    }

    /// Register a new user and mirror everything they may see
    pub fn add_user(&self, mut user: UserConfig) -> Result<()> {
        validate_username(&user.username)?;
        user.prepare_shares()?;

        let mut section = self.write_section();
        if section.index.contains_name(&user.username) {
            return Err(ShareError::AlreadyExists(format!("user {}", user.username)));
        }
        section.check_ip_claims(&user, None)?;

        let name = user.username.clone();
        section.config.users.push(user);

        let state = &*section;
        let engine = state.engine(&self.fs);
        if let Err(e) = engine.ensure_user_layout(&name) {
            warn!("Cannot prepare directories of {}: {}", name, e);
        }

        let mut report = engine.sync_consumer(&name);
        if let Some(user) = state.config.users.last() {
            for share in &user.shares {
                report.merge(engine.sync_share_add(share, &name));
            }
        }
        info!("Added user {} ({} mirror entries)", name, report.linked);
        Ok(())
    }

    /// Merge the updatable fields of `update` into the existing user
    pub fn update_user(&self, update: &UserConfig) -> Result<()> {
        let mut section = self.write_section();
        let pos = section.position(&update.username)?;

        let mut incoming = update.clone();
        incoming.username = section.config.users[pos].username.clone();
        incoming.prepare_shares()?;
        section.check_ip_claims(&incoming, Some(pos))?;

        let previous = section.config.users[pos].shares.clone();
        section.config.users[pos].merge_from(&incoming);

        let state = &*section;
        let owner = &state.config.users[pos];
        let engine = state.engine(&self.fs);

        let mut report = SyncReport::default();
        for old in previous.iter().filter(|s| owner.share(&s.path).is_none()) {
            report.merge(engine.sync_share_remove(old, &owner.username));
        }
        for share in &owner.shares {
            report.merge(engine.sync_share_refresh(share, &owner.username));
        }
        if report.has_drift() {
            warn!("Mirror of {} incomplete after update: {:?}", owner.username, report);
        }

        info!("Updated user {}", owner.username);
        Ok(())
    }

    /// Remove a user and their shares' mirror entries; `false` if absent
    pub fn delete_user(&self, name: &str) -> bool {
        let mut section = self.write_section();
        let Some(pos) = section.index.position_by_name(name) else {
            return false;
        };

        let removed = section.config.users.remove(pos);
        let engine = section.engine(&self.fs);
        for share in &removed.shares {
            engine.sync_share_remove(share, &removed.username);
        }

        info!("Deleted user {}", removed.username);
        true
    }

    /// Publish a new share of `owner` and mirror it
    pub fn add_share(&self, owner: &str, mut share: ShareItem) -> Result<ShareItem> {
        share.normalize()?;

        let mut section = self.write_section();
        let pos = section.position(owner)?;
        let user = &mut section.config.users[pos];

        if user.share(&share.path).is_some() {
            return Err(ShareError::AlreadyExists(format!(
                "share '{}' of {}",
                share.path, user.username
            )));
        }
        share.assign_hash(&user.username);
        if let Some(other) = user.link_conflict(&share) {
            return Err(link_conflict_error(&user.username, &share, other));
        }
        user.shares.push(share.clone());
        user.sort_shares();
        let owner = user.username.clone();

        let report = section.engine(&self.fs).sync_share_add(&share, &owner);
        if report.has_drift() {
            warn!("Share {:?} of {} not mirrored everywhere: {:?}", share.path, owner, report);
        }

        info!("Added share {:?} of {}", share.path, owner);
        Ok(share)
    }

    /// Replace the share of `owner` with the same path and re-mirror it
    pub fn update_share(&self, owner: &str, mut share: ShareItem) -> Result<ShareItem> {
        share.normalize()?;

        let mut section = self.write_section();
        let pos = section.position(owner)?;
        let user = &mut section.config.users[pos];

        let slot = user.share_position(&share.path).ok_or_else(|| {
            ShareError::NotFound(format!("share '{}' of {}", share.path, user.username))
        })?;
        share.assign_hash(&user.username);
        if let Some(other) = user.link_conflict(&share) {
            return Err(link_conflict_error(&user.username, &share, other));
        }
        user.shares[slot] = share.clone();
        let owner = user.username.clone();

        let report = section.engine(&self.fs).sync_share_refresh(&share, &owner);
        if report.has_drift() {
            warn!("Share {:?} of {} not mirrored everywhere: {:?}", share.path, owner, report);
        }

        info!("Updated share {:?} of {}", share.path, owner);
        Ok(share)
    }

    /// Withdraw a share of `owner`; `Ok(false)` if it did not exist
    pub fn delete_share(&self, owner: &str, path: &str) -> Result<bool> {
        let path = normalize_share_path(path)?;

        let mut section = self.write_section();
        let pos = section.position(owner)?;
        let user = &mut section.config.users[pos];

        let Some(slot) = user.share_position(&path) else {
            return Ok(false);
        };
        let removed = user.shares.remove(slot);
        let owner = user.username.clone();

        section.engine(&self.fs).sync_share_remove(&removed, &owner);

        info!("Deleted share {:?} of {}", removed.path, owner);
        Ok(true)
    }

    /// Find the share addressed by an external hash, with its owner
    pub fn resolve_external(&self, hash: &str) -> Result<(ShareItem, UserConfig)> {
        let state = self.state.read();
        state
            .config
            .users
            .iter()
            .find_map(|user| {
                user.shares
                    .iter()
                    .find(|share| share.matches_hash(hash))
                    .map(|share| (share.clone(), user.clone()))
            })
            .ok_or_else(|| ShareError::NotFound(format!("share with hash {}", hash)))
    }

    /// Resolve a public `/{user}/{name}_{hash}/...` URL to its share and owner
    pub fn resolve_external_url(&self, url: &str) -> Result<(ShareItem, UserConfig)> {
        let parsed = ExternalRef::parse(url)
            .ok_or_else(|| ShareError::NotFound(format!("external link {}", url)))?;
        self.resolve_external(parsed.hash)
    }

    /// Public URL of `share`, spelled with the owner's canonical username
    pub fn external_link(&self, owner: &str, share: &ShareItem) -> Result<String> {
        let name = share.symlink_name()?;
        let state = self.state.read();
        let pos = state.position(owner)?;
        Ok(format!(
            "{}/{}/{}",
            state.config.external_share_host.trim_end_matches('/'),
            state.config.users[pos].username,
            name
        ))
    }

    /// Preview cache path for a public share URL
    pub fn share_preview_path(&self, url: &str) -> Option<PathBuf> {
        let parsed = ExternalRef::parse(url)?;
        let (share, owner) = self.resolve_external(parsed.hash).ok()?;
        let layout = self.layout();
        Some(layout.share_preview(&owner.username, &share, parsed.file_name()))
    }

    /// Converge the mirror with the declared shares
    pub fn repair(&self) -> SyncReport {
        let section = self.write_section();
        let report = section.engine(&self.fs).repair();
        if report.has_drift() {
            warn!("Mirror still diverges after repair: {:?}", report);
        }
        report
    }

    /// Replace every setting except the user list
    pub fn update_settings(&self, settings: &GlobalConfig) {
        let mut section = self.write_section();
        section.config.apply_settings(settings);
        pin_files_path(&mut section.config, None);

        let layout = match &self.root_override {
            Some(root) => Layout::new(root.clone()),
            None => section.config.layout(),
        };
        if layout != section.layout {
            info!("Storage root moved to {:?}", layout.files_path());
            section.layout = layout;
            section.engine(&self.fs).repair();
        }
    }

    /// Decoded auth signing key
    pub fn auth_key_bytes(&self) -> Result<Vec<u8>> {
        self.state.read().config.auth_key_bytes()
    }

    pub fn set_auth_key(&self, key: &[u8]) {
        self.write_section().config.set_auth_key(key);
    }
}

/// Make an override root absolute against the cwd
fn pin_root(root: PathBuf) -> PathBuf {
    match std::env::current_dir() {
        Ok(cwd) if root.is_relative() => cwd.join(root),
        _ => root,
    }
}

/// Resolve a relative storage root against the config dir, then the cwd
fn pin_files_path(config: &mut GlobalConfig, config_path: Option<&Path>) {
    if let Some(parent) = config_path.and_then(Path::parent) {
        config.resolve_files_path(parent);
    }
    if let Ok(cwd) = std::env::current_dir() {
        config.resolve_files_path(&cwd);
    }
}
