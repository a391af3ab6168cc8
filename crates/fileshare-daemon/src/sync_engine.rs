//! Sync Engine for the share symlink mirror
//!
//! Every consumer sees the shares they are entitled to as symlinks under
//! `{files_path}/{consumer}/shares/{owner}/{name}_{hash}`. The engine keeps
//! that mirror consistent with the declared shares:
//!
//! - `reconcile_one` recomputes one (share, consumer) entry: remove, then
//!   relink if the consumer may see the share and its source exists
//! - `sync_share_add` / `sync_share_refresh` / `sync_share_remove` apply it
//!   to the consumers affected by one share mutation
//! - `repair` runs the same reconciliation over every (share, consumer)
//!   pair and prunes entries no declaration implies
//!
//! Failures are logged per consumer and never abort the other consumers.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use fileshare_core::{Layout, ShareError, ShareItem, UserConfig, Viewer, GUEST};

use crate::fs::ShareFs;

/// Filesystem failures while reconciling one mirror entry
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("cannot create {path:?}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("cannot remove {path:?}: {source}")]
    Remove { path: PathBuf, source: io::Error },

    #[error("cannot link {link:?} -> {target:?}: {source}")]
    Link {
        link: PathBuf,
        target: PathBuf,
        source: io::Error,
    },

    #[error(transparent)]
    Share(#[from] ShareError),
}

/// Outcome of reconciling one (share, consumer) pair
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reconciled {
    /// Consumer owns the share; nothing to mirror
    Owner,
    /// Entry points at the share source
    Linked,
    /// Consumer may not see the share; entry absent
    Revoked,
    /// Share source is missing on disk; entry absent until it reappears
    Drift,
    /// A filesystem operation failed; entry absent
    Failed,
}

/// Counters for one synchronization pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub linked: usize,
    pub revoked: usize,
    pub drift: usize,
    pub failed: usize,
    /// Entries removed for deleted shares
    pub removed: usize,
    /// Stale entries removed by repair
    pub pruned: usize,
}

impl SyncReport {
    pub fn record(&mut self, outcome: Reconciled) {
        match outcome {
            Reconciled::Owner => {}
            Reconciled::Linked => self.linked += 1,
            Reconciled::Revoked => self.revoked += 1,
            Reconciled::Drift => self.drift += 1,
            Reconciled::Failed => self.failed += 1,
        }
    }

    pub fn merge(&mut self, other: SyncReport) {
        self.linked += other.linked;
        self.revoked += other.revoked;
        self.drift += other.drift;
        self.failed += other.failed;
        self.removed += other.removed;
        self.pruned += other.pruned;
    }

    /// Whether the mirror diverges from the declarations after this pass
    pub fn has_drift(&self) -> bool {
        self.drift > 0 || self.failed > 0
    }
}

/// Reconciles the symlink mirror with a declared user list
pub struct SyncEngine<'a, F: ShareFs + ?Sized> {
    fs: &'a F,
    layout: &'a Layout,
    users: &'a [UserConfig],
}

impl<'a, F: ShareFs + ?Sized> SyncEngine<'a, F> {
    pub fn new(fs: &'a F, layout: &'a Layout, users: &'a [UserConfig]) -> Self {
        Self { fs, layout, users }
    }

    fn user(&self, name: &str) -> Option<&'a UserConfig> {
        self.users.iter().find(|u| u.is_named(name))
    }

    /// Classify `name` against the declared users
    pub fn viewer<'n>(&self, name: &'n str) -> Viewer<'n> {
        if name.eq_ignore_ascii_case(GUEST) {
            Viewer::Guest
        } else if self.user(name).is_some() {
            Viewer::Registered(name)
        } else {
            Viewer::Unknown(name)
        }
    }

    /// Users that should see `share`: everyone for local shares, else the allow-list
    fn entitled(&self, share: &ShareItem) -> Vec<&'a UserConfig> {
        if share.allow_local {
            return self.users.iter().collect();
        }

        let mut consumers: Vec<&'a UserConfig> = Vec::new();
        for name in &share.allow_users {
            match self.user(name) {
                Some(user) if !consumers.iter().any(|c| c.is_named(name)) => consumers.push(user),
                Some(_) => {}
                None => debug!("Share {:?} allows unknown user {}", share.path, name),
            }
        }
        consumers
    }

    /// Create mirror entries for every consumer entitled to `share`
    pub fn sync_share_add(&self, share: &ShareItem, owner: &str) -> SyncReport {
        let mut report = SyncReport::default();
        for consumer in self.entitled(share) {
            report.record(self.reconcile_one(share, &consumer.username, owner));
        }
        debug!("Synced share {:?} of {}: {:?}", share.path, owner, report);
        report
    }

    /// Reconcile `share` for every user, revoking entries no longer allowed
    pub fn sync_share_refresh(&self, share: &ShareItem, owner: &str) -> SyncReport {
        let mut report = SyncReport::default();
        for consumer in self.users {
            report.record(self.reconcile_one(share, &consumer.username, owner));
        }
        debug!("Refreshed share {:?} of {}: {:?}", share.path, owner, report);
        report
    }

    /// Remove the mirror entries of `share` from every other user.
    ///
    /// Uses the share's existing hash; a share without one is skipped.
    pub fn sync_share_remove(&self, share: &ShareItem, owner: &str) -> SyncReport {
        let mut report = SyncReport::default();

        let name = match share.symlink_name() {
            Ok(name) => name,
            Err(e) => {
                warn!("Cannot remove mirror of {:?} owned by {}: {}", share.path, owner, e);
                return report;
            }
        };

        for consumer in self.users.iter().filter(|u| !u.is_named(owner)) {
            let link = self.layout.mirror_dir(&consumer.username, owner).join(&name);
            match self.fs.remove_if_present(&link) {
                Ok(true) => {
                    debug!("Removed mirror entry {:?}", link);
                    report.removed += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!("Cannot remove mirror entry {:?}: {}", link, e);
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Reconcile every other user's shares for one consumer
    pub fn sync_consumer(&self, consumer: &str) -> SyncReport {
        let mut report = SyncReport::default();
        for owner in self.users.iter().filter(|u| !u.is_named(consumer)) {
            for share in &owner.shares {
                report.record(self.reconcile_one(share, consumer, &owner.username));
            }
        }
        report
    }

    /// Recompute the mirror entry of `share` for `consumer`.
    ///
    /// Idempotent: running it twice leaves the same tree as running it once.
    pub fn reconcile_one(&self, share: &ShareItem, consumer: &str, owner: &str) -> Reconciled {
        match self.try_reconcile(share, consumer, owner) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    "Share {:?} of {} not mirrored for {}: {}",
                    share.path, owner, consumer, e
                );
                Reconciled::Failed
            }
        }
    }

    fn try_reconcile(
        &self,
        share: &ShareItem,
        consumer: &str,
        owner: &str,
    ) -> Result<Reconciled, SyncError> {
        if consumer.eq_ignore_ascii_case(owner) {
            return Ok(Reconciled::Owner);
        }

        let name = share.symlink_name()?;
        let dir = self.layout.mirror_dir(consumer, owner);
        let link = dir.join(name);
        let target = self.layout.share_source(owner, share);

        if !share.is_allowed(self.viewer(consumer)) {
            let removed = self
                .fs
                .remove_if_present(&link)
                .map_err(|source| SyncError::Remove {
                    path: link.clone(),
                    source,
                })?;
            if removed {
                debug!("Revoked {:?} for {}", link, consumer);
            }
            return Ok(Reconciled::Revoked);
        }

        self.fs
            .create_dir_all(&dir)
            .map_err(|source| SyncError::CreateDir {
                path: dir.clone(),
                source,
            })?;

        // Never leave a stale link behind, whatever happens next
        self.fs
            .remove_if_present(&link)
            .map_err(|source| SyncError::Remove {
                path: link.clone(),
                source,
            })?;

        if !self.fs.exists(&target) {
            warn!(
                "Drift: source {:?} of share owned by {} is missing, no entry at {:?}",
                target, owner, link
            );
            return Ok(Reconciled::Drift);
        }

        match self.fs.symlink(&target, &link) {
            Ok(()) => {
                debug!("Linked {:?} -> {:?}", link, target);
                Ok(Reconciled::Linked)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(Reconciled::Linked),
            Err(source) => Err(SyncError::Link {
                link,
                target,
                source,
            }),
        }
    }

    /// Create the directories and WebDAV links of one user
    pub fn ensure_user_layout(&self, username: &str) -> Result<(), SyncError> {
        let home = self.layout.home_dir(username);
        let shares = self.layout.shares_dir(username);
        let webdav = self.layout.webdav_dir(username);

        for dir in [&home, &shares, &self.layout.preview_dir(username), &webdav] {
            self.fs
                .create_dir_all(dir)
                .map_err(|source| SyncError::CreateDir {
                    path: dir.clone(),
                    source,
                })?;
        }

        self.ensure_link(&home, &webdav.join(fileshare_core::HOME_DIR))?;
        self.ensure_link(&shares, &webdav.join(fileshare_core::SHARES_DIR))?;
        Ok(())
    }

    /// Make `link` a working symlink to `target`, replacing broken or foreign links
    fn ensure_link(&self, target: &Path, link: &Path) -> Result<(), SyncError> {
        if self.fs.is_symlink(link) {
            let current = self.fs.read_link(link).ok();
            if current.as_deref() == Some(target) && self.fs.exists(link) {
                return Ok(());
            }
            info!("Replacing broken link {:?} (was {:?})", link, current);
        }

        self.fs
            .remove_if_present(link)
            .map_err(|source| SyncError::Remove {
                path: link.to_path_buf(),
                source,
            })?;

        match self.fs.symlink(target, link) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
            Err(source) => Err(SyncError::Link {
                link: link.to_path_buf(),
                target: target.to_path_buf(),
                source,
            }),
        }
    }

    /// Converge the whole mirror to the declared users and shares
    pub fn repair(&self) -> SyncReport {
        let mut report = SyncReport::default();

        for user in self.users {
            if let Err(e) = self.ensure_user_layout(&user.username) {
                warn!("Cannot prepare directories of {}: {}", user.username, e);
                report.failed += 1;
            }
        }

        for consumer in self.users {
            report.merge(self.sync_consumer(&consumer.username));
            report.pruned += self.prune_consumer(&consumer.username);
        }

        info!(
            "Repair finished: {} linked, {} revoked, {} drifted, {} failed, {} pruned",
            report.linked, report.revoked, report.drift, report.failed, report.pruned
        );
        report
    }

    /// Remove mirror links of `consumer` that no declared share produces
    fn prune_consumer(&self, consumer: &str) -> usize {
        let shares_dir = self.layout.shares_dir(consumer);
        let owner_dirs = match self.fs.read_dir(&shares_dir) {
            Ok(dirs) => dirs,
            Err(e) => {
                debug!("Cannot list {:?}: {}", shares_dir, e);
                return 0;
            }
        };

        let mut pruned = 0;
        for owner_dir in owner_dirs {
            let dir = shares_dir.join(&owner_dir);
            let owner = self
                .users
                .iter()
                .find(|u| u.username == owner_dir && !u.is_named(consumer));
            let declared: HashSet<String> = owner
                .map(|o| o.shares.iter().filter_map(|s| s.symlink_name().ok()).collect())
                .unwrap_or_default();

            let entries = match self.fs.read_dir(&dir) {
                Ok(entries) => entries,
                Err(_) => continue,
            };

            for entry in entries.iter().filter(|e| !declared.contains(*e)) {
                let path = dir.join(entry);
                if !self.fs.is_symlink(&path) {
                    warn!("Leaving unexpected non-link entry {:?}", path);
                    continue;
                }
                match self.fs.remove_if_present(&path) {
                    Ok(true) => {
                        info!("Pruned stale mirror entry {:?}", path);
                        pruned += 1;
                    }
                    Ok(false) => {}
                    Err(e) => warn!("Cannot prune {:?}: {}", path, e),
                }
            }

            if owner.is_none() {
                // Empty directory of a deleted owner
                let _ = self.fs.remove_entry(&dir);
            }
        }
        pruned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memfs::MemoryFs;

    const ROOT: &str = "/srv/files";

    fn layout() -> Layout {
        Layout::new(ROOT)
    }

    fn user(name: &str) -> UserConfig {
        UserConfig::new(name)
    }

    fn share(path: &str, owner: &str) -> ShareItem {
        let mut share = ShareItem::new(path);
        share.assign_hash(owner);
        share
    }

    /// alice shares docs/reports with bob; carol is a bystander
    fn fixture() -> (MemoryFs, Vec<UserConfig>) {
        let fs = MemoryFs::new();
        let layout = layout();
        fs.write_file(&layout.home_dir("alice").join("docs/reports/q1.pdf"))
            .unwrap();

        let mut reports = share("docs/reports", "alice");
        reports.allow_users = vec!["bob".into()];

        let mut alice = user("alice");
        alice.shares = vec![reports];

        (fs, vec![alice, user("bob"), user("carol")])
    }

    fn entry(consumer: &str, owner: &str, share: &ShareItem) -> PathBuf {
        layout().mirror_entry(consumer, owner, share).unwrap()
    }

    #[test]
    fn test_share_with_one_user() {
        let (fs, users) = fixture();
        let layout = layout();
        let engine = SyncEngine::new(&fs, &layout, &users);
        let reports = &users[0].shares[0];

        let report = engine.sync_share_add(reports, "alice");
        assert_eq!(report.linked, 1);

        let link = entry("bob", "alice", reports);
        assert_eq!(
            fs.symlink_target(&link),
            Some(layout.home_dir("alice").join("docs/reports"))
        );
        assert!(fs.exists(&link.join("q1.pdf")));
        assert!(fs.symlinks_under(&layout.shares_dir("carol")).is_empty());
        assert!(fs.symlinks_under(&layout.shares_dir("alice")).is_empty());
    }

    #[test]
    fn test_allow_local_reaches_everyone() {
        let (fs, mut users) = fixture();
        let layout = layout();
        users[0].shares[0].allow_local = true;
        users[0].shares[0].allow_users.clear();

        let engine = SyncEngine::new(&fs, &layout, &users);
        let reports = &users[0].shares[0];
        engine.sync_share_add(reports, "alice");

        assert!(fs.is_symlink(&entry("bob", "alice", reports)));
        assert!(fs.is_symlink(&entry("carol", "alice", reports)));
        // Local sharing does not open the external link
        assert!(!reports.is_allowed(engine.viewer(GUEST)));
    }

    #[test]
    fn test_remove_share() {
        let (fs, mut users) = fixture();
        let layout = layout();
        {
            let engine = SyncEngine::new(&fs, &layout, &users);
            engine.sync_share_add(&users[0].shares[0], "alice");
        }

        let removed = users[0].shares.remove(0);
        let engine = SyncEngine::new(&fs, &layout, &users);
        let report = engine.sync_share_remove(&removed, "alice");
        assert_eq!(report.removed, 1);
        assert!(!fs.is_symlink(&entry("bob", "alice", &removed)));

        // Nothing left to recreate
        let report = engine.repair();
        assert_eq!(report.linked, 0);
        assert!(fs.symlinks_under(&layout.shares_dir("bob")).is_empty());
    }

    #[test]
    fn test_missing_source_is_drift() {
        let (fs, users) = fixture();
        let layout = layout();
        let engine = SyncEngine::new(&fs, &layout, &users);
        let reports = &users[0].shares[0];

        engine.sync_share_add(reports, "alice");
        fs.remove_all(&layout.home_dir("alice").join("docs/reports"));

        assert_eq!(engine.reconcile_one(reports, "bob", "alice"), Reconciled::Drift);
        // No dangling link is left behind
        assert_eq!(fs.node(&entry("bob", "alice", reports)), None);

        // Self-heals once the source is back
        fs.create_dir_all(&layout.home_dir("alice").join("docs/reports"))
            .unwrap();
        let report = engine.repair();
        assert_eq!(report.linked, 1);
        assert!(fs.exists(&entry("bob", "alice", reports)));
    }

    #[test]
    fn test_reconcile_idempotent() {
        let (fs, users) = fixture();
        let layout = layout();
        let engine = SyncEngine::new(&fs, &layout, &users);
        let reports = &users[0].shares[0];

        assert_eq!(engine.reconcile_one(reports, "bob", "alice"), Reconciled::Linked);
        let first = fs.snapshot();
        assert_eq!(engine.reconcile_one(reports, "bob", "alice"), Reconciled::Linked);
        assert_eq!(fs.snapshot(), first);

        assert_eq!(engine.reconcile_one(reports, "carol", "alice"), Reconciled::Revoked);
        let first = fs.snapshot();
        assert_eq!(engine.reconcile_one(reports, "carol", "alice"), Reconciled::Revoked);
        assert_eq!(fs.snapshot(), first);
    }

    #[test]
    fn test_owner_is_skipped() {
        let (fs, users) = fixture();
        let layout = layout();
        let engine = SyncEngine::new(&fs, &layout, &users);

        let outcome = engine.reconcile_one(&users[0].shares[0], "Alice", "alice");
        assert_eq!(outcome, Reconciled::Owner);
        assert!(fs.node(&layout.shares_dir("alice")).is_none());
    }

    #[test]
    fn test_revocation_touches_only_that_user() {
        let (fs, mut users) = fixture();
        let layout = layout();
        fs.create_dir_all(&layout.home_dir("alice").join("music")).unwrap();

        let mut music = share("music", "alice");
        music.allow_users = vec!["bob".into(), "carol".into()];
        users[0].shares[0].allow_users = vec!["bob".into(), "carol".into()];
        users[0].shares.push(music);
        {
            let engine = SyncEngine::new(&fs, &layout, &users);
            for s in &users[0].shares {
                engine.sync_share_add(s, "alice");
            }
        }
        assert_eq!(fs.symlinks_under(&layout.shares_dir("carol")).len(), 2);

        users[0].shares[0].allow_users = vec!["bob".into()];
        let engine = SyncEngine::new(&fs, &layout, &users);
        let report = engine.sync_share_refresh(&users[0].shares[0], "alice");
        assert_eq!(report.linked, 1);
        assert_eq!(report.revoked, 1);

        let reports = &users[0].shares[0];
        assert!(!fs.is_symlink(&entry("carol", "alice", reports)));
        assert!(fs.is_symlink(&entry("bob", "alice", reports)));
        assert!(fs.is_symlink(&entry("carol", "alice", &users[0].shares[1])));
    }

    #[test]
    fn test_partial_failure_is_per_consumer() {
        let (fs, mut users) = fixture();
        let layout = layout();
        users[0].shares[0].allow_users = vec!["bob".into(), "carol".into()];
        fs.fail_on(&layout.shares_dir("carol"));

        let engine = SyncEngine::new(&fs, &layout, &users);
        let report = engine.sync_share_add(&users[0].shares[0], "alice");
        assert_eq!(report.linked, 1);
        assert_eq!(report.failed, 1);
        assert!(report.has_drift());
        assert!(fs.is_symlink(&entry("bob", "alice", &users[0].shares[0])));
    }

    #[test]
    fn test_missing_hash_is_noop() {
        let (fs, mut users) = fixture();
        let layout = layout();
        users[0].shares[0].hash = None;

        let engine = SyncEngine::new(&fs, &layout, &users);
        let before = fs.snapshot();
        assert_eq!(
            engine.reconcile_one(&users[0].shares[0], "bob", "alice"),
            Reconciled::Failed
        );
        assert_eq!(engine.sync_share_remove(&users[0].shares[0], "alice"), SyncReport::default());
        assert_eq!(fs.snapshot(), before);
    }

    #[test]
    fn test_repair_prunes_stale_entries() {
        let (fs, users) = fixture();
        let layout = layout();

        // Leftovers of a share deleted while the process was down
        let gone = share("old", "alice");
        let stale = entry("bob", "alice", &gone);
        fs.create_dir_all(stale.parent().unwrap()).unwrap();
        fs.symlink(&layout.home_dir("alice").join("old"), &stale).unwrap();

        // And of a user that no longer exists
        let ghost = layout.mirror_dir("carol", "dave").join("x_00ff");
        fs.create_dir_all(ghost.parent().unwrap()).unwrap();
        fs.symlink(Path::new("/nowhere"), &ghost).unwrap();

        let engine = SyncEngine::new(&fs, &layout, &users);
        let report = engine.repair();
        assert_eq!(report.pruned, 2);
        assert_eq!(report.linked, 1);
        assert_eq!(fs.node(&stale), None);
        assert_eq!(fs.node(&layout.mirror_dir("carol", "dave")), None);
        assert!(fs.is_symlink(&entry("bob", "alice", &users[0].shares[0])));
    }

    #[test]
    fn test_repair_leaves_real_files() {
        let (fs, users) = fixture();
        let layout = layout();
        let stray = layout.mirror_dir("bob", "alice").join("notes.txt");
        fs.write_file(&stray).unwrap();

        SyncEngine::new(&fs, &layout, &users).repair();
        assert_eq!(fs.node(&stray), Some(crate::memfs::Node::File));
    }

    #[test]
    fn test_repair_matches_incremental_sync() {
        let layout = layout();
        let build = |fs: &MemoryFs| {
            fs.create_dir_all(&layout.home_dir("alice").join("docs")).unwrap();
            fs.create_dir_all(&layout.home_dir("bob").join("pics")).unwrap();

            let mut docs = share("docs", "alice");
            docs.allow_local = true;
            let mut pics = share("pics", "bob");
            pics.allow_users = vec!["carol".into()];

            let mut alice = user("alice");
            alice.shares = vec![docs];
            let mut bob = user("bob");
            bob.shares = vec![pics];
            vec![alice, bob, user("carol")]
        };

        let incremental = MemoryFs::new();
        let users = build(&incremental);
        let engine = SyncEngine::new(&incremental, &layout, &users);
        for u in &users {
            engine.ensure_user_layout(&u.username).unwrap();
        }
        for u in &users {
            for s in &u.shares {
                engine.sync_share_add(s, &u.username);
            }
        }

        let full = MemoryFs::new();
        let users = build(&full);
        SyncEngine::new(&full, &layout, &users).repair();

        assert_eq!(incremental.snapshot(), full.snapshot());
    }

    #[test]
    fn test_ensure_user_layout_fixes_webdav_links() {
        let fs = MemoryFs::new();
        let layout = layout();
        let users = vec![user("alice")];
        let engine = SyncEngine::new(&fs, &layout, &users);

        let files_link = layout.webdav_dir("alice").join("files");
        fs.create_dir_all(&layout.webdav_dir("alice")).unwrap();
        fs.symlink(Path::new("/old/root/alice/files"), &files_link)
            .unwrap();

        engine.ensure_user_layout("alice").unwrap();
        assert_eq!(fs.symlink_target(&files_link), Some(layout.home_dir("alice")));
        assert_eq!(
            fs.symlink_target(&layout.webdav_dir("alice").join("shares")),
            Some(layout.shares_dir("alice"))
        );
        assert!(fs.exists(&layout.preview_dir("alice")));

        let before = fs.snapshot();
        engine.ensure_user_layout("alice").unwrap();
        assert_eq!(fs.snapshot(), before);
    }

    #[cfg(unix)]
    #[test]
    fn test_mirror_on_disk() {
        use crate::fs::OsFs;
        use tempfile::TempDir;

        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path());
        let fs = OsFs::new();

        let source = layout.home_dir("alice").join("docs/reports");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join("q1.txt"), b"numbers").unwrap();

        let mut reports = share("docs/reports", "alice");
        reports.allow_users = vec!["bob".into()];
        let mut alice = user("alice");
        alice.shares = vec![reports];
        let users = vec![alice, user("bob"), user("carol")];

        let engine = SyncEngine::new(&fs, &layout, &users);
        let report = engine.repair();
        assert_eq!(report.linked, 1);

        let link = layout.mirror_entry("bob", "alice", &users[0].shares[0]).unwrap();
        assert_eq!(std::fs::read(link.join("q1.txt")).unwrap(), b"numbers");
        assert_eq!(std::fs::read_link(&link).unwrap(), source);
        assert!(!layout.mirror_dir("carol", "alice").join(link.file_name().unwrap()).exists());

        // The WebDAV root sees the home through its link
        let via_webdav = layout.webdav_dir("alice").join("files/docs/reports/q1.txt");
        assert!(via_webdav.exists());

        // Source removed outside the process
        std::fs::remove_dir_all(&source).unwrap();
        assert_eq!(engine.reconcile_one(&users[0].shares[0], "bob", "alice"), Reconciled::Drift);
        assert!(std::fs::symlink_metadata(&link).is_err());
    }
}
