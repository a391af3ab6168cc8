//! Configuration document for fileshare
//!
//! The whole server state lives in one JSON document: listener settings,
//! the storage root, and every user with their shares. Share hashes are not
//! part of the document; they are recomputed after loading.
//!
//! Candidate locations, in order:
//! - paths given explicitly (command line)
//! - `./config.json`
//! - the platform config dir (`~/.config/fileshare/config.json` on Linux)
//! - `/etc/fileshare/config.json`

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, ShareError};
use crate::path::{validate_username, Layout};
use crate::types::UserConfig;

/// Config file name used by the default candidate paths
pub const CONFIG_FILE_NAME: &str = "config.json";

/// System-wide config location
pub const SYSTEM_CONFIG_PATH: &str = "/etc/fileshare/config.json";

/// Main configuration document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GlobalConfig {
    /// Users in priority order (the first admin wins)
    pub users: Vec<UserConfig>,
    /// Listener port
    pub port: u16,
    /// Listener address
    pub ip: String,
    /// Log target: "stdout", "stderr", "" (off) or a file path
    pub log: String,
    pub tls_key: String,
    pub tls_cert: String,
    /// Root under which every user's storage lives
    pub files_path: PathBuf,
    pub captcha_config: CaptchaConfig,
    pub auth: AuthConfig,
    pub preview: PreviewConfig,
    /// `http://host:port` used for external links behind a DMZ
    pub external_share_host: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            users: Vec::new(),
            port: 8999,
            ip: "127.0.0.1".into(),
            log: "stdout".into(),
            tls_key: String::new(),
            tls_cert: String::new(),
            files_path: PathBuf::from("files"),
            captcha_config: CaptchaConfig::default(),
            auth: AuthConfig::default(),
            preview: PreviewConfig::default(),
            external_share_host: String::new(),
        }
    }
}

/// Authentication settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// "default" (user + password), "proxy" (trusted header) or "none"
    pub method: String,
    /// Header carrying the username when `method` is "proxy"
    pub header: String,
    /// Hex-encoded signing key
    pub key: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            method: "default".into(),
            header: String::new(),
            key: String::new(),
        }
    }
}

/// reCAPTCHA settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptchaConfig {
    pub host: String,
    pub key: String,
    pub secret: String,
}

/// Preview generator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PreviewConfig {
    /// Script invoked to render previews
    pub script_path: String,
    pub threads: usize,
    #[serde(rename = "previewOnFirstRun")]
    pub first_run: bool,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            script_path: String::new(),
            threads: 2,
            first_run: false,
        }
    }
}

impl GlobalConfig {
    /// Parse a config document
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Load a config document from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config = Self::from_json(&content)?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Load the first candidate that parses.
    ///
    /// Returns the document together with the path it came from, or
    /// `ConfigUnreadable` listing every path tried.
    pub fn load_first(candidates: &[PathBuf]) -> Result<(Self, PathBuf)> {
        for path in candidates {
            match Self::load_from(path) {
                Ok(config) => return Ok((config, path.clone())),
                Err(ShareError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("Config {:?} not found", path);
                }
                Err(e) => warn!("Failed to load config from {:?}: {}", path, e),
            }
        }

        Err(ShareError::ConfigUnreadable {
            tried: candidates.to_vec(),
        })
    }

    /// Save the document to `path`, replacing it atomically
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, path)?;

        debug!("Saved config to {:?}", path);
        Ok(())
    }

    /// Default candidate paths, most specific first
    pub fn default_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(dirs) = ProjectDirs::from("", "", "fileshare") {
            paths.push(dirs.config_dir().join(CONFIG_FILE_NAME));
        }
        paths.push(PathBuf::from(SYSTEM_CONFIG_PATH));
        paths
    }

    /// Generate a sample configuration document
    pub fn sample() -> String {
        let mut config = Self::default();
        let mut admin = UserConfig::new("admin");
        admin.admin = true;
        admin.allow_new = true;
        admin.allow_edit = true;
        admin.locale = "en".into();
        admin.view_mode = "list".into();
        config.users.push(admin);
        serde_json::to_string_pretty(&config).unwrap_or_default()
    }

    /// Make `files_path` absolute, resolving it against `base`.
    ///
    /// Mirror entries are symlinks with absolute targets, so a relative
    /// storage root must be pinned before any link is created.
    pub fn resolve_files_path(&mut self, base: &Path) {
        if self.files_path.is_relative() {
            self.files_path = base.join(&self.files_path);
        }
    }

    /// Drop users with unusable or duplicate names, then normalize every
    /// user's shares, dropping invalid ones
    pub fn normalize(&mut self) {
        let mut seen = HashSet::new();
        self.users.retain(|user| {
            if let Err(e) = validate_username(&user.username) {
                warn!("Dropping user {:?}: {}", user.username, e);
                return false;
            }
            if !seen.insert(user.username.to_ascii_lowercase()) {
                warn!("Dropping duplicate user {:?}", user.username);
                return false;
            }
            true
        });

        for user in &mut self.users {
            user.repair_shares();
        }
    }

    pub fn layout(&self) -> Layout {
        Layout::new(self.files_path.clone())
    }

    /// First user flagged as admin
    pub fn admin(&self) -> Option<&UserConfig> {
        self.users.iter().find(|u| u.admin)
    }

    /// Replace every setting except the user list
    pub fn apply_settings(&mut self, other: &GlobalConfig) {
        self.port = other.port;
        self.ip = other.ip.clone();
        self.log = other.log.clone();
        self.tls_key = other.tls_key.clone();
        self.tls_cert = other.tls_cert.clone();
        self.files_path = other.files_path.clone();
        self.captcha_config = other.captcha_config.clone();
        self.auth = other.auth.clone();
        self.preview = other.preview.clone();
        self.external_share_host = other.external_share_host.clone();
    }

    /// Decoded auth signing key
    pub fn auth_key_bytes(&self) -> Result<Vec<u8>> {
        if self.auth.key.is_empty() {
            return Err(ShareError::EmptyKey);
        }
        hex::decode(&self.auth.key).map_err(|e| ShareError::InvalidKey(e.to_string()))
    }

    pub fn set_auth_key(&mut self, key: &[u8]) {
        self.auth.key = hex::encode(key);
    }
}
