//! Lookup index over the user list
//!
//! Maps lowercased usernames and client IPs to positions in
//! `GlobalConfig::users`. The index is a pure function of the user list and
//! is rebuilt wholesale after every mutation, never patched in place.

use std::collections::HashMap;
use std::net::SocketAddr;

use tracing::warn;

use fileshare_core::UserConfig;

/// Username and IP lookup table
#[derive(Debug, Clone, Default)]
pub struct UserIndex {
    by_name: HashMap<String, usize>,
    by_ip: HashMap<String, usize>,
}

impl UserIndex {
    /// Build the index for `users`.
    ///
    /// When two users claim the same IP, the earlier user keeps it.
    pub fn build(users: &[UserConfig]) -> Self {
        let mut index = Self::default();

        for (pos, user) in users.iter().enumerate() {
            index
                .by_name
                .entry(user.username.to_ascii_lowercase())
                .or_insert(pos);

            for ip in &user.ip_auth {
                let key = normalize_ip(ip);
                match index.by_ip.get(&key) {
                    Some(&owner) if owner != pos => warn!(
                        "IP {} of {} already belongs to {}",
                        key, user.username, users[owner].username
                    ),
                    Some(_) => {}
                    None => {
                        index.by_ip.insert(key, pos);
                    }
                }
            }
        }

        index
    }

    pub fn position_by_name(&self, name: &str) -> Option<usize> {
        self.by_name.get(&name.to_ascii_lowercase()).copied()
    }

    pub fn position_by_ip(&self, ip: &str) -> Option<usize> {
        self.by_ip.get(&normalize_ip(ip)).copied()
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.position_by_name(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Strip an optional port from a client address (`1.2.3.4:80`, `[::1]:80`)
pub fn normalize_ip(raw: &str) -> String {
    let raw = raw.trim();
    match raw.parse::<SocketAddr>() {
        Ok(addr) => addr.ip().to_string(),
        Err(_) => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str, ips: &[&str]) -> UserConfig {
        let mut user = UserConfig::new(name);
        user.ip_auth = ips.iter().map(|s| s.to_string()).collect();
        user
    }

    #[test]
    fn test_lookup_by_name_case_insensitive() {
        let users = vec![user("Alice", &[]), user("bob", &[])];
        let index = UserIndex::build(&users);

        assert_eq!(index.position_by_name("alice"), Some(0));
        assert_eq!(index.position_by_name("BOB"), Some(1));
        assert_eq!(index.position_by_name("carol"), None);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_lookup_by_ip() {
        let users = vec![user("alice", &["10.0.0.1"]), user("bob", &["10.0.0.2", "::1"])];
        let index = UserIndex::build(&users);

        assert_eq!(index.position_by_ip("10.0.0.1"), Some(0));
        assert_eq!(index.position_by_ip("10.0.0.2:51234"), Some(1));
        assert_eq!(index.position_by_ip("[::1]:8080"), Some(1));
        assert_eq!(index.position_by_ip("10.0.0.3"), None);
    }

    #[test]
    fn test_first_user_keeps_shared_ip() {
        let users = vec![user("alice", &["10.0.0.1"]), user("bob", &["10.0.0.1"])];
        let index = UserIndex::build(&users);
        assert_eq!(index.position_by_ip("10.0.0.1"), Some(0));
    }

    #[test]
    fn test_normalize_ip() {
        assert_eq!(normalize_ip("192.168.1.5:443"), "192.168.1.5");
        assert_eq!(normalize_ip(" 192.168.1.5 "), "192.168.1.5");
        assert_eq!(normalize_ip("fe80::1"), "fe80::1");
    }
}
