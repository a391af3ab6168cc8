//! Share hash naming
//!
//! Provides:
//! - The addressing token of a share, derived from its owner and path
//! - The mirror entry name `{final segment}_{hash}`
//! - Splitting an inbound URL segment back into name and hash
//!
//! The token is an address, not a secret. It is stable across restarts and
//! storage roots because it only depends on `(owner, path)`.

use blake3::Hasher;

/// Digest bytes kept in a share hash (hex encoded to twice this length)
pub const SHARE_HASH_BYTES: usize = 12;

/// Separator between the share name and its hash in a mirror entry
pub const HASH_SEPARATOR: char = '_';

/// Generate the addressing token for a share.
///
/// Slashes are stripped from `path` before hashing, so `a/bc` and `ab/c`
/// under the same owner share a token. Hex output never contains the
/// `_` separator, which keeps `split_symlink_name` unambiguous.
pub fn generate_share_hash(owner: &str, path: &str) -> String {
    let stripped: String = path.chars().filter(|c| *c != '/').collect();

    let mut hasher = Hasher::new();
    hasher.update(owner.as_bytes());
    hasher.update(&[0]);
    hasher.update(stripped.as_bytes());
    let digest = hasher.finalize();

    hex::encode(&digest.as_bytes()[..SHARE_HASH_BYTES])
}

/// Build the mirror entry name for a share path and its hash
pub fn symlink_name(path: &str, hash: &str) -> String {
    let segment = path.rsplit('/').next().unwrap_or_default();
    format!("{}{}{}", segment, HASH_SEPARATOR, hash)
}

/// Split a mirror entry name (or public URL segment) into `(name, hash)`
pub fn split_symlink_name(segment: &str) -> Option<(&str, &str)> {
    let (name, hash) = segment.rsplit_once(HASH_SEPARATOR)?;
    if hash.is_empty() || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    Some((name, hash))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        let a = generate_share_hash("alice", "docs/reports");
        let b = generate_share_hash("alice", "docs/reports");
        assert_eq!(a, b);
        assert_eq!(a.len(), SHARE_HASH_BYTES * 2);
        assert!(!a.contains(HASH_SEPARATOR));
    }

    #[test]
    fn test_hash_depends_on_owner() {
        assert_ne!(
            generate_share_hash("alice", "docs"),
            generate_share_hash("bob", "docs")
        );
        // The owner/path boundary is part of the digest
        assert_ne!(
            generate_share_hash("ab", "c"),
            generate_share_hash("a", "bc")
        );
    }

    #[test]
    fn test_hash_ignores_slashes() {
        assert_eq!(
            generate_share_hash("alice", "docs/reports"),
            generate_share_hash("alice", "docsreports")
        );
    }

    #[test]
    fn test_symlink_name() {
        assert_eq!(symlink_name("docs/reports", "abc123"), "reports_abc123");
        assert_eq!(symlink_name("photos", "ff00"), "photos_ff00");
        assert_eq!(symlink_name("my_dir", "ff00"), "my_dir_ff00");
    }

    #[test]
    fn test_split_symlink_name() {
        assert_eq!(split_symlink_name("reports_abc123"), Some(("reports", "abc123")));
        assert_eq!(split_symlink_name("my_dir_ff00"), Some(("my_dir", "ff00")));
        assert_eq!(split_symlink_name("reports"), None);
        assert_eq!(split_symlink_name("reports_"), None);
        assert_eq!(split_symlink_name("reports_xyz"), None);
    }
}
