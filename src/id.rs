//! Deterministic target identifiers.
//!
//! Derives a stable id from first 6 bytes of SHA-256(url ⧺ group),
//! base64url-encoded without padding, so the same target always maps to
//! the same id across config reloads and restarts.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};

pub fn target_id(url: &str, group: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update(group.as_bytes());
    let digest = hasher.finalize();
    URL_SAFE_NO_PAD.encode(&digest[..6])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_for_same_url_and_group() {
        let a = target_id("https://example.com", "prod");
        let b = target_id("https://example.com", "prod");
        assert_eq!(a, b);
    }

    #[test]
    fn differs_by_group() {
        let a = target_id("https://example.com", "prod");
        let b = target_id("https://example.com", "staging");
        assert_ne!(a, b);
    }

    #[test]
    fn is_eight_chars_for_six_bytes_base64url() {
        let id = target_id("https://example.com", "");
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
