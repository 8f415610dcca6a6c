//! Message signing and the prioritized key ring
//!
//! A signature is `base64(hex(HMAC-SHA256(key, timestamp)))`. Inbound
//! messages are accepted when any key in the ring verifies them, tried from
//! the highest priority down.

use std::sync::Arc;

use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::sync::RwLock;

use crate::error::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

/// Inbound validation only looks at this many characters of a key
const VALIDATION_KEY_CHARS: usize = 32;

/// Key slots, highest priority first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPriority {
    Member,
    Group,
    User,
    App,
}

impl KeyPriority {
    pub const ALL: [KeyPriority; 4] = [
        KeyPriority::Member,
        KeyPriority::Group,
        KeyPriority::User,
        KeyPriority::App,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// Compute the signature of `timestamp` under `key`
pub fn sign(timestamp: &str, key: &str) -> AppResult<String> {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|e| AppError::Internal(format!("hmac key: {}", e)))?;
    mac.update(timestamp.as_bytes());
    let digest = hex::encode(mac.finalize().into_bytes());
    Ok(base64::engine::general_purpose::STANDARD.encode(digest))
}

/// Constant-time check of `signature` for `timestamp` under `key`
pub fn verify(timestamp: &str, signature: &str, key: &str) -> bool {
    let Ok(hex_digest) = base64::engine::general_purpose::STANDARD.decode(signature.trim()) else {
        return false;
    };
    let Ok(raw) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(key.as_bytes()) else {
        return false;
    };
    mac.update(timestamp.as_bytes());
    mac.verify_slice(&raw).is_ok()
}

fn validation_key(key: &str) -> &str {
    match key.char_indices().nth(VALIDATION_KEY_CHARS) {
        Some((idx, _)) => &key[..idx],
        None => key,
    }
}

/// Keys used to sign outbound requests and validate inbound messages
#[derive(Debug, Clone)]
pub struct KeyRing {
    slots: [Option<String>; 4],
}

impl KeyRing {
    /// A ring holding only the application key
    pub fn new(app_key: impl Into<String>) -> Self {
        let mut ring = Self { slots: Default::default() };
        ring.set(KeyPriority::App, Some(app_key.into()));
        ring
    }

    pub fn set(&mut self, priority: KeyPriority, token: Option<String>) {
        tracing::debug!("setting {:?} key (present: {})", priority, token.is_some());
        self.slots[priority.index()] = token.filter(|t| !t.is_empty());
    }

    pub fn get(&self, priority: KeyPriority) -> Option<&str> {
        self.slots[priority.index()].as_deref()
    }

    /// Drop every session key, keeping the application key
    pub fn clear_session(&mut self) {
        for priority in [KeyPriority::Member, KeyPriority::Group, KeyPriority::User] {
            self.slots[priority.index()] = None;
        }
    }

    /// Highest priority key present
    pub fn outbound(&self) -> Option<(KeyPriority, &str)> {
        KeyPriority::ALL
            .iter()
            .find_map(|p| self.get(*p).map(|k| (*p, k)))
    }

    /// Sign a timestamp with the outbound key
    pub fn sign_outbound(&self, timestamp: &str) -> AppResult<String> {
        let (_, key) = self.outbound().ok_or(AppError::NotAuthenticated)?;
        sign(timestamp, key)
    }

    /// First key, by priority, that verifies the signature
    pub fn validate(&self, timestamp: &str, signature: &str) -> Option<KeyPriority> {
        KeyPriority::ALL.iter().copied().find(|p| {
            self.get(*p)
                .map(|key| verify(timestamp, signature, validation_key(key)))
                .unwrap_or(false)
        })
    }
}

/// Thread-safe shared key ring
pub type SharedKeyRing = Arc<RwLock<KeyRing>>;

#[cfg(test)]
mod tests {
    use super::*;

    const USER_TOKEN: &str = "0123456789abcdef0123456789abcdef-user-tail";

    #[test]
    fn test_sign_verify() {
        let sig = sign("2014-01-01T00:00:00.000", "secret").unwrap();
        assert!(verify("2014-01-01T00:00:00.000", &sig, "secret"));
        assert!(!verify("2014-01-01T00:00:00.001", &sig, "secret"));
        assert!(!verify("2014-01-01T00:00:00.000", &sig, "other"));
        assert!(!verify("2014-01-01T00:00:00.000", "not base64!", "secret"));
    }

    #[test]
    fn test_signature_is_base64_of_hex() {
        let sig = sign("t", "k").unwrap();
        let decoded = base64::engine::general_purpose::STANDARD.decode(sig).unwrap();
        assert_eq!(decoded.len(), 64);
        assert!(decoded.iter().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn test_outbound_prefers_highest_priority() {
        let mut ring = KeyRing::new("app");
        assert_eq!(ring.outbound(), Some((KeyPriority::App, "app")));

        ring.set(KeyPriority::User, Some("user".into()));
        ring.set(KeyPriority::Group, Some("group".into()));
        assert_eq!(ring.outbound(), Some((KeyPriority::Group, "group")));

        ring.clear_session();
        assert_eq!(ring.outbound(), Some((KeyPriority::App, "app")));
    }

    #[test]
    fn test_validation_truncates_long_keys() {
        let mut ring = KeyRing::new("app");
        ring.set(KeyPriority::User, Some(USER_TOKEN.to_string()));

        let sig = sign("ts", &USER_TOKEN[..32]).unwrap();
        assert_eq!(ring.validate("ts", &sig), Some(KeyPriority::User));

        let app_sig = sign("ts", "app").unwrap();
        assert_eq!(ring.validate("ts", &app_sig), Some(KeyPriority::App));

        let unknown = sign("ts", "stranger").unwrap();
        assert_eq!(ring.validate("ts", &unknown), None);
    }

    #[test]
    fn test_empty_tokens_are_not_stored() {
        let mut ring = KeyRing::new("app");
        ring.set(KeyPriority::Member, Some(String::new()));
        assert_eq!(ring.get(KeyPriority::Member), None);
    }
}
