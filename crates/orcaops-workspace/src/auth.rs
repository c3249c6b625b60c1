//! API key issuance and validation (§6 `workspaces/<ws_id>/keys/<key_id>.json`).
//! Keys are hashed with SHA-256, not bcrypt — `ApiKey::hashed_secret`'s doc
//! comment already commits to this; there is no per-request password-hashing
//! cost to pay since the full key (256 bits of random secret) is the thing
//! being hashed, not a human-chosen password.

use chrono::{DateTime, Duration, Utc};
use orcaops_base::{ApiKey, ErrorKind, OrcaError};
use orcaops_util::{Config, Fs};
use rand::RngCore;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

fn key_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^orcaops_(ws_[a-zA-Z0-9]+)_([a-f0-9]+)$").unwrap())
}

fn hash_secret(plain_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plain_key.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_key_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("key_{}", hex::encode(bytes))
}

fn generate_secret() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub struct KeyManager<'a> {
    config: &'a Config,
    fs: Fs,
}

impl<'a> KeyManager<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config, fs: Fs::new() }
    }

    /// Mints a new key. Returns the plain key (shown to the caller exactly
    /// once) alongside the persisted record.
    pub fn generate_key(&self, workspace_id: &str, expires_in_days: Option<i64>) -> Result<(String, ApiKey), OrcaError> {
        let key_id = generate_key_id();
        let plain_key = format!("orcaops_{workspace_id}_{}", generate_secret());
        let api_key = ApiKey {
            key_id,
            workspace_id: workspace_id.to_string(),
            hashed_secret: hash_secret(&plain_key),
            created_at: Utc::now(),
            last_used_at: None,
            expires_at: expires_in_days.map(|days| Utc::now() + Duration::days(days)),
            revoked: false,
        };
        self.persist(&api_key)?;
        Ok((plain_key, api_key))
    }

    /// Validates a plain key presented by a caller. Updates `last_used_at` on
    /// success. Returns `None` for anything malformed, unknown, revoked, or
    /// expired — the caller gets no distinction between those, by design.
    pub fn validate_key(&self, plain_key: &str) -> Option<ApiKey> {
        let captures = key_pattern().captures(plain_key)?;
        let workspace_id = &captures[1];
        let now = Utc::now();

        for mut api_key in self.list_raw(workspace_id) {
            if api_key.revoked {
                continue;
            }
            if api_key.expires_at.map(|exp| exp < now).unwrap_or(false) {
                continue;
            }
            if api_key.hashed_secret == hash_secret(plain_key) {
                api_key.last_used_at = Some(now);
                let _ = self.persist(&api_key);
                return Some(api_key);
            }
        }
        None
    }

    pub fn revoke_key(&self, workspace_id: &str, key_id: &str) -> bool {
        let Some(mut api_key) = self.get(workspace_id, key_id) else {
            return false;
        };
        api_key.revoked = true;
        self.persist(&api_key).is_ok()
    }

    pub fn get(&self, workspace_id: &str, key_id: &str) -> Option<ApiKey> {
        let path = self.keys_dir(workspace_id).join(format!("{key_id}.json"));
        let contents = self.fs.read_to_string(path).ok()?;
        serde_json::from_str(&contents).ok()
    }

    /// Non-revoked keys for a workspace, with `hashed_secret` redacted.
    pub fn list_keys(&self, workspace_id: &str) -> Vec<ApiKey> {
        self.list_raw(workspace_id)
            .into_iter()
            .filter(|k| !k.revoked)
            .map(|mut k| {
                k.hashed_secret = "***REDACTED***".to_string();
                k
            })
            .collect()
    }

    pub fn has_active_keys(&self, workspace_id: &str) -> bool {
        self.list_raw(workspace_id).iter().any(|k| !k.revoked)
    }

    fn list_raw(&self, workspace_id: &str) -> Vec<ApiKey> {
        let dir = self.keys_dir(workspace_id);
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return Vec::new();
        };
        entries
            .flatten()
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "json"))
            .filter_map(|entry| {
                let contents = self.fs.read_to_string(entry.path()).ok()?;
                serde_json::from_str(&contents).ok()
            })
            .collect()
    }

    fn keys_dir(&self, workspace_id: &str) -> std::path::PathBuf {
        self.config.workspace_dir(workspace_id).join("keys")
    }

    fn persist(&self, api_key: &ApiKey) -> Result<(), OrcaError> {
        let path = self.keys_dir(&api_key.workspace_id).join(format!("{}.json", api_key.key_id));
        let body = serde_json::to_vec_pretty(api_key).map_err(|e| OrcaError::new(ErrorKind::PersistenceFailed, e.to_string()))?;
        self.fs.write_atomic(path, &body).map_err(|e| OrcaError::new(ErrorKind::PersistenceFailed, e.to_string()))
    }
}

/// Whether `expires_at` (if set) is in the past relative to `now`. Exposed so
/// callers other than `validate_key` (e.g. a periodic sweep) can reuse the
/// same expiry rule.
pub fn is_expired(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expires_at.map(|exp| exp < now).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_key_validates() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_root(dir.path());
        let manager = KeyManager::new(&config);

        let (plain_key, api_key) = manager.generate_key("ws_abc123", None).unwrap();
        let validated = manager.validate_key(&plain_key).unwrap();
        assert_eq!(validated.key_id, api_key.key_id);
        assert!(validated.last_used_at.is_some());
    }

    #[test]
    fn revoked_key_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_root(dir.path());
        let manager = KeyManager::new(&config);

        let (plain_key, api_key) = manager.generate_key("ws_abc123", None).unwrap();
        assert!(manager.revoke_key("ws_abc123", &api_key.key_id));
        assert!(manager.validate_key(&plain_key).is_none());
    }

    #[test]
    fn expired_key_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_root(dir.path());
        let manager = KeyManager::new(&config);

        let (plain_key, _) = manager.generate_key("ws_abc123", Some(-1)).unwrap();
        assert!(manager.validate_key(&plain_key).is_none());
    }

    #[test]
    fn list_keys_redacts_hash() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_root(dir.path());
        let manager = KeyManager::new(&config);

        manager.generate_key("ws_abc123", None).unwrap();
        let keys = manager.list_keys("ws_abc123");
        assert_eq!(keys[0].hashed_secret, "***REDACTED***");
    }

    #[test]
    fn malformed_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::with_root(dir.path());
        let manager = KeyManager::new(&config);
        assert!(manager.validate_key("not-a-key").is_none());
    }
}
