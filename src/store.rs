//! In-process store for image records and API keys.

use anyhow::Context;
use chrono::{TimeDelta, Utc};
use dashmap::DashMap;
use rand::RngCore;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::models::{ApiKey, Image};

pub struct Store {
    images: Vec<Image>,
    api_keys: DashMap<String, ApiKey>, // key string -> ApiKey
    next_key_id: AtomicI64,
    key_ttl: TimeDelta,
}

impl Store {
    pub fn new(mut images: Vec<Image>, key_ttl: TimeDelta) -> Self {
        images.sort_by_key(|image| image.id);
        Self {
            images,
            api_keys: DashMap::new(),
            next_key_id: AtomicI64::new(1),
            key_ttl,
        }
    }

    pub fn list_images(&self) -> &[Image] {
        &self.images
    }

    pub fn get_image(&self, id: i64) -> Option<&Image> {
        self.images
            .binary_search_by_key(&id, |image| image.id)
            .ok()
            .map(|idx| &self.images[idx])
    }

    /// Issues a new random key that expires after the configured TTL.
    pub fn generate_api_key(&self, name: &str, created_ip: Option<String>) -> ApiKey {
        let now = Utc::now();
        let api_key = ApiKey {
            id: self.next_key_id.fetch_add(1, Ordering::Relaxed),
            key: random_key(),
            name: name.to_string(),
            created_at: now,
            expires_at: now + self.key_ttl,
            last_used: None,
            revoked: false,
            created_ip,
        };

        self.api_keys.insert(api_key.key.clone(), api_key.clone());
        tracing::info!(id = api_key.id, name = %api_key.name, "API key issued");
        api_key
    }

    /// True for a known, unrevoked, unexpired key. Marks the key as used.
    pub fn validate_api_key(&self, key: &str) -> bool {
        let Some(mut api_key) = self.api_keys.get_mut(key) else {
            return false;
        };

        let now = Utc::now();
        if api_key.revoked || now > api_key.expires_at {
            return false;
        }

        api_key.last_used = Some(now);
        true
    }

    // newest first
    pub fn list_api_keys(&self) -> Vec<ApiKey> {
        let mut keys: Vec<ApiKey> = self.api_keys.iter().map(|e| e.value().clone()).collect();
        keys.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        keys
    }

    /// Returns false when no key has this id.
    pub fn revoke_api_key(&self, id: i64) -> bool {
        match self.api_keys.iter_mut().find(|e| e.id == id) {
            Some(mut api_key) => {
                api_key.revoked = true;
                tracing::info!(id, "API key revoked");
                true
            }
            None => false,
        }
    }
}

// 32 random bytes, hex encoded
fn random_key() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn load_images(path: &Path) -> anyhow::Result<Vec<Image>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read images file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse images file {}", path.display()))
}
