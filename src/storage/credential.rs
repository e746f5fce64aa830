//! API key persistence.
//!
//! The key is base64-encoded before it is written. This only keeps the value from
//! being stored verbatim; anyone with access to the store can decode it. It is not
//! a security control.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use tracing::{error, info, warn};

use super::kv::KvStore;

pub const CREDENTIAL_KEY: &str = "ui_forge_api_key";

pub fn encode(secret: &str) -> String {
    BASE64_STANDARD.encode(secret.as_bytes())
}

pub fn decode(encoded: &str) -> Option<String> {
    let bytes = BASE64_STANDARD.decode(encoded.trim()).ok()?;
    String::from_utf8(bytes).ok()
}

#[derive(Clone)]
pub struct CredentialStore {
    kv: Arc<dyn KvStore>,
}

impl CredentialStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn save(&self, secret: &str) {
        match self.kv.set(CREDENTIAL_KEY, &encode(secret)) {
            Ok(()) => info!("API key saved to storage"),
            Err(e) => error!(error = %e, "failed to save API key"),
        }
    }

    pub fn get(&self) -> Option<String> {
        let stored = match self.kv.get(CREDENTIAL_KEY) {
            Ok(v) => v?,
            Err(e) => {
                error!(error = %e, "failed to read API key");
                return None;
            }
        };
        let decoded = decode(&stored);
        if decoded.is_none() {
            warn!("stored API key could not be decoded");
        }
        decoded
    }

    pub fn remove(&self) {
        match self.kv.remove(CREDENTIAL_KEY) {
            Ok(()) => info!("API key removed from storage"),
            Err(e) => error!(error = %e, "failed to remove API key"),
        }
    }
}
