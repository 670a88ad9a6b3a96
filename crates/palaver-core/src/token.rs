//! Credential token persistence
//!
//! The persisted auth token is a key-value capability: get, set, remove.
//! `FileTokenStore` keeps it in a single file under the data directory,
//! written atomically (temp file, then rename) so it is never left
//! half-written. `MemoryTokenStore` backs tests.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use serde::Deserialize;
use tracing::debug;

use crate::error::{ClientError, ClientResult};

/// Key-value capability for the persisted auth token
pub trait TokenStore: Send + Sync {
    /// Read the persisted token, if any
    fn get(&self) -> Option<String>;
    /// Persist a token, replacing any previous one
    fn set(&self, token: &str) -> ClientResult<()>;
    /// Remove the persisted token; removing an absent token is a no-op
    fn remove(&self) -> ClientResult<()>;
}

/// Token store backed by a file under the data directory
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Create a store persisting to the given path
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self) -> Option<String> {
        let content = fs::read_to_string(&self.path).ok()?;
        let token = content.trim();
        if token.is_empty() {
            None
        } else {
            Some(token.to_string())
        }
    }

    fn set(&self, token: &str) -> ClientResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ClientError::Storage(format!("create {:?}: {}", parent, e)))?;
        }

        // Atomic write: temp file in the same directory, then rename
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, token)
            .map_err(|e| ClientError::Storage(format!("write {:?}: {}", tmp, e)))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| ClientError::Storage(format!("rename to {:?}: {}", self.path, e)))?;
        Ok(())
    }

    fn remove(&self) -> ClientResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ClientError::Storage(format!(
                "remove {:?}: {}",
                self.path, e
            ))),
        }
    }
}

/// In-memory token store for tests
#[derive(Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-loaded with a token
    pub fn with_token(token: &str) -> Self {
        Self {
            token: Mutex::new(Some(token.to_string())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }

    fn set(&self, token: &str) -> ClientResult<()> {
        *self.token.lock().unwrap() = Some(token.to_string());
        Ok(())
    }

    fn remove(&self) -> ClientResult<()> {
        *self.token.lock().unwrap() = None;
        Ok(())
    }
}

#[derive(Deserialize)]
struct Claims {
    exp: Option<i64>,
}

/// Check whether a JWT has expired, judged from its claims segment
///
/// A token that cannot be decoded, or that carries no `exp` claim, is not
/// treated as expired here; the server remains the authority either way.
pub fn token_expired(token: &str) -> bool {
    let Some(claims) = decode_claims(token) else {
        return false;
    };
    let Some(exp) = claims.exp else {
        return false;
    };

    let expired = exp <= Utc::now().timestamp();
    if expired {
        debug!("Persisted token expired at {}", exp);
    }
    expired
}

fn decode_claims(token: &str) -> Option<Claims> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    serde_json::from_slice(&bytes).ok()
}
