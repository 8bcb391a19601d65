//! Private key storage
//!
//! Private keys come from a newline-delimited file; the first non-empty line
//! is the first key in rotation order. The file is read lazily on first
//! access and not again unless `reload()` is called. Keys stay wrapped in
//! `Secret` for their whole life in memory.

use std::path::PathBuf;

use common::{InputFile, Secret};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Account credential exchanged for a session token.
pub type PrivateKey = Secret<String>;

struct KeyState {
    keys: Vec<PrivateKey>,
    index: usize,
    loaded: bool,
}

/// Cyclic list of private keys.
///
/// An empty source is not an error here; callers treat `None` from
/// `current_key()` as a fatal precondition for sign-in.
pub struct CredentialStore {
    path: Option<PathBuf>,
    state: Mutex<KeyState>,
}

impl CredentialStore {
    /// Store backed by a key file, read on first access.
    pub fn from_file(path: PathBuf) -> Self {
        Self {
            path: Some(path),
            state: Mutex::new(KeyState {
                keys: Vec::new(),
                index: 0,
                loaded: false,
            }),
        }
    }

    /// Store over a fixed list of keys.
    pub fn from_keys(keys: Vec<String>) -> Self {
        Self {
            path: None,
            state: Mutex::new(KeyState {
                keys: keys.into_iter().map(Secret::new).collect(),
                index: 0,
                loaded: true,
            }),
        }
    }

    /// The active key, or `None` when no keys exist.
    pub async fn current_key(&self) -> Option<PrivateKey> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await;
        state.keys.get(state.index).cloned()
    }

    /// Rotate to the next key (cyclic) and return it.
    pub async fn advance(&self) -> Option<PrivateKey> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await;
        if state.keys.is_empty() {
            return None;
        }
        state.index = (state.index + 1) % state.keys.len();
        info!(
            key_index = state.index + 1,
            total_keys = state.keys.len(),
            "switched private key"
        );
        state.keys.get(state.index).cloned()
    }

    /// Zero-based index of the active key.
    pub async fn current_index(&self) -> usize {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await;
        state.index
    }

    /// Number of keys (loads the file if needed).
    pub async fn len(&self) -> usize {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await;
        state.keys.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Re-read the key file, resetting rotation to the first key.
    ///
    /// Returns the number of keys now loaded.
    pub async fn reload(&self) -> Result<usize> {
        let Some(path) = &self.path else {
            return Ok(self.len().await);
        };
        let keys = common::read_lines(InputFile::PrivateKeys, path)
            .await
            .map_err(|e| Error::Io(e.to_string()))?;
        let mut state = self.state.lock().await;
        state.keys = keys.into_iter().map(Secret::new).collect();
        state.index = 0;
        state.loaded = true;
        info!(path = %path.display(), keys = state.keys.len(), "reloaded private keys");
        Ok(state.keys.len())
    }

    async fn ensure_loaded(&self, state: &mut KeyState) {
        if state.loaded {
            return;
        }
        state.loaded = true;
        state.index = 0;
        let Some(path) = &self.path else {
            return;
        };
        match common::read_lines(InputFile::PrivateKeys, path).await {
            Ok(keys) if keys.is_empty() => {
                warn!(path = %path.display(), "no private keys found");
            }
            Ok(keys) => {
                state.keys = keys.into_iter().map(Secret::new).collect();
                info!(path = %path.display(), keys = state.keys.len(), "loaded private keys");
            }
            Err(e) => {
                warn!(error = %e, "failed to load private keys");
            }
        }
    }
}
