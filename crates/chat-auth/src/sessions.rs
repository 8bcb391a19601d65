//! Session token registry
//!
//! Ordered, duplicate-free list of session tokens with a current index,
//! persisted to a newline-delimited file. Every mutation builds the new list,
//! writes it with an atomic temp-file + rename, and only then swaps it into
//! memory under the write lock, so readers see either the old list or the new
//! one, never a mix.
//!
//! The current index always stays within `[0, len)`; when the list is
//! replaced or shrinks the index resets to 0. Switching sessions drops the
//! cached profile of the previous one.

use std::path::{Path, PathBuf};

use common::{InputFile, fingerprint};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Position of the current session within the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TokenInfo {
    pub current_index: usize,
    pub total: usize,
    pub has_multiple: bool,
}

#[derive(Default)]
struct Sessions {
    tokens: Vec<String>,
    current: usize,
    loaded: bool,
    profile: Option<serde_json::Value>,
}

impl Sessions {
    fn switch_to(&mut self, index: usize) {
        if index != self.current {
            self.profile = None;
        }
        self.current = index;
    }
}

/// Registry of known session tokens.
pub struct SessionRegistry {
    path: Option<PathBuf>,
    state: RwLock<Sessions>,
}

impl SessionRegistry {
    /// Registry persisted to `path`, loaded on first access.
    pub fn from_file(path: PathBuf) -> Self {
        Self {
            path: Some(path),
            state: RwLock::new(Sessions::default()),
        }
    }

    /// Registry that lives only in memory.
    pub fn in_memory(tokens: Vec<String>) -> Self {
        let mut unique: Vec<String> = Vec::with_capacity(tokens.len());
        for token in tokens {
            if !unique.contains(&token) {
                unique.push(token);
            }
        }
        Self {
            path: None,
            state: RwLock::new(Sessions {
                tokens: unique,
                loaded: true,
                ..Sessions::default()
            }),
        }
    }

    /// Snapshot of all tokens in order.
    pub async fn tokens(&self) -> Vec<String> {
        self.load_if_needed().await;
        self.state.read().await.tokens.clone()
    }

    /// The current session token, if any.
    pub async fn current(&self) -> Option<String> {
        self.load_if_needed().await;
        let state = self.state.read().await;
        state.tokens.get(state.current).cloned()
    }

    /// Rotate to the next token (cyclic), dropping the cached profile.
    pub async fn advance(&self) -> Option<String> {
        self.load_if_needed().await;
        let mut state = self.state.write().await;
        if state.tokens.is_empty() {
            return None;
        }
        let next = (state.current + 1) % state.tokens.len();
        state.switch_to(next);
        // A single token "switches" to itself; the profile is still stale.
        state.profile = None;
        let token = state.tokens[next].clone();
        info!(
            account = next + 1,
            total = state.tokens.len(),
            token = %fingerprint(&token),
            "switched session token"
        );
        Some(token)
    }

    /// Add a token if not present and persist. Returns whether it was added.
    pub async fn append(&self, token: String) -> Result<bool> {
        let mut state = self.state.write().await;
        self.ensure_loaded(&mut state).await?;
        if state.tokens.contains(&token) {
            debug!(token = %fingerprint(&token), "session token already registered");
            return Ok(false);
        }
        let mut next = state.tokens.clone();
        next.push(token);
        self.persist(&next).await?;
        state.tokens = next;
        info!(total = state.tokens.len(), "session token appended");
        Ok(true)
    }

    /// Register `token` (if new) and make it the current session.
    ///
    /// Returns its index.
    pub async fn activate(&self, token: String) -> Result<usize> {
        let mut state = self.state.write().await;
        self.ensure_loaded(&mut state).await?;
        let index = match state.tokens.iter().position(|t| *t == token) {
            Some(index) => index,
            None => {
                let mut next = state.tokens.clone();
                next.push(token.clone());
                self.persist(&next).await?;
                state.tokens = next;
                state.tokens.len() - 1
            }
        };
        state.switch_to(index);
        debug!(
            account = index + 1,
            total = state.tokens.len(),
            token = %fingerprint(&token),
            "session activated"
        );
        Ok(index)
    }

    /// Replace the whole registry (after a verification sweep) and persist.
    ///
    /// Duplicates are dropped keeping first occurrence; the current index
    /// resets to 0.
    pub async fn replace_all(&self, tokens: Vec<String>) -> Result<()> {
        let mut next: Vec<String> = Vec::with_capacity(tokens.len());
        for token in tokens {
            if !next.contains(&token) {
                next.push(token);
            }
        }

        let mut state = self.state.write().await;
        self.persist(&next).await?;
        state.tokens = next;
        state.loaded = true;
        state.current = 0;
        state.profile = None;
        info!(total = state.tokens.len(), "session registry replaced");
        Ok(())
    }

    /// Current index, total and whether rotation is possible.
    pub async fn info(&self) -> TokenInfo {
        self.load_if_needed().await;
        let state = self.state.read().await;
        TokenInfo {
            current_index: state.current,
            total: state.tokens.len(),
            has_multiple: state.tokens.len() > 1,
        }
    }

    /// Cached profile for the current session.
    pub async fn cached_profile(&self) -> Option<serde_json::Value> {
        self.state.read().await.profile.clone()
    }

    /// Cache the profile fetched for the current session.
    pub async fn cache_profile(&self, profile: serde_json::Value) {
        self.state.write().await.profile = Some(profile);
    }

    async fn load_if_needed(&self) {
        if self.state.read().await.loaded {
            return;
        }
        let mut state = self.state.write().await;
        if let Err(e) = self.ensure_loaded(&mut state).await {
            warn!(error = %e, "session token file unreadable, treating registry as empty");
        }
    }

    /// Load from disk once. A read failure leaves the registry unloaded so
    /// that writes refuse to clobber a file we could not read.
    async fn ensure_loaded(&self, state: &mut Sessions) -> Result<()> {
        if state.loaded {
            return Ok(());
        }
        let Some(path) = &self.path else {
            state.loaded = true;
            return Ok(());
        };
        let tokens = common::read_lines(InputFile::SessionTokens, path)
            .await
            .map_err(|e| Error::Io(e.to_string()))?;
        let mut unique: Vec<String> = Vec::with_capacity(tokens.len());
        for token in tokens {
            if !unique.contains(&token) {
                unique.push(token);
            }
        }
        info!(path = %path.display(), tokens = unique.len(), "loaded session tokens");
        state.tokens = unique;
        state.current = 0;
        state.loaded = true;
        Ok(())
    }

    async fn persist(&self, tokens: &[String]) -> Result<()> {
        match &self.path {
            Some(path) => write_atomic(path, tokens).await,
            None => Ok(()),
        }
    }
}

/// Write tokens to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. File permissions are 0600 since the file holds bearer tokens.
async fn write_atomic(path: &Path, tokens: &[String]) -> Result<()> {
    let mut contents = tokens.join("\n");
    if !tokens.is_empty() {
        contents.push('\n');
    }

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let tmp_path = dir.join(format!(".session-tokens.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, contents.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp session token file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting session token file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp session token file: {e}")))?;

    debug!(path = %path.display(), tokens = tokens.len(), "persisted session tokens");
    Ok(())
}
