//! Account identity for the remote chat service
//!
//! Two flat-file backed stores and the raw identity calls:
//!
//! - `CredentialStore`: private keys, cyclic rotation, read once per process
//!   unless reloaded explicitly
//! - `SessionRegistry`: session tokens obtained by signing in, unique by value,
//!   persisted atomically on every change; also caches the profile of the
//!   current session
//! - `signin`: exchange a private key for a session token, fetch a profile
//!
//! Retry, rotation on failure and the verification sweep live one layer up in
//! `session-engine`; this crate performs single calls only.

pub mod constants;
pub mod credentials;
pub mod error;
pub mod sessions;
pub mod signin;

pub use constants::*;
pub use credentials::{CredentialStore, PrivateKey};
pub use error::{Error, Result};
pub use sessions::{SessionRegistry, TokenInfo};
pub use signin::{fetch_profile, sign_in};
