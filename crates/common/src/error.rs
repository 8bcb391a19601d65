//! Errors raised while reading the service's inputs

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// The on-disk inputs the service reads at startup or on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFile {
    Config,
    PrivateKeys,
    SessionTokens,
    Proxies,
    GeneratorKey,
}

impl fmt::Display for InputFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InputFile::Config => "config",
            InputFile::PrivateKeys => "private key",
            InputFile::SessionTokens => "session token",
            InputFile::Proxies => "proxy",
            InputFile::GeneratorKey => "generator API key",
        })
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// A setting failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read {kind} file {}: {source}", .path.display())]
    Read {
        kind: InputFile,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config file: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    pub fn read(kind: InputFile, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Read {
            kind,
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
