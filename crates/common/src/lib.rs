//! Common types shared by the chat automation crates

mod error;
mod lines;
mod secret;

pub use error::{Error, InputFile, Result};
pub use lines::{parse_lines, read_lines};
pub use secret::{Secret, fingerprint};
