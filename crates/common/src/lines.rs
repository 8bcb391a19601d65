//! Newline-delimited input files (private keys, session tokens, proxies)

use std::path::Path;

use crate::error::{Error, InputFile, Result};

/// Split file contents into trimmed, non-empty lines, preserving order.
pub fn parse_lines(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Read a newline-delimited file. A missing file yields an empty list.
pub async fn read_lines(kind: InputFile, path: &Path) -> Result<Vec<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(parse_lines(&contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(Error::read(kind, path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_and_whitespace_are_dropped() {
        let lines = parse_lines("  key-1 \n\n\r\nkey-2\r\n   \nkey-3");
        assert_eq!(lines, vec!["key-1", "key-2", "key-3"]);
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let lines = read_lines(InputFile::Proxies, &dir.path().join("absent.txt"))
            .await
            .unwrap();
        assert!(lines.is_empty());
    }

    #[tokio::test]
    async fn reads_file_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proxies.txt");
        std::fs::write(&path, "http://a:1\n\nhttp://b:2\n").unwrap();
        let lines = read_lines(InputFile::Proxies, &path).await.unwrap();
        assert_eq!(lines, vec!["http://a:1", "http://b:2"]);
    }

    #[tokio::test]
    async fn unreadable_path_reports_input_kind() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be read as a file.
        let err = read_lines(InputFile::PrivateKeys, dir.path())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Read {
                kind: InputFile::PrivateKeys,
                ..
            }
        ));
    }
}
