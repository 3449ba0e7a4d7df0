//! Subversion `auth/svn.simple` credential cache records
//!
//! The cache files use the Subversion hash dump format: each entry is
//! `K <len>\n<key>\nV <len>\n<value>\n` and the dump ends with `END\n`.
//! Lengths are byte lengths of the UTF-8 encoding.

use crate::core::error::ScmError;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One `K`/`V` record.
pub fn encode_record(key: &str, value: &str) -> String {
    format!("K {}\n{}\nV {}\n{}\n", key.len(), key, value.len(), value)
}

/// Records for a plain-text username and password.
pub fn encode_credentials(user: &str, password: &str) -> String {
    let mut s = encode_record("passtype", "simple");
    s.push_str(&encode_record("username", user));
    s.push_str(&encode_record("password", password));
    s
}

/// Prepend the credential records to existing cache content.
pub fn inject(content: &str, user: &str, password: &str) -> String {
    let mut s = encode_credentials(user, password);
    s.push_str(content);
    s
}

/// Value of the first record with `key`, if the content parses that far.
pub fn find(content: &str, key: &str) -> Option<String> {
    let mut rest = content.as_bytes();
    loop {
        let (k, after_key) = read_field(rest, b'K')?;
        let (v, after_value) = read_field(after_key, b'V')?;
        if k == key.as_bytes() {
            return String::from_utf8(v.to_vec()).ok();
        }
        rest = after_value;
    }
}

// Reads `<tag> <len>\n<bytes>\n`, returning the bytes and the remainder.
fn read_field(input: &[u8], tag: u8) -> Option<(&[u8], &[u8])> {
    let newline = input.iter().position(|b| *b == b'\n')?;
    let header = std::str::from_utf8(&input[..newline]).ok()?;
    let len: usize = header
        .strip_prefix(tag as char)?
        .strip_prefix(' ')?
        .parse()
        .ok()?;
    let body = &input[newline + 1..];
    if body.len() < len + 1 || body[len] != b'\n' {
        return None;
    }
    Some((&body[..len], &body[len + 1..]))
}

/// First cache file in `dir`, by name.
pub fn cache_file(dir: &Path) -> Result<PathBuf, ScmError> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
        .into_iter()
        .next()
        .ok_or_else(|| ScmError::CredentialCache {
            path: dir.to_path_buf(),
        })
}

/// Inject credentials into the first cache file in `dir`.
pub async fn write_credentials(dir: &Path, user: &str, password: &str) -> Result<PathBuf, ScmError> {
    let path = cache_file(dir)?;
    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| ScmError::io(&path, e))?;
    tokio::fs::write(&path, inject(&content, user, password))
        .await
        .map_err(|e| ScmError::io(&path, e))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CACHED: &str = "K 15\nsvn:realmstring\nV 39\n<https://svn.local:443> Subversion repo\nEND\n";

    #[test]
    fn test_encode_credentials_exact() {
        assert_eq!(
            encode_credentials("bob", "secret"),
            "K 8\npasstype\nV 6\nsimple\n\
             K 8\nusername\nV 3\nbob\n\
             K 8\npassword\nV 6\nsecret\n"
        );
    }

    #[test]
    fn test_lengths_count_bytes() {
        assert_eq!(encode_record("username", "zoë"), "K 8\nusername\nV 4\nzoë\n");
    }

    #[test]
    fn test_inject_then_find() {
        let content = inject(CACHED, "bob", "p@ss word\twith tabs");

        assert!(content.ends_with(CACHED));
        assert_eq!(find(&content, "passtype").as_deref(), Some("simple"));
        assert_eq!(find(&content, "username").as_deref(), Some("bob"));
        assert_eq!(
            find(&content, "password").as_deref(),
            Some("p@ss word\twith tabs")
        );
        assert_eq!(
            find(&content, "svn:realmstring").as_deref(),
            Some("<https://svn.local:443> Subversion repo")
        );
    }

    #[test]
    fn test_find_multibyte_and_embedded_newline() {
        let content = inject("END\n", "jürgen", "pa\nss");
        assert_eq!(find(&content, "username").as_deref(), Some("jürgen"));
        assert_eq!(find(&content, "password").as_deref(), Some("pa\nss"));
    }

    #[test]
    fn test_find_missing_key() {
        assert!(find(CACHED, "password").is_none());
        assert!(find("garbage", "username").is_none());
    }

    #[test]
    fn test_cache_file_empty_dir() {
        let temp_dir = TempDir::new().unwrap();
        assert!(matches!(
            cache_file(temp_dir.path()),
            Err(ScmError::CredentialCache { .. })
        ));
        assert!(matches!(
            cache_file(&temp_dir.path().join("missing")),
            Err(ScmError::CredentialCache { .. })
        ));
    }

    #[tokio::test]
    async fn test_write_credentials_prepends() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("0a1b2c");
        std::fs::write(&path, CACHED).unwrap();

        let written = write_credentials(temp_dir.path(), "bob", "pw").await.unwrap();

        assert_eq!(written, path);
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, format!("{}{}", encode_credentials("bob", "pw"), CACHED));
    }
}
