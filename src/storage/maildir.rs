use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{Local, Utc};
use tokio::fs;
use tracing::info;

use super::{Storage, StorageError};

/// Delivers into a single Maildir: each message is written under `tmp/` and
/// renamed into `new/`.
pub struct MaildirStorage {
    root: PathBuf,
    hostname: String,
    sequence: AtomicU64,
}

impl MaildirStorage {
    pub fn new(root: impl Into<PathBuf>, hostname: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            hostname: hostname.into(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn ensure_maildir_structure(&self) -> Result<(), StorageError> {
        for subdir in ["tmp", "new", "cur"] {
            fs::create_dir_all(self.root.join(subdir)).await?;
        }
        Ok(())
    }

    /// `<seconds>.P<pid>Q<sequence>.<host>`; `/` and `:` in the host are
    /// escaped as Maildir readers expect.
    fn unique_name(&self) -> String {
        let host = self.hostname.replace('/', "\\057").replace(':', "\\072");
        format!(
            "{}.P{}Q{}.{}",
            Utc::now().timestamp(),
            std::process::id(),
            self.sequence.fetch_add(1, Ordering::Relaxed),
            host
        )
    }

    fn trace_headers(&self, from: &str, to: &[String]) -> String {
        let first = to.first().map(String::as_str).unwrap_or_default();
        let mut headers = String::new();
        headers.push_str(&format!("Return-Path: <{}>\r\n", from));
        headers.push_str(&format!("X-Original-To: <{}>\r\n", first));
        headers.push_str(&format!("Delivered-To: <{}>\r\n", first));
        headers.push_str(&format!(
            "Received: by {} with ESMTP; {}\r\n",
            self.hostname,
            Local::now().to_rfc2822()
        ));
        headers
    }
}

#[async_trait]
impl Storage for MaildirStorage {
    async fn save(&self, from: &str, to: &[String], message: &[u8]) -> Result<(), StorageError> {
        self.ensure_maildir_structure().await?;

        let mut content = self.trace_headers(from, to).into_bytes();
        content.extend_from_slice(message);

        let name = self.unique_name();
        let tmp_path = self.root.join("tmp").join(&name);
        let new_path = self.root.join("new").join(&name);

        fs::write(&tmp_path, &content).await?;
        fs::rename(&tmp_path, &new_path).await?;

        info!("Stored message from <{}> as {}", from, new_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }

    #[tokio::test]
    async fn test_save_lands_in_new() {
        let dir = tempfile::tempdir().unwrap();
        let storage = MaildirStorage::new(dir.path().join("mail"), "mx.example.com");

        storage
            .save(
                "a@b.com",
                &["c@example.com".to_string(), "d@example.com".to_string()],
                b"Subject: hi\r\n\r\nhello\r\n",
            )
            .await
            .unwrap();

        let root = storage.root();
        assert!(entries(&root.join("tmp")).is_empty());
        assert!(entries(&root.join("cur")).is_empty());
        let delivered = entries(&root.join("new"));
        assert_eq!(delivered.len(), 1);

        let content = std::fs::read_to_string(&delivered[0]).unwrap();
        assert!(content.starts_with("Return-Path: <a@b.com>\r\n"));
        assert!(content.contains("X-Original-To: <c@example.com>\r\n"));
        assert!(content.contains("Delivered-To: <c@example.com>\r\n"));
        assert!(content.contains("Received: by mx.example.com with ESMTP; "));
        assert!(content.ends_with("Subject: hi\r\n\r\nhello\r\n"));
    }

    #[tokio::test]
    async fn test_names_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let storage = MaildirStorage::new(dir.path(), "mx");
        for _ in 0..3 {
            storage
                .save("a@b.com", &["c@d.com".to_string()], b"x\r\n")
                .await
                .unwrap();
        }
        assert_eq!(entries(&dir.path().join("new")).len(), 3);
    }

    #[test]
    fn test_unique_name_escapes_host() {
        let storage = MaildirStorage::new("/tmp/unused", "host:25/a");
        let name = storage.unique_name();
        assert!(name.ends_with(".host\\07225\\057a"));
        assert!(name.contains(&format!(".P{}Q0.", std::process::id())));
    }

    #[tokio::test]
    async fn test_unwritable_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"").unwrap();

        let storage = MaildirStorage::new(&file, "mx");
        let result = storage.save("a@b.com", &["c@d.com".to_string()], b"x\r\n").await;
        assert!(matches!(result, Err(StorageError::Io(_))));
    }
}
