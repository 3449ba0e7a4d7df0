//! Host services backed by the agent configuration and the local disk
//!
//! Identities, proxies and settings come from [`AgentConfig`]. Activity lines
//! are journaled in memory and emitted as `tracing` events on the
//! `activity` target; attached files are written under the attachment
//! directory.

use crate::core::config::AgentConfig;
use crate::core::error::ScmError;
use crate::core::fs;
use crate::core::traits::{FileRef, Host, Identity, Proxy, ProxyKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::io::AsyncWriteExt;
use tracing::info;
use uuid::Uuid;

/// Journaled activity line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Standalone host
pub struct LocalHost {
    config: AgentConfig,
    journal: Mutex<Vec<Activity>>,
    attached: Mutex<Vec<String>>,
}

impl LocalHost {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            journal: Mutex::new(Vec::new()),
            attached: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Activity journal, oldest first.
    pub fn journal(&self) -> Vec<Activity> {
        lock(&self.journal).clone()
    }

    /// Activity messages, oldest first.
    pub fn activities(&self) -> Vec<String> {
        lock(&self.journal)
            .iter()
            .map(|a| a.message.clone())
            .collect()
    }

    /// Ids of attached files.
    pub fn attached(&self) -> Vec<String> {
        lock(&self.attached).clone()
    }

    /// Local path backing a file created by [`Host::touch`].
    pub fn file_path(&self, file: &FileRef) -> Option<PathBuf> {
        if file.id.is_empty() || file.id.contains(['/', '\\']) {
            return None;
        }
        Some(self.config.attachment_dir().join(&file.id))
    }
}

#[async_trait]
impl Host for LocalHost {
    fn activity(&self, message: &str) {
        info!(target: "activity", "{}", message);
        lock(&self.journal).push(Activity {
            at: Utc::now(),
            message: message.to_string(),
        });
    }

    async fn identity(&self, id: u64) -> Result<Identity, ScmError> {
        self.config
            .identities
            .iter()
            .flatten()
            .find(|i| i.id == id)
            .map(|i| i.to_identity())
            .ok_or(ScmError::IdentityNotFound { id })
    }

    async fn find_proxy(&self, kind: ProxyKind) -> Result<Option<Proxy>, ScmError> {
        Ok(self
            .config
            .proxies
            .iter()
            .flatten()
            .find(|p| p.kind == kind)
            .cloned())
    }

    fn setting_bool(&self, key: &str) -> Result<bool, ScmError> {
        Ok(self.config.setting(key))
    }

    async fn touch(&self, name: &str) -> Result<FileRef, ScmError> {
        let dir = self.config.attachment_dir();
        fs::mkdir(&dir, 0o755).await?;
        let file = FileRef {
            id: format!("{}-{}", Utc::now().timestamp_millis(), Uuid::new_v4()),
            name: name.to_string(),
        };
        let path = dir.join(&file.id);
        fs::write(&path, b"", 0o644).await?;
        Ok(file)
    }

    async fn patch(&self, file: &FileRef, bytes: &[u8]) -> Result<(), ScmError> {
        let path = self
            .file_path(file)
            .ok_or_else(|| ScmError::Host(format!("file (id={}) not valid", file.id)))?;
        let mut handle = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .map_err(|e| ScmError::io(&path, e))?;
        handle
            .write_all(bytes)
            .await
            .map_err(|e| ScmError::io(&path, e))
    }

    async fn attach(&self, file: &FileRef) -> Result<(), ScmError> {
        let mut attached = lock(&self.attached);
        if !attached.contains(&file.id) {
            info!(file = %file.name, id = %file.id, "attached");
            attached.push(file.id.clone());
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::IdentityConfig;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn config() -> AgentConfig {
        AgentConfig {
            settings: Some(HashMap::from([("git.insecure.enabled".to_string(), true)])),
            identities: Some(vec![IdentityConfig {
                id: 2,
                name: "ci".to_string(),
                user: "bob".to_string(),
                password: "pw".to_string(),
                key: None,
            }]),
            proxies: Some(vec![Proxy {
                id: 9,
                kind: ProxyKind::Https,
                host: "proxy.local".to_string(),
                port: 3128,
                enabled: true,
                excluded: vec![],
                identity: None,
            }]),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_identity_lookup() {
        let host = LocalHost::new(config());

        let identity = host.identity(2).await.unwrap();
        assert_eq!(identity.user, "bob");
        assert_eq!(identity.password.expose_secret(), "pw");

        assert!(matches!(
            host.identity(3).await.unwrap_err(),
            ScmError::IdentityNotFound { id: 3 }
        ));
    }

    #[tokio::test]
    async fn test_find_proxy_by_kind() {
        let host = LocalHost::new(config());
        assert_eq!(
            host.find_proxy(ProxyKind::Https).await.unwrap().unwrap().id,
            9
        );
        assert!(host.find_proxy(ProxyKind::Http).await.unwrap().is_none());
    }

    #[test]
    fn test_settings() {
        let host = LocalHost::new(config());
        assert!(host.setting_bool("git.insecure.enabled").unwrap());
        assert!(!host.setting_bool("svn.insecure.enabled").unwrap());
    }

    #[test]
    fn test_activity_journal() {
        let host = LocalHost::new(AgentConfig::default());
        host.activity("one");
        host.activity("two");

        assert_eq!(host.activities(), vec!["one", "two"]);
        let journal = host.journal();
        assert!(journal[0].at <= journal[1].at);
    }

    #[tokio::test]
    async fn test_touch_patch_attach() {
        let temp_dir = TempDir::new().unwrap();
        let host = LocalHost::new(AgentConfig {
            attachment_dir: Some(temp_dir.path().join("files")),
            ..Default::default()
        });

        let file = host.touch("git.output").await.unwrap();
        host.patch(&file, b"first\n").await.unwrap();
        host.patch(&file, b"second\n").await.unwrap();
        host.attach(&file).await.unwrap();
        host.attach(&file).await.unwrap();

        let path = host.file_path(&file).unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "first\nsecond\n");
        assert_eq!(host.attached(), vec![file.id.clone()]);
    }

    #[tokio::test]
    async fn test_patch_unknown_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let host = LocalHost::new(AgentConfig {
            attachment_dir: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        });
        let file = FileRef {
            id: "missing".to_string(),
            name: "x".to_string(),
        };
        assert!(matches!(
            host.patch(&file, b"x").await.unwrap_err(),
            ScmError::Io { .. }
        ));
    }
}
