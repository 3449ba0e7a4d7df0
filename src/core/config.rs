//! Configuration structures and types for scm-agent
//!
//! This module provides type-safe configuration management with serde support.

use crate::command::Verbosity;
use crate::core::traits::{Identity, Proxy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// Schema version
    #[serde(default = "default_version")]
    pub version: String,

    /// Root directory for tool homes, SSH keys and credential files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,

    /// Command reporting verbosity (default: default)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verbosity: Option<Verbosity>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub git: Option<GitConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub svn: Option<SvnConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh: Option<SshConfig>,

    /// Boolean feature flags (e.g. `git.insecure.enabled`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings: Option<HashMap<String, bool>>,

    /// Identities served by the local host
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identities: Option<Vec<IdentityConfig>>,

    /// Proxies served by the local host
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxies: Option<Vec<Proxy>>,

    /// Directory receiving attached output files (local host)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_dir: Option<PathBuf>,
}

fn default_version() -> String {
    "1.0".to_string()
}

/// Git driver configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GitConfig {
    /// Path to the git executable
    pub binary: PathBuf,
    /// Committer name written to `.gitconfig`
    pub user_name: String,
    /// Committer email written to `.gitconfig`
    pub user_email: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("git"),
            user_name: "SCM Agent".to_string(),
            user_email: "scm-agent@localhost".to_string(),
        }
    }
}

/// Subversion driver configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SvnConfig {
    /// Path to the svn executable
    pub binary: PathBuf,
    /// Shared home; defaults to the work directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home: Option<PathBuf>,
}

impl Default for SvnConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("svn"),
            home: None,
        }
    }
}

/// SSH agent configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SshConfig {
    pub agent_binary: PathBuf,
    pub add_binary: PathBuf,
    /// Directory for the agent socket
    pub socket_dir: PathBuf,
    /// Bound on key registration (milliseconds)
    pub key_timeout_ms: u64,
}

impl SshConfig {
    pub fn key_timeout(&self) -> Duration {
        Duration::from_millis(self.key_timeout_ms)
    }
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            agent_binary: PathBuf::from("ssh-agent"),
            add_binary: PathBuf::from("ssh-add"),
            socket_dir: std::env::temp_dir(),
            key_timeout_ms: 1000,
        }
    }
}

/// Identity as written in the configuration file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct IdentityConfig {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub user: String,
    /// Password; `${VAR}` references are expanded at load time
    #[serde(default)]
    pub password: String,
    /// PEM encoded private key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl IdentityConfig {
    pub fn to_identity(&self) -> Identity {
        let identity =
            Identity::new(self.id, self.name.clone()).with_basic_auth(&self.user, &self.password);
        match &self.key {
            Some(key) => identity.with_key(key),
            None => identity,
        }
    }
}

impl AgentConfig {
    pub fn work_dir(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity.unwrap_or_default()
    }

    pub fn git(&self) -> GitConfig {
        self.git.clone().unwrap_or_default()
    }

    pub fn svn(&self) -> SvnConfig {
        self.svn.clone().unwrap_or_default()
    }

    pub fn ssh(&self) -> SshConfig {
        self.ssh.clone().unwrap_or_default()
    }

    /// Shared Subversion home
    pub fn svn_home(&self) -> PathBuf {
        self.svn().home.unwrap_or_else(|| self.work_dir())
    }

    pub fn attachment_dir(&self) -> PathBuf {
        self.attachment_dir
            .clone()
            .unwrap_or_else(|| self.work_dir().join(".attachments"))
    }

    pub fn setting(&self, key: &str) -> bool {
        self.settings
            .as_ref()
            .and_then(|s| s.get(key).copied())
            .unwrap_or(false)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            work_dir: None,
            verbosity: None,
            git: None,
            svn: None,
            ssh: None,
            settings: None,
            identities: None,
            proxies: None,
            attachment_dir: None,
        }
    }
}
