//! Core traits and types for SCM automation
//!
//! This module defines the data model shared by the drivers (remotes,
//! identities, proxies), the [`Scm`] driver contract and the [`Host`]
//! contract through which the agent talks to the task runner that hosts it.

use crate::core::error::ScmError;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

// ============================================================================
// Remote
// ============================================================================

/// Version control tool behind a remote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteKind {
    #[default]
    Git,
    Subversion,
}

impl RemoteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteKind::Git => "git",
            RemoteKind::Subversion => "subversion",
        }
    }
}

impl fmt::Display for RemoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RemoteKind {
    type Err = ScmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "git" | "" => Ok(RemoteKind::Git),
            "subversion" | "svn" => Ok(RemoteKind::Subversion),
            other => Err(ScmError::InvalidOption(format!("remote kind: {other}"))),
        }
    }
}

/// Where to fetch from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remote {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Sub-path inside the repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub kind: RemoteKind,
}

impl Remote {
    pub fn new(url: impl Into<String>, kind: RemoteKind) -> Self {
        Self {
            url: url.into(),
            kind,
            ..Default::default()
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        let branch = branch.into();
        self.branch = if branch.is_empty() { None } else { Some(branch) };
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.path = if path.is_empty() { None } else { Some(path) };
        self
    }
}

// ============================================================================
// Identity
// ============================================================================

/// Credentials resolved from the host.
///
/// Drivers keep their own copy; nothing here refers back to the host.
pub struct Identity {
    pub id: u64,
    pub name: String,
    pub user: String,
    pub password: SecretString,
    /// PEM encoded private key
    pub key: Option<SecretString>,
}

impl Identity {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_basic_auth(mut self, user: impl Into<String>, password: &str) -> Self {
        self.user = user.into();
        self.password = SecretString::new(password.into());
        self
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.key = if key.is_empty() {
            None
        } else {
            Some(SecretString::new(key.into()))
        };
        self
    }

    /// True when both user and password are set.
    pub fn has_basic_auth(&self) -> bool {
        !self.user.is_empty() && !self.password.expose_secret().is_empty()
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            id: 0,
            name: String::new(),
            user: String::new(),
            password: SecretString::new("".into()),
            key: None,
        }
    }
}

impl Clone for Identity {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            user: self.user.clone(),
            password: SecretString::new(self.password.expose_secret().into()),
            key: self
                .key
                .as_ref()
                .map(|k| SecretString::new(k.expose_secret().into())),
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("key", &self.key.is_some())
            .finish_non_exhaustive()
    }
}

/// Credential binding passed to [`Scm::use_credential`]
#[derive(Debug, Clone)]
pub enum Credential {
    /// Reference resolved through [`Host::identity`]
    Ref(u64),
    Identity(Identity),
}

// ============================================================================
// Proxy
// ============================================================================

/// Transport a proxy applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyKind {
    Http,
    Https,
}

impl fmt::Display for ProxyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyKind::Http => f.write_str("http"),
            ProxyKind::Https => f.write_str("https"),
        }
    }
}

/// Proxy definition as returned by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proxy {
    pub id: u64,
    pub kind: ProxyKind,
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub excluded: Vec<String>,
    /// Identity reference used for proxy basic auth
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<u64>,
}

impl Proxy {
    pub fn is_excluded(&self, host: &str) -> bool {
        self.excluded.iter().any(|h| h == host)
    }
}

// ============================================================================
// Attachments
// ============================================================================

/// Handle on a remote log file created by [`Host::touch`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub id: String,
    pub name: String,
}

// ============================================================================
// Host Trait
// ============================================================================

/// Services provided by the task runner hosting the agent
#[async_trait]
pub trait Host: Send + Sync {
    /// Append a line to the task activity log
    fn activity(&self, message: &str);

    /// Resolve an identity reference
    async fn identity(&self, id: u64) -> Result<Identity, ScmError>;

    /// Find the proxy for a transport, `None` when not defined
    async fn find_proxy(&self, kind: ProxyKind) -> Result<Option<Proxy>, ScmError>;

    /// Read a boolean setting such as `git.insecure.enabled`
    fn setting_bool(&self, key: &str) -> Result<bool, ScmError>;

    /// Create a remote file
    async fn touch(&self, name: &str) -> Result<FileRef, ScmError>;

    /// Append bytes to a remote file
    async fn patch(&self, file: &FileRef, bytes: &[u8]) -> Result<(), ScmError>;

    /// Associate a remote file with the current task
    async fn attach(&self, file: &FileRef) -> Result<(), ScmError>;
}

// ============================================================================
// SCM Driver Trait
// ============================================================================

/// Contract implemented by the Git and Subversion drivers
#[async_trait]
pub trait Scm: Send + Sync {
    fn kind(&self) -> RemoteKind;

    /// Effective remote URL
    fn url(&self) -> String;

    /// Working copy path
    fn path(&self) -> &Path;

    /// Reject insecure transports unless the insecure setting is enabled.
    fn validate(&self) -> Result<(), ScmError>;

    /// Replace the working copy with a fresh checkout of the remote.
    async fn fetch(&mut self) -> Result<(), ScmError>;

    /// Switch to `reference`, creating it when missing.
    async fn branch(&mut self, reference: &str) -> Result<(), ScmError>;

    /// Record `files` and publish them to the remote.
    async fn commit(&mut self, files: &[String], message: &str) -> Result<(), ScmError>;

    /// Current revision identifier
    async fn head(&self) -> Result<String, ScmError>;

    /// Bind the credential used by later operations
    async fn use_credential(&mut self, credential: Credential) -> Result<(), ScmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_kind_parse() {
        assert_eq!("git".parse::<RemoteKind>().unwrap(), RemoteKind::Git);
        assert_eq!(
            "subversion".parse::<RemoteKind>().unwrap(),
            RemoteKind::Subversion
        );
        assert_eq!("svn".parse::<RemoteKind>().unwrap(), RemoteKind::Subversion);
        assert!("hg".parse::<RemoteKind>().is_err());
    }

    #[test]
    fn test_remote_builder_drops_empty_values() {
        let remote = Remote::new("https://x/repo", RemoteKind::Subversion)
            .with_branch("")
            .with_path("");

        assert!(remote.branch.is_none());
        assert!(remote.path.is_none());

        let remote = remote.with_branch("dev");
        assert_eq!(remote.branch.as_deref(), Some("dev"));
    }

    #[test]
    fn test_remote_deserialize_defaults_to_git() {
        let remote: Remote = serde_json::from_str(r#"{"url":"https://x/r.git"}"#).unwrap();
        assert_eq!(remote.kind, RemoteKind::Git);
        assert!(remote.branch.is_none());
    }

    #[test]
    fn test_identity_clone_is_a_copy() {
        let identity = Identity::new(3, "deploy")
            .with_basic_auth("bob", "secret")
            .with_key("-----BEGIN KEY-----");
        let copy = identity.clone();

        assert_eq!(copy.id, 3);
        assert_eq!(copy.password.expose_secret(), "secret");
        assert!(copy.key.is_some());
        assert!(copy.has_basic_auth());
    }

    #[test]
    fn test_identity_debug_hides_secrets() {
        let identity = Identity::new(1, "ci").with_basic_auth("alice", "hunter2");
        let debug = format!("{:?}", identity);

        assert!(debug.contains("alice"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_proxy_exclusion() {
        let proxy: Proxy = serde_json::from_str(
            r#"{"id":1,"kind":"https","host":"proxy","port":3128,"enabled":true,"excluded":["github.com"]}"#,
        )
        .unwrap();

        assert!(proxy.is_excluded("github.com"));
        assert!(!proxy.is_excluded("gitlab.com"));
        assert_eq!(proxy.kind.to_string(), "https");
    }
}
