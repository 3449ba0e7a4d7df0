//! Git driver
//!
//! Each remote gets its own home directory, named by a hash of the remote
//! URL, holding the `.gitconfig` and `.git-credentials` used by every git
//! command the driver runs.

use crate::command::{Command, Verbosity};
use crate::core::config::GitConfig;
use crate::core::error::ScmError;
use crate::core::fs;
use crate::core::traits::{Credential, Host, Identity, Remote, RemoteKind, Scm};
use crate::repository::proxy;
use crate::repository::url::GitUrl;
use crate::repository::{ScmContext, resolve_credential};
use crate::security::{Agent, ErrorMap, Mask};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{instrument, warn};

pub const INSECURE_SETTING: &str = "git.insecure.enabled";

/// Home directory for a remote: `<work_dir>/.git-homes/<fnv1a32(url) hex>`.
pub fn home_dir(work_dir: &Path, url: &str) -> PathBuf {
    work_dir
        .join(".git-homes")
        .join(format!("{:x}", fnv1a32(url.as_bytes())))
}

fn fnv1a32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0x811c_9dc5, |hash, b| {
        (hash ^ u32::from(*b)).wrapping_mul(0x0100_0193)
    })
}

/// Git repository
pub struct Git {
    remote: Remote,
    path: PathBuf,
    home: PathBuf,
    insecure: bool,
    identity: Identity,
    config: GitConfig,
    verbosity: Verbosity,
    host: Arc<dyn Host>,
    agent: Arc<Agent>,
}

impl Git {
    pub fn new(path: impl Into<PathBuf>, remote: Remote, insecure: bool, ctx: &ScmContext) -> Self {
        Self {
            home: home_dir(&ctx.config.work_dir(), &remote.url),
            path: path.into(),
            remote,
            insecure,
            identity: Identity::default(),
            config: ctx.config.git(),
            verbosity: ctx.config.verbosity(),
            host: ctx.host.clone(),
            agent: ctx.agent.clone(),
        }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn remote(&self) -> &Remote {
        &self.remote
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    fn git(&self) -> Command {
        let mut command = Command::new(&self.config.binary, self.host.clone());
        command
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("HOME", self.home.display().to_string())
            .verbosity(self.verbosity)
            .error_map(ErrorMap::git());
        if let Some((key, value)) = self.agent.env() {
            command.env(key, value);
        }
        command.mask.push_literal(self.identity.password.expose_secret());
        command
    }

    /// git command run inside the working copy.
    fn git_in_path(&self) -> Command {
        let mut command = self.git();
        command.current_dir(&self.path);
        command
    }

    /// `.gitconfig` content.
    pub fn config_content(&self, proxy: Option<&str>) -> String {
        let mut s = String::from("[user]\n");
        s.push_str(&format!("name = {}\n", self.config.user_name));
        s.push_str(&format!("email = {}\n", self.config.user_email));
        s.push_str("[credential]\n");
        s.push_str(&format!(
            "helper = store --file={}\n",
            self.home.join(".git-credentials").display()
        ));
        s.push_str("[http]\n");
        s.push_str(&format!("sslVerify = {}\n", !self.insecure));
        if let Some(proxy) = proxy {
            s.push_str(&format!("proxy = {}\n", proxy));
        }
        s
    }

    /// `.git-credentials` content; `None` without user and password.
    pub fn credentials_content(&self, url: &GitUrl) -> Option<String> {
        if !self.identity.has_basic_auth() {
            return None;
        }
        let entries: Vec<String> = ["https", "http"]
            .iter()
            .map(|scheme| {
                format!(
                    "{}://{}:{}@{}\n",
                    scheme,
                    self.identity.user,
                    self.identity.password.expose_secret(),
                    url.host
                )
            })
            .collect();
        Some(entries.concat())
    }

    pub(crate) async fn write_config(&self, url: &GitUrl) -> Result<(), ScmError> {
        let path = self.home.join(".gitconfig");
        let proxy = proxy::resolve(self.host.as_ref(), url.proxy_kind(), &url.host, "GIT").await?;
        let content = self.config_content(proxy.map(|p| p.git_url()).as_deref());
        fs::write(&path, content.as_bytes(), 0o644).await?;
        self.host
            .activity(&format!("[FILE] Created {}.", path.display()));
        Ok(())
    }

    pub(crate) async fn write_creds(&self, url: &GitUrl) -> Result<(), ScmError> {
        let Some(content) = self.credentials_content(url) else {
            return Ok(());
        };
        let path = self.home.join(".git-credentials");
        fs::write(&path, content.as_bytes(), 0o600).await?;
        self.host
            .activity(&format!("[FILE] Created {}.", path.display()));
        Ok(())
    }

    async fn checkout(&self) -> Result<(), ScmError> {
        let Some(branch) = &self.remote.branch else {
            return Ok(());
        };
        let mut command = self.git_in_path();
        command.args(["checkout", branch.as_str()]);
        command.run().await
    }

    async fn push(&self) -> Result<(), ScmError> {
        let mut command = self.git_in_path();
        command.args(["push", "origin", "HEAD"]);
        command.run().await
    }
}

#[async_trait]
impl Scm for Git {
    fn kind(&self) -> RemoteKind {
        RemoteKind::Git
    }

    fn url(&self) -> String {
        self.remote.url.clone()
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn validate(&self) -> Result<(), ScmError> {
        let url = GitUrl::parse(&self.remote.url)?;
        if url.is_insecure() && !self.insecure {
            return Err(ScmError::InsecureTransport {
                scheme: url.scheme,
                setting: INSECURE_SETTING.to_string(),
            });
        }
        Ok(())
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn fetch(&mut self) -> Result<(), ScmError> {
        let url = GitUrl::parse(&self.remote.url)?;
        let masked = Mask::auth().apply(&url.raw);
        self.host
            .activity(&format!("[GIT] Home (directory): {}", self.home.display()));
        self.host.activity(&format!("[GIT] Cloning: {}", masked));
        // Best effort: clone fails loudly when the directory is unusable.
        if let Err(e) = fs::rmdir(&self.path).await {
            warn!(error = %e, "working copy not removed");
        }
        if self.identity.id != 0 {
            self.host.activity(&format!(
                "[GIT] Using credentials (id={}) {}.",
                self.identity.id, self.identity.name
            ));
        }
        fs::mkdir(&self.home, 0o755).await?;
        self.write_config(&url).await?;
        self.write_creds(&url).await?;
        self.agent.add(&self.identity, &url.host).await?;

        let mut command = self.git();
        command.args(["clone", "--depth", "1"]);
        if let Some(branch) = &self.remote.branch {
            command.arg("--single-branch").args(["--branch", branch.as_str()]);
        }
        command
            .arg(url.raw.clone())
            .arg(self.path.display().to_string());
        command.run().await?;
        self.checkout().await
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn branch(&mut self, reference: &str) -> Result<(), ScmError> {
        let mut command = self.git_in_path();
        command
            .args(["checkout", reference])
            .verbosity(Verbosity::Disabled);
        if command.run().await.is_err() {
            let mut command = self.git_in_path();
            command.args(["checkout", "-b", reference]);
            command.run().await?;
        }
        self.remote.branch = Some(reference.to_string());
        Ok(())
    }

    #[instrument(skip(self, files), fields(path = %self.path.display(), files = files.len()))]
    async fn commit(&mut self, files: &[String], message: &str) -> Result<(), ScmError> {
        if !files.is_empty() {
            let mut command = self.git_in_path();
            command.arg("add").args(files.iter().cloned());
            command.run().await?;
        }
        let mut command = self.git_in_path();
        command.args(["commit", "--allow-empty", "-m", message]);
        command.run().await?;
        self.push().await
    }

    async fn head(&self) -> Result<String, ScmError> {
        let mut command = self.git_in_path();
        command.args(["rev-parse", "HEAD"]);
        command.run().await?;
        let raw = String::from_utf8_lossy(command.raw_output());
        let commit = raw.trim();
        if commit.is_empty() {
            return Err(ScmError::Parse {
                what: "[GIT] rev-parse".to_string(),
                output: command.output(),
            });
        }
        Ok(commit.to_string())
    }

    async fn use_credential(&mut self, credential: Credential) -> Result<(), ScmError> {
        self.identity = resolve_credential(self.host.as_ref(), credential).await?;
        Ok(())
    }
}
