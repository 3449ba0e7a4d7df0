//! Subversion driver
//!
//! All Subversion remotes share one home. The effective checkout URL is
//! recomputed from the remote on every use, so switching branches is
//! reflected immediately.

use crate::command::{Command, Verbosity};
use crate::core::config::SvnConfig;
use crate::core::error::ScmError;
use crate::core::fs;
use crate::core::traits::{Credential, Host, Identity, Remote, RemoteKind, Scm};
use crate::repository::url::SvnUrl;
use crate::repository::{ScmContext, proxy, resolve_credential, svn_auth};
use crate::security::{Agent, ErrorMap, Mask};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use secrecy::ExposeSecret;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{instrument, warn};

pub const INSECURE_SETTING: &str = "svn.insecure.enabled";

lazy_static! {
    /// Revision embedded in `svn info` output.
    static ref REVISION_REGEX: Regex = Regex::new(r"(Revision:\s+)(\d+)").unwrap();
}

/// Revision number from `svn info` output.
pub fn parse_revision(output: &str) -> Option<String> {
    REVISION_REGEX
        .captures(output)
        .map(|caps| caps[2].to_string())
}

/// Subversion repository
pub struct Subversion {
    remote: Remote,
    path: PathBuf,
    home: PathBuf,
    insecure: bool,
    identity: Identity,
    config: SvnConfig,
    verbosity: Verbosity,
    host: Arc<dyn Host>,
    agent: Arc<Agent>,
}

impl Subversion {
    pub fn new(path: impl Into<PathBuf>, remote: Remote, insecure: bool, ctx: &ScmContext) -> Self {
        Self {
            remote,
            path: path.into(),
            home: ctx.config.svn_home(),
            insecure,
            identity: Identity::default(),
            config: ctx.config.svn(),
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

    /// Effective checkout URL.
    pub fn svn_url(&self) -> Result<SvnUrl, ScmError> {
        SvnUrl::new(&self.remote)
    }

    /// Directory holding the checked out sub-path.
    pub fn root(&self) -> PathBuf {
        match self.remote.path.as_deref().map(|p| p.trim_start_matches('/')) {
            Some(sub) if !sub.is_empty() => self.path.join(sub),
            _ => self.path.clone(),
        }
    }

    fn svn(&self) -> Command {
        let mut command = Command::new(&self.config.binary, self.host.clone());
        command.arg("--non-interactive");
        if self.insecure {
            command.arg("--trust-server-cert");
        }
        command
            .env("HOME", self.home.display().to_string())
            .verbosity(self.verbosity)
            .error_map(ErrorMap::subversion());
        if let Some((key, value)) = self.agent.env() {
            command.env(key, value);
        }
        command.mask.push_literal(self.identity.password.expose_secret());
        command
    }

    fn svn_in_root(&self) -> Command {
        let mut command = self.svn();
        command.current_dir(self.root());
        command
    }

    /// Write `.subversion/servers` unless it already exists.
    pub(crate) async fn write_config(&self, url: &SvnUrl) -> Result<(), ScmError> {
        let path = self.home.join(".subversion").join("servers");
        if fs::exists(&path).await? {
            return Ok(());
        }
        if let Some(dir) = path.parent() {
            fs::mkdir(dir, 0o755).await?;
        }
        let proxy = proxy::resolve(self.host.as_ref(), url.proxy_kind(), &url.host(), "SVN").await?;
        let content = proxy.map(|p| p.svn_servers()).unwrap_or_default();
        fs::write(&path, content.as_bytes(), 0o644).await?;
        self.host
            .activity(&format!("[FILE] Created {}.", path.display()));
        Ok(())
    }

    /// Prime the credential cache and inject the password into it.
    pub(crate) async fn write_password(&self, url: &SvnUrl) -> Result<(), ScmError> {
        if !self.identity.has_basic_auth() {
            return Ok(());
        }
        let mut command = self.svn();
        command
            .args(["--username", self.identity.user.as_str()])
            .args(["--password", self.identity.password.expose_secret()])
            .args(["info", url.as_str()])
            .verbosity(Verbosity::Error);
        command.run().await?;

        let dir = self.home.join(".subversion").join("auth").join("svn.simple");
        let path = svn_auth::write_credentials(
            &dir,
            &self.identity.user,
            self.identity.password.expose_secret(),
        )
        .await?;
        self.host
            .activity(&format!("[FILE] Updated {}.", path.display()));
        Ok(())
    }

    async fn checkout(&self, url: &SvnUrl, verbosity: Verbosity) -> Result<(), ScmError> {
        let root = self.root();
        // Best effort: checkout fails loudly when the directory is unusable.
        if let Err(e) = fs::rmdir(&self.path).await {
            warn!(error = %e, "working copy not removed");
        }
        fs::mkdir(&root, 0o755).await?;
        let mut command = self.svn();
        command
            .args(["checkout", url.as_str()])
            .arg(root.display().to_string())
            .verbosity(verbosity);
        command.run().await
    }
}

#[async_trait]
impl Scm for Subversion {
    fn kind(&self) -> RemoteKind {
        RemoteKind::Subversion
    }

    fn url(&self) -> String {
        self.svn_url()
            .map(|u| u.to_string())
            .unwrap_or_else(|_| self.remote.url.clone())
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn validate(&self) -> Result<(), ScmError> {
        let url = self.svn_url()?;
        if url.is_insecure() && !self.insecure {
            return Err(ScmError::InsecureTransport {
                scheme: url.scheme().to_string(),
                setting: INSECURE_SETTING.to_string(),
            });
        }
        Ok(())
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn fetch(&mut self) -> Result<(), ScmError> {
        let url = self.svn_url()?;
        self.host
            .activity(&format!("[SVN] Home (directory): {}", self.home.display()));
        self.host
            .activity(&format!("[SVN] Cloning: {}", Mask::auth().apply(url.as_str())));
        if self.identity.id != 0 {
            self.host.activity(&format!(
                "[SVN] Using credentials (id={}) {}.",
                self.identity.id, self.identity.name
            ));
        }
        self.write_config(&url).await?;
        self.write_password(&url).await?;
        self.agent.add(&self.identity, &url.host()).await?;
        self.checkout(&url, self.verbosity).await
    }

    /// `reference` may be a branch name (`dev`), a layout path
    /// (`branches/dev`, `tags/v1`) or a fully qualified URL.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn branch(&mut self, reference: &str) -> Result<(), ScmError> {
        let base = self.svn_url()?;
        let mut remote = self.remote.clone();
        remote.branch = Some(reference.to_string());
        let target = SvnUrl::new(&remote)?;

        if self.checkout(&target, Verbosity::Disabled).await.is_err() {
            let message = format!("Create branch: {}", target);
            let mut command = self.svn();
            command
                .args(["copy", "--parents", base.as_str(), target.as_str()])
                .args(["-m", message.as_str()]);
            command.run().await?;
            self.checkout(&target, self.verbosity).await?;
        }
        self.remote = remote;
        Ok(())
    }

    #[instrument(skip(self, files), fields(path = %self.path.display(), files = files.len()))]
    async fn commit(&mut self, files: &[String], message: &str) -> Result<(), ScmError> {
        if !files.is_empty() {
            let mut command = self.svn_in_root();
            command
                .args(["add", "--force"])
                .args(files.iter().cloned());
            command.run().await?;
        }
        let mut command = self.svn_in_root();
        command.args(["commit", "-m", message]);
        command.run().await
    }

    async fn head(&self) -> Result<String, ScmError> {
        let mut command = self.svn_in_root();
        command.args(["info", "-r", "HEAD"]);
        command.run().await?;
        parse_revision(&String::from_utf8_lossy(command.raw_output())).ok_or_else(|| {
            ScmError::Parse {
                what: "[SVN] info".to_string(),
                output: command.output(),
            }
        })
    }

    async fn use_credential(&mut self, credential: Credential) -> Result<(), ScmError> {
        self.identity = resolve_credential(self.host.as_ref(), credential).await?;
        Ok(())
    }
}
