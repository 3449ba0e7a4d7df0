//! SSH agent lifecycle and key registration
//!
//! The agent is started on first use and listens on a per-process socket.
//! Its socket is handed to child commands through `SSH_AUTH_SOCK` in their
//! environment; the agent's own process environment is left untouched.

use crate::command::{Command, Verbosity};
use crate::core::config::SshConfig;
use crate::core::error::ScmError;
use crate::core::fs;
use crate::core::traits::{Host, Identity};
use secrecy::ExposeSecret;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// SSH agent manager
pub struct Agent {
    config: SshConfig,
    home: PathBuf,
    ssh_dir: PathBuf,
    verbosity: Verbosity,
    host: Arc<dyn Host>,
    socket: OnceCell<PathBuf>,
}

impl Agent {
    /// `home` is the HOME given to the agent tools; keys live in `home/.ssh`.
    pub fn new(config: SshConfig, home: impl Into<PathBuf>, host: Arc<dyn Host>) -> Self {
        let home = home.into();
        Self {
            config,
            ssh_dir: home.join(".ssh"),
            home,
            verbosity: Verbosity::default(),
            host,
            socket: OnceCell::new(),
        }
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn ssh_dir(&self) -> &Path {
        &self.ssh_dir
    }

    /// Agent socket, once started.
    pub fn socket(&self) -> Option<&Path> {
        self.socket.get().map(PathBuf::as_path)
    }

    /// `SSH_AUTH_SOCK` entry for child commands, once started.
    pub fn env(&self) -> Option<(String, String)> {
        self.socket()
            .map(|s| ("SSH_AUTH_SOCK".to_string(), s.display().to_string()))
    }

    /// Start the agent. Later calls return the running agent's socket.
    pub async fn start(&self) -> Result<&Path, ScmError> {
        let socket = self.socket.get_or_try_init(|| self.launch()).await?;
        Ok(socket.as_path())
    }

    async fn launch(&self) -> Result<PathBuf, ScmError> {
        self.host.activity(&format!(
            "[SSH] Home (directory): {}",
            self.home.display()
        ));
        let socket = self
            .config
            .socket_dir
            .join(format!("agent.{}", std::process::id()));
        // A stale socket from an earlier process with the same pid blocks the bind.
        let _ = tokio::fs::remove_file(&socket).await;

        let mut command = Command::new(&self.config.agent_binary, self.host.clone());
        command
            .arg("-a")
            .arg(socket.display().to_string())
            .env("HOME", self.home.display().to_string())
            .verbosity(self.verbosity);
        command.run().await?;

        fs::mkdir(&self.ssh_dir, 0o700).await?;
        self.host.activity("[SSH] Agent started.");
        info!(socket = %socket.display(), "ssh agent started");
        Ok(socket)
    }

    /// Register the identity's key with the agent.
    ///
    /// Identities without a key are ignored. The key password is supplied
    /// through an askpass script; registration is bounded by the configured
    /// key timeout.
    pub async fn add(&self, identity: &Identity, host: &str) -> Result<(), ScmError> {
        let Some(key) = &identity.key else {
            return Ok(());
        };
        let socket = self.start().await?.to_path_buf();
        self.host
            .activity(&format!("[SSH] Adding key: {}", identity.name));
        debug!(identity = identity.id, host, "adding ssh key");

        let path = self.ssh_dir.join(format!("id_{}", identity.id));
        fs::write(&path, format_key(key.expose_secret()).as_bytes(), 0o600).await?;
        let ask = self.write_ask(identity).await?;

        let mut command = Command::new(&self.config.add_binary, self.host.clone());
        command
            .arg(path.display().to_string())
            .env("DISPLAY", ":0")
            .env("SSH_ASKPASS", ask.display().to_string())
            .env("SSH_ASKPASS_REQUIRE", "force")
            .env("HOME", self.home.display().to_string())
            .env("SSH_AUTH_SOCK", socket.display().to_string())
            .verbosity(self.verbosity);
        command.mask.push_literal(identity.password.expose_secret());
        command.run_with_timeout(self.config.key_timeout()).await?;

        self.host
            .activity(&format!("[FILE] Created {}.", path.display()));
        Ok(())
    }

    /// Write the askpass script that prints the key password.
    async fn write_ask(&self, identity: &Identity) -> Result<PathBuf, ScmError> {
        let path = self.ssh_dir.join(format!("ask_{}.sh", identity.id));
        let script = format!(
            "#!/bin/sh\necho {}\n",
            shell_quote(identity.password.expose_secret())
        );
        fs::write(&path, script.as_bytes(), 0o700).await?;
        Ok(path)
    }
}

/// Normalize a PEM key: trimmed, single trailing newline.
pub fn format_key(key: &str) -> String {
    if key.is_empty() {
        return String::new();
    }
    format!("{}\n", key.trim())
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
