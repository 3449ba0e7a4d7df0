//! Error handling for SCM operations
//!
//! Every failure the agent can surface is a variant of [`ScmError`]. Variants
//! map onto the error taxonomy used throughout the crate: policy errors,
//! execution errors, parse errors, I/O errors and timeouts.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for SCM operations
#[derive(Error, Debug)]
pub enum ScmError {
    // Policy errors
    #[error("{scheme} URL used with {setting} = FALSE")]
    InsecureTransport { scheme: String, setting: String },

    #[error("URL not valid: {url}")]
    InvalidUrl { url: String },

    // Execution errors
    #[error("[CMD] {command} failed: {status}")]
    Exec {
        command: String,
        status: String,
        output: String,
    },

    #[error("[CMD] {command} could not be started: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("[CMD] {command} canceled")]
    Cancelled { command: String },

    #[error("[CMD] {command} timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("Auth failed. User or password not provided or invalid. {reason}")]
    BasicAuth { reason: String },

    // Parse errors
    #[error("{what} parser failed")]
    Parse { what: String, output: String },

    // I/O errors
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("credential cache not found in {path}")]
    CredentialCache { path: PathBuf },

    // Collaborator errors
    #[error("identity (id={id}) not found")]
    IdentityNotFound { id: u64 },

    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("host error: {0}")]
    Host(String),
}

impl ScmError {
    /// Wrap an I/O error with the offending path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Check if this error is worth retrying by the caller
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Exec { .. } | Self::Cancelled { .. } | Self::Host(_)
        )
    }

    /// Check if this error came from a time-bounded operation
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Get suggested actions for this error
    pub fn suggested_actions(&self) -> Vec<&'static str> {
        match self {
            Self::InsecureTransport { .. } => vec![
                "Use an https:// or ssh URL",
                "Enable the insecure setting if plain HTTP is intended",
            ],
            Self::InvalidUrl { .. } => vec!["Check the repository URL"],
            Self::Exec { .. } => vec![
                "Review the command output in the activity log",
                "Check that the remote is reachable",
            ],
            Self::Spawn { .. } => vec!["Check that the tool is installed and the path is correct"],
            Self::Cancelled { .. } => vec!["Re-run the operation"],
            Self::Timeout { .. } => vec![
                "The SSH key may require a passphrase that is not available",
                "Check the identity password",
            ],
            Self::BasicAuth { .. } => vec![
                "Check the identity user and password",
                "Check that the identity has access to the repository",
            ],
            Self::Parse { .. } => vec!["Check the tool version and its output format"],
            Self::Io { .. } => vec!["Check the path permissions and free space"],
            Self::CredentialCache { .. } => {
                vec!["Check that the tool is allowed to cache credentials"]
            }
            Self::IdentityNotFound { .. } => vec!["Check the identity reference"],
            Self::InvalidOption(_) => vec!["Pass an identity or an identity reference"],
            Self::Config(_) => vec!["Check the configuration file"],
            Self::Host(_) => vec!["Check the host services"],
        }
    }

    /// Get error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::InsecureTransport { .. } => "INSECURE_TRANSPORT",
            Self::InvalidUrl { .. } => "INVALID_URL",
            Self::Exec { .. } => "EXEC_FAILED",
            Self::Spawn { .. } => "SPAWN_FAILED",
            Self::Cancelled { .. } => "CANCELLED",
            Self::Timeout { .. } => "TIMEOUT",
            Self::BasicAuth { .. } => "BASIC_AUTH",
            Self::Parse { .. } => "PARSE_FAILED",
            Self::Io { .. } => "IO_ERROR",
            Self::CredentialCache { .. } => "CREDENTIAL_CACHE",
            Self::IdentityNotFound { .. } => "IDENTITY_NOT_FOUND",
            Self::InvalidOption(_) => "INVALID_OPTION",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Host(_) => "HOST_ERROR",
        }
    }
}
