//! Activity reporting for command execution
//!
//! The [`Reporter`] decides, by [`Verbosity`], what is written to the task
//! activity log: command started, succeeded, failed, and (live) output.
//! Output goes to the attached remote file when one is set, otherwise each
//! line becomes an activity entry. Everything is masked first.

use crate::command::runner::Options;
use crate::command::writer::Buffer;
use crate::core::error::ScmError;
use crate::core::traits::{FileRef, Host};
use crate::security::Mask;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

/// What a command reports
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum Verbosity {
    /// Reports nothing.
    Disabled,
    /// Reports failures.
    Error,
    /// Reports failures, started and succeeded.
    #[default]
    Default,
    /// Reports failures, started, succeeded and output while running.
    LiveOutput,
}

impl FromStr for Verbosity {
    type Err = ScmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disabled" => Ok(Verbosity::Disabled),
            "error" => Ok(Verbosity::Error),
            "default" => Ok(Verbosity::Default),
            "liveOutput" | "live" => Ok(Verbosity::LiveOutput),
            other => Err(ScmError::InvalidOption(format!("verbosity: {other}"))),
        }
    }
}

/// Command activity reporter
#[derive(Clone)]
pub struct Reporter {
    verbosity: Verbosity,
    mask: Mask,
    host: Arc<dyn Host>,
    file: Option<FileRef>,
}

impl Reporter {
    pub fn new(host: Arc<dyn Host>, verbosity: Verbosity, mask: Mask) -> Self {
        Self {
            verbosity,
            mask,
            host,
            file: None,
        }
    }

    /// Send output to a remote file instead of the activity log.
    pub fn with_file(mut self, file: Option<FileRef>) -> Self {
        self.file = file;
        self
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Report command started.
    pub fn run(&self, path: &str, options: &Options) {
        if self.verbosity >= Verbosity::Default {
            self.host.activity(&format!(
                "[CMD] Running: {} {}",
                path,
                options.render(&self.mask)
            ));
        }
    }

    /// Report command succeeded.
    pub fn succeeded(&self, path: &str) {
        if self.verbosity >= Verbosity::Default {
            self.host.activity(&format!("[CMD] {} succeeded.", path));
        }
    }

    /// Report command failed.
    ///
    /// Below live verbosity the output was not streamed, so it is appended
    /// after the failure line.
    pub async fn error(&self, path: &str, err: &ScmError, output: &[u8]) {
        match self.verbosity {
            Verbosity::Disabled => {}
            Verbosity::Error | Verbosity::Default => {
                self.host
                    .activity(&format!("[CMD] {} failed: {}.", path, reason(err)));
                if !output.is_empty() {
                    self.append(&self.mask.apply_bytes(output)).await;
                }
            }
            Verbosity::LiveOutput => {
                self.host
                    .activity(&format!("[CMD] {} failed: {}.", path, reason(err)));
            }
        }
    }

    /// Report the unreported tail of `buffer`.
    ///
    /// Delimited reporting stops at the last newline, holding back a partial
    /// line; otherwise the whole tail is reported. Returns the number of
    /// bytes reported.
    pub(crate) async fn output(&self, buffer: &Mutex<Buffer>, delimited: bool) -> usize {
        if self.verbosity != Verbosity::LiveOutput {
            return 0;
        }
        let chunk = {
            let mut buffer = buffer.lock().unwrap_or_else(PoisonError::into_inner);
            buffer.take(delimited)
        };
        match chunk {
            Some(bytes) => {
                self.append(&self.mask.apply_bytes(&bytes)).await;
                bytes.len()
            }
            None => 0,
        }
    }

    async fn append(&self, output: &str) {
        let Some(file) = &self.file else {
            for line in output.lines() {
                self.host.activity(line);
            }
            return;
        };
        if let Err(e) = self.host.patch(file, output.as_bytes()).await {
            warn!(file = %file.name, error = %e, "output not reported");
            return;
        }
        if let Err(e) = self.host.attach(file).await {
            warn!(file = %file.name, error = %e, "output not attached");
        }
    }
}

// Exec errors already name the command; report only the exit status.
fn reason(err: &ScmError) -> String {
    match err {
        ScmError::Exec { status, .. } => status.clone(),
        other => other.to_string(),
    }
}
