//! Source control drivers and their factory

pub mod git;
pub mod proxy;
pub mod subversion;
pub mod svn_auth;
pub mod url;

pub use git::Git;
pub use subversion::Subversion;

use crate::core::config::AgentConfig;
use crate::core::error::ScmError;
use crate::core::traits::{Credential, Host, Identity, Remote, RemoteKind, Scm};
use crate::security::Agent;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Collaborators shared by every driver of a run
#[derive(Clone)]
pub struct ScmContext {
    pub host: Arc<dyn Host>,
    pub agent: Arc<Agent>,
    pub config: AgentConfig,
}

impl ScmContext {
    /// Context with the work directory made absolute.
    pub fn new(mut config: AgentConfig, host: Arc<dyn Host>) -> Result<Self, ScmError> {
        let work_dir = config.work_dir();
        let work_dir = std::path::absolute(&work_dir).map_err(|e| ScmError::io(&work_dir, e))?;
        config.work_dir = Some(work_dir.clone());
        let agent = Agent::new(config.ssh(), work_dir, host.clone()).with_verbosity(config.verbosity());
        Ok(Self {
            host,
            agent: Arc::new(agent),
            config,
        })
    }
}

/// Build and validate the driver for `remote`, checking out into `dest`.
///
/// The insecure transport setting for the remote kind is read from the
/// host. When given, `credential` is bound before returning.
pub async fn create(
    dest: impl Into<PathBuf>,
    remote: Remote,
    ctx: &ScmContext,
    credential: Option<Credential>,
) -> Result<Box<dyn Scm>, ScmError> {
    let dest = dest.into();
    let dest = std::path::absolute(&dest).map_err(|e| ScmError::io(&dest, e))?;
    let mut scm: Box<dyn Scm> = match remote.kind {
        RemoteKind::Subversion => {
            let insecure = ctx.host.setting_bool(subversion::INSECURE_SETTING)?;
            Box::new(Subversion::new(dest, remote, insecure, ctx))
        }
        RemoteKind::Git => {
            let insecure = ctx.host.setting_bool(git::INSECURE_SETTING)?;
            Box::new(Git::new(dest, remote, insecure, ctx))
        }
    };
    scm.validate()?;
    if let Some(credential) = credential {
        scm.use_credential(credential).await?;
    }
    debug!(kind = %scm.kind(), path = %scm.path().display(), "repository ready");
    Ok(scm)
}

pub(crate) async fn resolve_credential(
    host: &dyn Host,
    credential: Credential,
) -> Result<Identity, ScmError> {
    match credential {
        Credential::Ref(id) => host.identity(id).await,
        Credential::Identity(identity) => Ok(identity),
    }
}
