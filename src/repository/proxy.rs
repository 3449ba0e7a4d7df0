//! Proxy selection and rendering into tool configuration

use crate::core::error::ScmError;
use crate::core::traits::{Host, Identity, Proxy, ProxyKind};
use secrecy::ExposeSecret;

/// Proxy selected for a remote, with its identity resolved
#[derive(Debug, Clone)]
pub struct ResolvedProxy {
    pub proxy: Proxy,
    pub identity: Option<Identity>,
}

/// Find the proxy applying to `target` (a host, optionally with port).
///
/// Nothing is selected when the transport takes no proxy, none is defined,
/// it is disabled or the target host is excluded. `tag` prefixes the
/// activity line, e.g. `GIT`.
pub async fn resolve(
    host: &dyn Host,
    kind: Option<ProxyKind>,
    target: &str,
    tag: &str,
) -> Result<Option<ResolvedProxy>, ScmError> {
    let Some(kind) = kind else {
        return Ok(None);
    };
    let Some(proxy) = host.find_proxy(kind).await? else {
        return Ok(None);
    };
    let hostname = target.split(':').next().unwrap_or(target);
    if !proxy.enabled || proxy.is_excluded(target) || proxy.is_excluded(hostname) {
        return Ok(None);
    }
    host.activity(&format!(
        "[{}] Using proxy ({}) {}.",
        tag, proxy.id, proxy.kind
    ));
    let identity = match proxy.identity {
        Some(id) => Some(host.identity(id).await?),
        None => None,
    };
    Ok(Some(ResolvedProxy { proxy, identity }))
}

impl ResolvedProxy {
    /// Value of the `.gitconfig` `http.proxy` key.
    pub fn git_url(&self) -> String {
        let auth = match &self.identity {
            Some(id) => format!("{}:{}@", id.user, id.password.expose_secret()),
            None => String::new(),
        };
        let mut url = format!("http://{}{}", auth, self.proxy.host);
        if self.proxy.port > 0 {
            url.push_str(&format!(":{}", self.proxy.port));
        }
        url
    }

    /// Subversion `servers` file content.
    pub fn svn_servers(&self) -> String {
        let mut s = String::from("[global]\n");
        s.push_str(&format!("http-proxy-host = {}\n", self.proxy.host));
        if self.proxy.port > 0 {
            s.push_str(&format!("http-proxy-port = {}\n", self.proxy.port));
        }
        if let Some(id) = &self.identity {
            s.push_str(&format!("http-proxy-username = {}\n", id.user));
            s.push_str(&format!(
                "http-proxy-password = {}\n",
                id.password.expose_secret()
            ));
        }
        if !self.proxy.excluded.is_empty() {
            s.push_str(&format!(
                "http-proxy-exceptions = {}\n",
                self.proxy.excluded.join(" ")
            ));
        }
        s
    }
}
