//! Remote URL parsing for the Git and Subversion drivers

use crate::core::error::ScmError;
use crate::core::traits::{ProxyKind, Remote};
use std::fmt;
use url::Url;

/// Transport security and proxy kind by URL scheme.
pub fn proxy_kind(scheme: &str) -> Option<ProxyKind> {
    match scheme {
        "http" => Some(ProxyKind::Http),
        "https" | "ssh" => Some(ProxyKind::Https),
        _ => None,
    }
}

fn host_of(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        _ => String::new(),
    }
}

/// Git clone URL
///
/// Accepts standard URLs, SCP-style `user@host:path` remotes (scheme
/// `ssh`) and absolute local paths (scheme `file`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitUrl {
    pub raw: String,
    pub scheme: String,
    /// Host, with `:port` when one is given
    pub host: String,
    pub path: String,
}

impl GitUrl {
    pub fn parse(raw: &str) -> Result<Self, ScmError> {
        if let Ok(url) = Url::parse(raw) {
            return Ok(Self {
                raw: raw.to_string(),
                scheme: url.scheme().to_string(),
                host: host_of(&url),
                path: url.path().to_string(),
            });
        }
        if raw.starts_with('/') {
            return Ok(Self {
                raw: raw.to_string(),
                scheme: "file".to_string(),
                host: String::new(),
                path: raw.to_string(),
            });
        }
        let invalid = || ScmError::InvalidUrl {
            url: raw.to_string(),
        };
        let (authority, path) = raw.split_once(':').ok_or_else(invalid)?;
        if path.contains(':') {
            return Err(invalid());
        }
        let (user, host) = authority.split_once('@').ok_or_else(invalid)?;
        if user.is_empty() || host.is_empty() || host.contains('@') {
            return Err(invalid());
        }
        Ok(Self {
            raw: raw.to_string(),
            scheme: "ssh".to_string(),
            host: host.to_string(),
            path: path.to_string(),
        })
    }

    pub fn is_insecure(&self) -> bool {
        self.scheme == "http"
    }

    pub fn proxy_kind(&self) -> Option<ProxyKind> {
        proxy_kind(&self.scheme)
    }
}

impl fmt::Display for GitUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Effective Subversion checkout URL
///
/// The branch selects the repository layout directory:
///
/// | branch                     | URL                               |
/// |----------------------------|-----------------------------------|
/// | none                       | `<root>/trunk[/<path>]`           |
/// | `dev`                      | `<root>/branches/dev[/<path>]`    |
/// | `branches/x`, `tags/v1`    | `<root>/<branch>[/<path>]`        |
/// | `https://host/repo/b/x`    | used verbatim                     |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SvnUrl {
    url: Url,
}

impl SvnUrl {
    pub fn new(remote: &Remote) -> Result<Self, ScmError> {
        let invalid = |url: &str| ScmError::InvalidUrl {
            url: url.to_string(),
        };
        if let Some(branch) = remote.branch.as_deref().filter(|b| is_qualified(b)) {
            let url = Url::parse(branch).map_err(|_| invalid(branch))?;
            return Ok(Self { url });
        }

        let mut url = Url::parse(&remote.url).map_err(|_| invalid(&remote.url))?;
        let layout = match remote.branch.as_deref() {
            None => "trunk".to_string(),
            Some(b) if b == "trunk" || b.starts_with("branches/") || b.starts_with("tags/") => {
                b.to_string()
            }
            Some(b) => format!("branches/{b}"),
        };
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| invalid(&remote.url))?;
            segments.pop_if_empty();
            let parts = std::iter::once(layout.as_str()).chain(remote.path.as_deref());
            for segment in parts.flat_map(|p| p.split('/')).filter(|s| !s.is_empty()) {
                segments.push(segment);
            }
        }
        Ok(Self { url })
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// Host, with `:port` when one is given
    pub fn host(&self) -> String {
        host_of(&self.url)
    }

    pub fn is_insecure(&self) -> bool {
        self.scheme() == "http"
    }

    pub fn proxy_kind(&self) -> Option<ProxyKind> {
        proxy_kind(self.scheme())
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl fmt::Display for SvnUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// True for a branch given as a complete URL rather than a layout path.
pub fn is_qualified(reference: &str) -> bool {
    reference.contains("://")
}
