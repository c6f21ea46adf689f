use std::fmt;

use secrecy::SecretString;
use url::Url;

use crate::error::Error;

/// Version prefix shared by the local API and the cloud proxy.
pub const API_PREFIX: &str = "api/4";

/// Port the controller's local API listens on out of the box.
pub const DEFAULT_LOCAL_PORT: u16 = 8080;

/// Cloud account endpoint (login, device listing).
pub const DEFAULT_CLOUD_URL: &str = "https://my.rainmachine.com";

/// Cloud proxy fronting each registered controller.
pub const DEFAULT_PROXY_URL: &str = "https://api.rainmachine.com";

pub(crate) const LOCAL_LOGIN_PATH: &str = "auth/login";
pub(crate) const ACCOUNT_LOGIN_PATH: &str = "login/auth";
pub(crate) const SPRINKLERS_PATH: &str = "devices/get-sprinklers";
pub(crate) const SPRINKLER_LOGIN_PATH: &str = "devices/login-sprinkler";

/// Which API surface a controller is reached through.
///
/// Marker enum (no data); routing details live in [`Location`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiMode {
    /// Device-resident API on the LAN, usually with a self-signed cert.
    Local,
    /// Cloud-proxied API reached with account credentials.
    Remote,
}

impl fmt::Display for ApiMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::Remote => "remote",
        })
    }
}

/// Where a controller lives on the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Local {
        host: String,
        port: u16,
        use_ssl: bool,
    },
    Remote {
        sprinkler_id: String,
    },
}

impl Location {
    pub fn mode(&self) -> ApiMode {
        match self {
            Self::Local { .. } => ApiMode::Local,
            Self::Remote { .. } => ApiMode::Remote,
        }
    }

    /// The API root every request path is joined onto (always ends in `/`).
    ///
    /// Local: `https://{host}:{port}/api/4/`
    /// Remote: `{proxy}/{sprinkler_id}/api/4/`
    pub fn base_url(&self, cloud: &CloudEndpoints) -> Result<Url, Error> {
        match self {
            Self::Local {
                host,
                port,
                use_ssl,
            } => {
                let scheme = if *use_ssl { "https" } else { "http" };
                Ok(Url::parse(&format!(
                    "{scheme}://{host}:{port}/{API_PREFIX}/"
                ))?)
            }
            Self::Remote { sprinkler_id } => {
                let base = cloud.proxy_url.as_str().trim_end_matches('/');
                Ok(Url::parse(&format!("{base}/{sprinkler_id}/{API_PREFIX}/"))?)
            }
        }
    }
}

/// Cloud hosts used by the remote API.
///
/// Overridable so tests and self-hosted proxies can point elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudEndpoints {
    /// Account login and device discovery.
    pub auth_url: Url,
    /// Per-controller API proxy.
    pub proxy_url: Url,
}

impl CloudEndpoints {
    pub fn new(auth_url: Url, proxy_url: Url) -> Self {
        Self {
            auth_url,
            proxy_url,
        }
    }

    /// Join a path onto the account endpoint.
    pub(crate) fn auth_endpoint(&self, path: &str) -> Result<Url, Error> {
        let base = self.auth_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }
}

impl Default for CloudEndpoints {
    fn default() -> Self {
        Self {
            auth_url: Url::parse(DEFAULT_CLOUD_URL).expect("invalid default cloud URL"),
            proxy_url: Url::parse(DEFAULT_PROXY_URL).expect("invalid default proxy URL"),
        }
    }
}

/// Secrets needed to (re-)establish a session.
///
/// Kept in memory only while the controller lives so expired tokens can
/// be refreshed; never serialized.
#[derive(Debug, Clone)]
pub(crate) enum Credentials {
    Local {
        password: SecretString,
    },
    Remote {
        email: String,
        password: SecretString,
    },
}
