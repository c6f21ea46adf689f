//! Shared configuration for rainfly consumers.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext), and
//! translation to a [`ClientConfig`] plus the [`LoadTarget`] a profile
//! points at.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use rainfly_api::{
    Client, ClientConfig, CloudEndpoints, Controller, DEFAULT_LOCAL_PORT, TlsMode,
    TransportConfig,
};

/// Environment variable prefix for config overrides.
///
/// Nested keys are separated by a double underscore, e.g.
/// `RAINFLY_DEFAULTS__TIMEOUT=5`.
pub const ENV_PREFIX: &str = "RAINFLY_";

/// Fallback password variable, consulted when a profile names none.
pub const PASSWORD_ENV: &str = "RAINFLY_PASSWORD";

const KEYRING_SERVICE: &str = "rainfly";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no password configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("no profile named '{profile}'")]
    UnknownProfile { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named explicitly.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named controller profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Look up a profile by name, or the default profile when `name` is
    /// `None`.
    pub fn profile(&self, name: Option<&str>) -> Result<(&str, &Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.into(),
            })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Verify local controller certificates. Off by default since
    /// controllers ship self-signed certificates.
    #[serde(default)]
    pub verify_tls: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            verify_tls: false,
        }
    }
}

fn default_timeout() -> u64 {
    10
}

/// How a profile reaches its controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileMode {
    #[default]
    Local,
    Remote,
}

/// A named controller profile.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Profile {
    #[serde(default)]
    pub mode: ProfileMode,

    /// Controller host or IP (local mode).
    pub host: Option<String>,

    /// Local API port; defaults to 8080.
    pub port: Option<u16>,

    /// Talk HTTPS to the local API; defaults to `true`.
    pub use_ssl: Option<bool>,

    /// Cloud account email (remote mode).
    pub email: Option<String>,

    /// Password (plaintext, prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Path to a CA certificate for the local controller.
    pub ca_cert: Option<PathBuf>,

    /// Override certificate verification for the local controller.
    pub verify_tls: Option<bool>,

    /// Override timeout.
    pub timeout: Option<u64>,

    /// Override the cloud account endpoint.
    pub cloud_url: Option<String>,

    /// Override the cloud proxy endpoint.
    pub proxy_url: Option<String>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("rs", "rainfly", "rainfly").map_or_else(
        || {
            let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
            p.push(".config");
            p.push("rainfly");
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full config from the canonical file plus environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load config from `path` plus environment. A missing file yields the
/// defaults (still subject to env overrides).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");
    let config: Config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to the canonical path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve a profile's password: env var, then the system keyring, then
/// plaintext in the config.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    let env_name = profile.password_env.as_deref().unwrap_or(PASSWORD_ENV);
    if let Ok(pw) = std::env::var(env_name) {
        return Ok(SecretString::from(pw));
    }

    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password")) {
        if let Ok(pw) = entry.get_password() {
            return Ok(SecretString::from(pw));
        }
    }

    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store a profile's password in the system keyring.
pub fn store_password(profile_name: &str, password: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password"))
        .and_then(|entry| entry.set_password(password))
        .map_err(|e| ConfigError::Validation {
            field: "keyring".into(),
            reason: e.to_string(),
        })
}

// ── Translation ─────────────────────────────────────────────────────

fn parse_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    raw.parse().map_err(|_| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL: {raw}"),
    })
}

/// Build a [`ClientConfig`] from a profile and the global defaults.
pub fn profile_to_client_config(
    profile: &Profile,
    defaults: &Defaults,
) -> Result<ClientConfig, ConfigError> {
    let tls = if let Some(ref ca_path) = profile.ca_cert {
        TlsMode::CustomCa(ca_path.clone())
    } else if profile.verify_tls.unwrap_or(defaults.verify_tls) {
        TlsMode::System
    } else {
        TlsMode::DangerAcceptInvalid
    };

    let timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));

    let mut cloud = CloudEndpoints::default();
    if let Some(ref raw) = profile.cloud_url {
        cloud.auth_url = parse_url("cloud_url", raw)?;
    }
    if let Some(ref raw) = profile.proxy_url {
        cloud.proxy_url = parse_url("proxy_url", raw)?;
    }

    Ok(ClientConfig {
        transport: TransportConfig { tls, timeout },
        cloud,
    })
}

/// What a profile loads: one local controller, or every controller of a
/// cloud account.
#[derive(Debug)]
pub enum LoadTarget {
    Local {
        host: String,
        port: u16,
        use_ssl: bool,
        password: SecretString,
    },
    Remote {
        email: String,
        password: SecretString,
    },
}

impl LoadTarget {
    /// Resolve the target and its password from a profile.
    pub fn from_profile(profile: &Profile, profile_name: &str) -> Result<Self, ConfigError> {
        let missing = |field: &str| ConfigError::Validation {
            field: field.into(),
            reason: format!("required for {:?} profile '{profile_name}'", profile.mode),
        };

        match profile.mode {
            ProfileMode::Local => {
                let host = profile.host.clone().ok_or_else(|| missing("host"))?;
                Ok(Self::Local {
                    host,
                    port: profile.port.unwrap_or(DEFAULT_LOCAL_PORT),
                    use_ssl: profile.use_ssl.unwrap_or(true),
                    password: resolve_password(profile, profile_name)?,
                })
            }
            ProfileMode::Remote => {
                let email = profile.email.clone().ok_or_else(|| missing("email"))?;
                Ok(Self::Remote {
                    email,
                    password: resolve_password(profile, profile_name)?,
                })
            }
        }
    }

    /// Load the target into `client`, returning the controllers it yielded.
    pub async fn load(&self, client: &Client) -> Result<Vec<Controller>, rainfly_api::Error> {
        match self {
            Self::Local {
                host,
                port,
                use_ssl,
                password,
            } => Ok(vec![client.load_local(host, password, *port, *use_ssl).await?]),
            Self::Remote { email, password } => client.load_remote(email, password, true).await,
        }
    }
}

/// Everything needed to connect with a named profile.
pub fn resolve_profile(
    config: &Config,
    name: Option<&str>,
) -> Result<(ClientConfig, LoadTarget), ConfigError> {
    let (name, profile) = config.profile(name)?;
    let client_config = profile_to_client_config(profile, &config.defaults)?;
    let target = LoadTarget::from_profile(profile, name)?;
    Ok((client_config, target))
}
