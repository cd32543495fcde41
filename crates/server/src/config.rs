//! Server configuration.
//!
//! Stored as RON. Looked up in `GIT_HTTP_SERVER_CONFIG`, then
//! `git-http-server.ron`, then `.git-http-server/config.ron`; defaults apply
//! when none exists. Command line flags are applied on top in `main`.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use git_http::RefAction;
use git_http::config::DEFAULT_MAX_BODY_SIZE;
use serde::{Deserialize, Serialize};

const CONFIG_FILENAMES: &[&str] = &["git-http-server.ron", ".git-http-server/config.ron"];
const CONFIG_ENV: &str = "GIT_HTTP_SERVER_CONFIG";

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Config {
    /// Address the HTTP server binds to.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Answer CORS preflights and allow any origin.
    #[serde(default)]
    pub cors: bool,

    /// Serve Prometheus metrics at `/metrics`.
    #[serde(default)]
    pub metrics: bool,

    #[serde(default)]
    pub repos: Repos,

    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,

    #[serde(default)]
    pub access: Access,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            cors: false,
            metrics: false,
            repos: Repos::default(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            access: Access::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Repos {
    #[serde(default = "default_repos_path")]
    pub path: PathBuf,

    /// Create missing repositories on the first advertisement request.
    #[serde(default)]
    pub auto_init: bool,
}

impl Default for Repos {
    fn default() -> Self {
        Self {
            path: default_repos_path(),
            auto_init: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Access {
    /// Any entry here switches the server to protected mode.
    #[serde(default)]
    pub users: Vec<User>,

    #[serde(default)]
    pub ref_rules: Vec<RefRule>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct User {
    pub name: String,
    pub password: String,

    /// Repository patterns: `*`, `team/*` or an exact name.
    #[serde(default)]
    pub read: Vec<String>,

    /// Same patterns as `read`. Write implies read.
    #[serde(default)]
    pub write: Vec<String>,
}

/// Restricts `actions` on refs starting with `prefix` to `users`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RefRule {
    pub prefix: String,
    pub actions: Vec<RefAction>,
    pub users: Vec<String>,
}

fn default_listen() -> String {
    "0.0.0.0:4000".to_string()
}

fn default_repos_path() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join("repos"),
        None => PathBuf::from("repos"),
    }
}

fn default_max_body_size() -> usize {
    DEFAULT_MAX_BODY_SIZE
}

pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_ron(&content).with_context(|| format!("Failed to parse config file: {}", path.display()))
}

pub fn load_with_discovery() -> Result<Config> {
    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            tracing::info!("Loading config from {CONFIG_ENV}: {}", path.display());
            return load_from_file(&path);
        }
        tracing::warn!("{CONFIG_ENV} specified but file not found: {}", path.display());
    }

    for filename in CONFIG_FILENAMES {
        let path = PathBuf::from(filename);
        if path.exists() {
            tracing::info!("Loading config from: {}", path.display());
            return load_from_file(&path);
        }
    }

    tracing::info!("No config file found, using defaults");
    Ok(Config::default())
}

/// Writes `config` as RON, readable by the owner only on unix since it may
/// hold passwords.
pub fn write_to_path<P: AsRef<Path>>(config: &Config, path: P) -> Result<()> {
    let path = path.as_ref();
    let content = ron::ser::to_string_pretty(config, ron::ser::PrettyConfig::default())
        .context("Failed to serialize configuration")?;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("Failed to create config file: {}", path.display()))?;

    // An existing file keeps its mode on open.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to restrict config file: {}", path.display()))?;
    }

    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    Ok(())
}

fn parse_ron(content: &str) -> Result<Config> {
    ron::from_str(content).context("Failed to parse RON configuration")
}
