use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_BODY_SIZE: usize = 100 * 1024 * 1024;

/// Settings the protocol handlers read on every request. Fixed once the
/// state is built.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct GitHttpConfig {
    /// Directory holding the bare repositories.
    pub repos_root: PathBuf,

    /// Upper bound for a buffered request body, before and after inflating.
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,

    /// When false every request is served without authentication.
    #[serde(default)]
    pub protected: bool,

    /// Create missing repositories with `git init --bare` on advertisement.
    #[serde(default)]
    pub auto_init: bool,
}

fn default_max_body_size() -> usize {
    DEFAULT_MAX_BODY_SIZE
}

impl GitHttpConfig {
    pub fn new(repos_root: impl Into<PathBuf>) -> Self {
        Self {
            repos_root: repos_root.into(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            protected: false,
            auto_init: false,
        }
    }

    /// Creates the repositories root if needed, owner-only on unix.
    pub fn prepare(&self) -> anyhow::Result<()> {
        if self.repos_root.is_dir() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.repos_root).with_context(|| {
            format!(
                "failed to create repositories root: {}",
                self.repos_root.display()
            )
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.repos_root, std::fs::Permissions::from_mode(0o700))
                .with_context(|| format!("failed to restrict {}", self.repos_root.display()))?;
        }
        Ok(())
    }
}
