//! Repository and ref level authorization.
//!
//! Repository access is decided from HTTP basic-auth credentials. Pushes are
//! additionally checked command by command before anything reaches git.

use std::path::Path;

use axum::http::{HeaderMap, header};
use base64::Engine;

use crate::errors::GitHttpError;
use crate::repo::logical_repo_name;
use crate::state::GitHttpState;
use crate::update_request::{RefAction, RefUpdateCommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    Read,
    Write,
}

impl AccessKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessKind::Read => "read",
            AccessKind::Write => "write",
        }
    }
}

impl std::fmt::Display for AccessKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decides who may do what. Repository names are logical names such as
/// `team/app`, never filesystem paths.
pub trait Authorizer: Send + Sync {
    fn authorize_repo(&self, repo: &str, user: &str, password: &str, access: AccessKind) -> bool;

    /// Called once per ref update of a push. Repository level write access
    /// is sufficient unless overridden.
    fn authorize_ref(
        &self,
        _repo: &str,
        _user: &str,
        _ref_name: &str,
        _action: RefAction,
        _access: AccessKind,
    ) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

/// Parses `Authorization: Basic <base64(user:password)>`.
pub fn basic_auth(headers: &HeaderMap) -> Option<Credentials> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some(Credentials {
        user: user.to_string(),
        password: password.to_string(),
    })
}

/// Returns the authenticated user, empty when the server is unprotected.
pub fn check_access(
    state: &GitHttpState,
    headers: &HeaderMap,
    repo_path: &Path,
    access: AccessKind,
) -> Result<String, GitHttpError> {
    let config = state.config();
    if !config.protected {
        return Ok(String::new());
    }

    tracing::debug!(repo = %repo_path.display(), %access, "checking access");

    let Some(authorizer) = state.authorizer() else {
        // GitHttpState::build refuses this combination.
        return Err(GitHttpError::Internal("no authorizer configured".to_string()));
    };

    let Some(credentials) = basic_auth(headers) else {
        tracing::debug!("no basic auth values found");
        metrics::counter!("git_http.denied", "reason" => "unauthenticated").increment(1);
        return Err(GitHttpError::Unauthorized);
    };

    let repo = logical_repo_name(&config.repos_root, repo_path);
    if authorizer.authorize_repo(&repo, &credentials.user, &credentials.password, access) {
        return Ok(credentials.user);
    }

    tracing::debug!(repo = %repo, user = %credentials.user, %access, "access denied");
    metrics::counter!("git_http.denied", "reason" => "repository").increment(1);
    Err(GitHttpError::Forbidden)
}

/// Authorizes every command of a push; the first rejection fails the whole
/// push.
pub fn authorize_commands(
    state: &GitHttpState,
    repo_path: &Path,
    user: &str,
    commands: &[RefUpdateCommand],
) -> Result<(), GitHttpError> {
    let Some(authorizer) = state.authorizer() else {
        return Ok(());
    };
    let repo = logical_repo_name(&state.config().repos_root, repo_path);

    for cmd in commands {
        let action = cmd.action();
        tracing::debug!(
            action = %action,
            ref_name = %cmd.name,
            old = %cmd.old,
            new = %cmd.new,
            "checking ref auth"
        );
        if !authorizer.authorize_ref(&repo, user, &cmd.name, action, AccessKind::Write) {
            tracing::warn!(repo = %repo, user, action = %action, ref_name = %cmd.name, "ref auth failed");
            metrics::counter!("git_http.denied", "reason" => "ref").increment(1);
            return Err(GitHttpError::Forbidden);
        }
    }
    Ok(())
}
