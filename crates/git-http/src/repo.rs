use std::path::{Path, PathBuf};

use path_absolutize::Absolutize;

use crate::errors::GitHttpError;

/// Resolves a repository name from the URL to an absolute path under `root`.
///
/// A `.git` suffix is added when missing. Names with a `..` segment are
/// rejected even when the absolute path would still land inside the root.
pub fn absolute_repo_path(root: &Path, name: &str) -> Result<PathBuf, GitHttpError> {
    if has_parent_segment(&format!("{}/{}", root.display(), name)) {
        tracing::debug!(repo = %name, "rejected path traversal");
        return Err(GitHttpError::InvalidPath);
    }

    let mut name = name.to_string();
    if !name.ends_with(".git") {
        name.push_str(".git");
    }

    let joined = format!("{}/{}", root.display(), name);
    let absolute = Path::new(&joined).absolutize().map_err(|err| {
        tracing::debug!(repo = %name, error = %err, "failed to absolutize repository path");
        GitHttpError::InvalidPath
    })?;
    Ok(absolute.into_owned())
}

fn has_parent_segment(path: &str) -> bool {
    path.split(['/', '\\']).any(|segment| segment == "..")
}

pub fn repo_exists(path: &Path) -> bool {
    path.exists()
}

/// Maps a resolved path back to the logical name authorizers work with:
/// root prefix, trailing `.git` and leading `/` removed.
pub fn logical_repo_name(root: &Path, path: &Path) -> String {
    let path = path.to_string_lossy();
    let prefix = format!("{}/", root.absolutize().unwrap_or(root.into()).display());
    let name = path.replacen(&prefix, "", 1);
    let name = name.strip_suffix(".git").unwrap_or(&name);
    name.strip_prefix('/').unwrap_or(name).to_string()
}
