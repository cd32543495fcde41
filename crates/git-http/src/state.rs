use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use path_absolutize::Absolutize;

use crate::access::Authorizer;
use crate::config::GitHttpConfig;
use crate::runner::{CommandRunner, GitProcessRunner};
use crate::update_request::RefUpdateCommand;

/// Callbacks fired after a repository changed on disk.
pub trait RepositoryHooks: Send + Sync {
    /// A missing repository was created by `git init --bare`.
    fn on_init(&self, _repo: &str, _path: &Path) {}

    /// The output of a receive-pack run has been fully sent to the client.
    fn on_push(&self, _repo: &str, _user: &str, _commands: &[RefUpdateCommand]) {}
}

/// Everything the Git HTTP handlers need. Immutable once built and cheap to
/// clone into every request.
#[derive(Clone)]
pub struct GitHttpState {
    inner: Arc<Inner>,
}

struct Inner {
    config: GitHttpConfig,
    authorizer: Option<Arc<dyn Authorizer>>,
    hooks: Option<Arc<dyn RepositoryHooks>>,
    runner: Arc<dyn CommandRunner>,
}

impl GitHttpState {
    pub fn builder(config: GitHttpConfig) -> GitHttpStateBuilder {
        GitHttpStateBuilder {
            config,
            authorizer: None,
            hooks: None,
            runner: None,
        }
    }

    pub fn config(&self) -> &GitHttpConfig {
        &self.inner.config
    }

    pub fn authorizer(&self) -> Option<&dyn Authorizer> {
        self.inner.authorizer.as_deref()
    }

    pub fn hooks(&self) -> Option<&Arc<dyn RepositoryHooks>> {
        self.inner.hooks.as_ref()
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.inner.runner.as_ref()
    }
}

pub struct GitHttpStateBuilder {
    config: GitHttpConfig,
    authorizer: Option<Arc<dyn Authorizer>>,
    hooks: Option<Arc<dyn RepositoryHooks>>,
    runner: Option<Arc<dyn CommandRunner>>,
}

impl GitHttpStateBuilder {
    pub fn authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn RepositoryHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Fails for protected mode without an authorizer. The repositories root
    /// is made absolute here so only client supplied names are ever checked
    /// for `..` segments.
    pub fn build(self) -> Result<GitHttpState> {
        if self.config.protected && self.authorizer.is_none() {
            bail!("protected mode requires an authorizer");
        }
        let mut config = self.config;
        config.repos_root = config
            .repos_root
            .absolutize()
            .with_context(|| format!("invalid repositories root: {}", config.repos_root.display()))?
            .into_owned();
        let runner = self
            .runner
            .unwrap_or_else(|| Arc::new(GitProcessRunner::default()) as Arc<dyn CommandRunner>);
        Ok(GitHttpState {
            inner: Arc::new(Inner {
                config,
                authorizer: self.authorizer,
                hooks: self.hooks,
                runner,
            }),
        })
    }
}
