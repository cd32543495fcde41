//! Git smart HTTP for axum.
//!
//! Serves `info/refs`, `git-upload-pack` and `git-receive-pack` for bare
//! repositories below a root directory by running the git toolchain in
//! stateless RPC mode. Access is decided by an [`Authorizer`], per
//! repository and, for pushes, per ref.
//!
//! ```no_run
//! use axum::Router;
//! use git_http::{GitHttpConfig, GitHttpState};
//!
//! # fn app() -> anyhow::Result<Router> {
//! let state = GitHttpState::builder(GitHttpConfig::new("/srv/git")).build()?;
//! let app = Router::new()
//!     .route("/health", axum::routing::get(|| async { "ok" }))
//!     .layer(axum::middleware::from_fn_with_state(state, git_http::middleware));
//! # Ok(app)
//! # }
//! ```

pub mod access;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod pkt;
pub mod repo;
pub mod routes;
pub mod runner;
pub mod service;
pub mod state;
pub mod update_request;

pub use access::{AccessKind, Authorizer, Credentials};
pub use config::GitHttpConfig;
pub use errors::GitHttpError;
pub use routes::{Operation, Route, match_route};
pub use runner::{CommandRunner, GitCommand, GitOutput, GitProcessRunner};
pub use service::{dispatch, middleware, router};
pub use state::{GitHttpState, GitHttpStateBuilder, RepositoryHooks};
pub use update_request::{RefAction, RefUpdateCommand, UpdateRequest, decode_update_request};
