mod authorizer;
mod config;
mod metrics_exporter;
mod supervisor;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use axum::Router;
use axum::routing::get;
use clap::Parser;
use git_http::{GitHttpConfig, GitHttpState};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::authorizer::StaticAuthorizer;
use crate::config::{Config, User};
use crate::supervisor::Supervisor;

#[derive(Parser, Debug)]
#[command(name = "git-http-server")]
#[command(about = "Serve bare git repositories over smart HTTP", long_about = None)]
struct Cli {
    /// RON config file; discovered in the working directory when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address on which to listen to git requests
    #[arg(long)]
    listen: Option<String>,

    /// The location of the repositories
    #[arg(long)]
    repos_root: Option<PathBuf>,

    /// Create missing repositories on first contact
    #[arg(long)]
    auto_init: bool,

    /// Username for basic auth, granted access to every repository
    #[arg(long, requires = "auth_pass")]
    auth_user: Option<String>,

    /// Password for basic auth
    #[arg(long, requires = "auth_user")]
    auth_pass: Option<String>,

    /// Write the effective configuration to PATH and exit
    #[arg(long, value_name = "PATH")]
    write_config: Option<PathBuf>,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let config = match &cli.config {
        Some(path) => config::load_from_file(path)?,
        None => config::load_with_discovery()?,
    };
    Ok(apply_overrides(config, cli))
}

fn apply_overrides(mut config: Config, cli: &Cli) -> Config {
    if let Some(listen) = &cli.listen {
        config.listen = listen.clone();
    }
    if let Some(root) = &cli.repos_root {
        config.repos.path = root.clone();
    }
    if cli.auto_init {
        config.repos.auto_init = true;
    }
    if let (Some(name), Some(password)) = (&cli.auth_user, &cli.auth_pass) {
        config.access.users.retain(|u| &u.name != name);
        config.access.users.push(User {
            name: name.clone(),
            password: password.clone(),
            read: Vec::new(),
            write: vec!["*".to_string()],
        });
    }
    config
}

fn build_state(config: &Config) -> Result<GitHttpState> {
    let mut core = GitHttpConfig::new(config.repos.path.clone());
    core.auto_init = config.repos.auto_init;
    core.max_body_size = config.max_body_size;
    core.protected = !config.access.users.is_empty();

    let mut builder = GitHttpState::builder(core);
    if !config.access.users.is_empty() {
        builder = builder.authorizer(Arc::new(StaticAuthorizer::new(config.access.clone())));
    }
    builder.build()
}

fn app(state: GitHttpState, config: &Config) -> Router {
    let mut app = Router::new().fallback(root);
    if config.metrics {
        app = app.route("/metrics", get(metrics));
    }
    let mut app = app
        .layer(axum::middleware::from_fn_with_state(state, git_http::middleware))
        .layer(TraceLayer::new_for_http());
    if config.cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        );
    }
    app
}

async fn root() -> &'static str {
    "nothing to see here\n"
}

async fn metrics() -> String {
    metrics_exporter::render_metrics()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    if let Some(path) = &cli.write_config {
        config::write_to_path(&config, path)?;
        tracing::info!("Wrote configuration to {}", path.display());
        return Ok(());
    }

    let state = build_state(&config)?;
    state.config().prepare()?;
    if config.metrics {
        metrics_exporter::init_metrics()?;
    }

    let listener = tokio::net::TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;
    tracing::info!(
        listen = %config.listen,
        repos = %config.repos.path.display(),
        protected = state.config().protected,
        "Starting server"
    );

    let app = app(state, &config);
    let mut supervisor = Supervisor::new();
    supervisor.spawn("http", move |shutdown| async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .context("http server failed")
    });
    supervisor.run().await
}
