//! The three smart HTTP operations.
//!
//! Each handler resolves the repository, authorizes, and only then starts
//! git, so every failure is reported with a proper status before the
//! response head is committed. Once git is running its stdout is streamed to
//! the client as produced.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::body::Body;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt, future, stream};
use metrics::counter;
use tokio_util::io::ReaderStream;

use crate::access::{AccessKind, authorize_commands, check_access};
use crate::errors::GitHttpError;
use crate::pkt::service_advertisement_header;
use crate::repo::{absolute_repo_path, logical_repo_name, repo_exists};
use crate::routes::Route;
use crate::runner::{GitCommand, GitOutput};
use crate::state::GitHttpState;
use crate::update_request::decode_update_request;

const SERVICES: &[&str] = &["upload-pack", "receive-pack"];

/// `GET <repo>/info/refs?service=git-<service>`
pub async fn info_refs(
    state: &GitHttpState,
    route: &Route,
    query: Option<&str>,
    headers: &HeaderMap,
) -> Result<Response, GitHttpError> {
    let config = state.config();
    let repo = absolute_repo_path(&config.repos_root, &route.repo_path)?;

    if !repo_exists(&repo) {
        if !config.auto_init {
            tracing::error!(repo = %repo.display(), "repo not found");
            return Err(GitHttpError::NotFound);
        }
        // Creating a repository is a write.
        check_access(state, headers, &repo, AccessKind::Write)?;
        init_repository(state, &repo).await?;
    }

    check_access(state, headers, &repo, AccessKind::Read)?;

    let service = service_name(query);
    if !service.is_empty() && !SERVICES.contains(&service.as_str()) {
        return Err(GitHttpError::BadRequest(format!("unsupported service: git-{service}")));
    }

    tracing::debug!(service = %service, repo = %repo.display(), "info refs");
    counter!("git_http.info_refs", "service" => service.clone()).increment(1);

    let repo_arg = repo.to_string_lossy();
    let command = git_command(
        [service.as_str(), "--stateless-rpc", "--advertise-refs", &*repo_arg],
        headers,
    );
    let stdout = spawn(state, command).await?;

    let header = stream::once(future::ready(Ok(Bytes::from(
        service_advertisement_header(&service),
    ))));
    let body = Body::from_stream(header.chain(output_stream(stdout, |_| {})));
    Ok(git_response(format!("application/x-git-{service}-advertisement"), body))
}

/// `POST <repo>/git-upload-pack`
pub async fn upload_pack(
    state: &GitHttpState,
    route: &Route,
    headers: &HeaderMap,
    body: Body,
) -> Result<Response, GitHttpError> {
    let config = state.config();
    let repo = absolute_repo_path(&config.repos_root, &route.repo_path)?;
    tracing::info!(repo = %repo.display(), "upload pack");

    if !repo_exists(&repo) {
        tracing::error!(repo = %repo.display(), "repo not found");
        return Err(GitHttpError::NotFound);
    }

    check_access(state, headers, &repo, AccessKind::Read)?;

    let request_body = read_body(headers, body, config.max_body_size).await?;
    counter!("git_http.upload_pack").increment(1);

    let repo_arg = repo.to_string_lossy();
    let command =
        git_command(["upload-pack", "--stateless-rpc", &*repo_arg], headers).input(request_body);
    let stdout = spawn(state, command).await?;

    Ok(git_response(
        "application/x-git-upload-pack-result".to_string(),
        Body::from_stream(output_stream(stdout, |_| {})),
    ))
}

/// `POST <repo>/git-receive-pack`
///
/// The body is buffered so the ref updates can be authorized before git sees
/// a single byte. Git is then fed the buffered bytes as received, never a
/// re-encoding of the decoded commands.
pub async fn receive_pack(
    state: &GitHttpState,
    route: &Route,
    headers: &HeaderMap,
    body: Body,
) -> Result<Response, GitHttpError> {
    let config = state.config();
    let repo = absolute_repo_path(&config.repos_root, &route.repo_path)?;
    tracing::info!(repo = %repo.display(), "receive pack");

    if !repo_exists(&repo) {
        tracing::error!(repo = %repo.display(), "repo not found");
        return Err(GitHttpError::NotFound);
    }

    let user = check_access(state, headers, &repo, AccessKind::Write)?;

    let request_body = read_body(headers, body, config.max_body_size).await?;
    tracing::debug!(length = request_body.len(), "unpacking packfile");

    let update = decode_update_request(&request_body).map_err(|err| {
        tracing::error!(error = %err, "error decoding reference update request");
        GitHttpError::BadRequest(format!("invalid reference update request: {err}"))
    })?;

    for cmd in &update.commands {
        tracing::debug!(
            action = %cmd.action(),
            name = %cmd.name,
            old = %cmd.old,
            new = %cmd.new,
            "command"
        );
    }
    authorize_commands(state, &repo, &user, &update.commands)?;
    counter!("git_http.receive_pack").increment(1);

    let repo_arg = repo.to_string_lossy();
    let command =
        git_command(["receive-pack", "--stateless-rpc", &*repo_arg], headers).input(request_body);
    let stdout = spawn(state, command).await?;

    let hooks = state.hooks().cloned();
    let repo_name = logical_repo_name(&config.repos_root, &repo);
    let commands = update.commands;
    let on_complete = move |_| {
        if let Some(hooks) = hooks {
            hooks.on_push(&repo_name, &user, &commands);
        }
    };

    Ok(git_response(
        "application/x-git-receive-pack-result".to_string(),
        Body::from_stream(output_stream(stdout, on_complete)),
    ))
}

/// Value of the `service` query parameter without its `git-` prefix.
pub fn service_name(query: Option<&str>) -> String {
    let Some(query) = query else {
        return String::new();
    };
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "service")
        .map(|(_, value)| value.strip_prefix("git-").unwrap_or(&value).to_string())
        .unwrap_or_default()
}

async fn init_repository(state: &GitHttpState, repo: &Path) -> Result<(), GitHttpError> {
    let path = repo.to_string_lossy();
    state
        .runner()
        .run(GitCommand::new(["init", "--bare", &*path]))
        .await
        .map_err(|err| GitHttpError::Internal(format!("auto-init failed: {err:#}")))?;
    tracing::info!(repo = %repo.display(), "initialized bare repository");

    if let Some(hooks) = state.hooks() {
        hooks.on_init(&logical_repo_name(&state.config().repos_root, repo), repo);
    }
    Ok(())
}

fn git_command<'a>(args: impl IntoIterator<Item = &'a str>, headers: &HeaderMap) -> GitCommand {
    let command = GitCommand::new(args);
    match headers.get("Git-Protocol").and_then(|v| v.to_str().ok()) {
        Some(protocol) => command.env("GIT_PROTOCOL", protocol),
        None => command,
    }
}

async fn spawn(state: &GitHttpState, command: GitCommand) -> Result<GitOutput, GitHttpError> {
    state.runner().spawn(command).await.map_err(|err| {
        GitHttpError::Internal(format!("failed to start git: {err:#}"))
    })
}

/// Buffers a request body of at most `max` bytes, inflating gzip bodies.
pub async fn read_body(headers: &HeaderMap, body: Body, max: usize) -> Result<Bytes, GitHttpError> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > max) {
        tracing::error!(?declared, max, "request body too large");
        return Err(GitHttpError::PayloadTooLarge);
    }

    let mut buf = BytesMut::with_capacity(declared.unwrap_or(0));
    let mut chunks = body.into_data_stream();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|err| {
            tracing::error!(error = %err, "failed to read request body");
            GitHttpError::BadRequest("failed to read request body".to_string())
        })?;
        if buf.len() + chunk.len() > max {
            tracing::error!(max, "request body too large");
            return Err(GitHttpError::PayloadTooLarge);
        }
        buf.extend_from_slice(&chunk);
    }
    let raw = buf.freeze();

    let gzip = headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("gzip") || v.eq_ignore_ascii_case("x-gzip"));
    if !gzip {
        return Ok(raw);
    }

    tokio::task::spawn_blocking(move || inflate(&raw, max))
        .await
        .map_err(|err| GitHttpError::Internal(format!("inflate task failed: {err}")))?
}

fn inflate(raw: &[u8], max: usize) -> Result<Bytes, GitHttpError> {
    let mut out = Vec::new();
    flate2::read::GzDecoder::new(raw)
        .take(max as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|err| GitHttpError::BadRequest(format!("invalid gzip body: {err}")))?;
    if out.len() > max {
        tracing::error!(max, "inflated request body too large");
        return Err(GitHttpError::PayloadTooLarge);
    }
    Ok(Bytes::from(out))
}

/// Streams git's stdout. `on_complete` receives the byte count once stdout
/// reached EOF; it is not called when reading fails, in which case the body
/// is aborted and the connection closed.
fn output_stream<F>(stdout: GitOutput, on_complete: F) -> impl Stream<Item = std::io::Result<Bytes>> + Send + 'static
where
    F: FnOnce(u64) + Send + 'static,
{
    let written = Arc::new(AtomicU64::new(0));
    let seen = written.clone();
    let data = ReaderStream::new(stdout).inspect(move |chunk| match chunk {
        Ok(bytes) => {
            seen.fetch_add(bytes.len() as u64, Ordering::Relaxed);
        }
        Err(err) => tracing::warn!(error = %err, "error reading git output"),
    });
    let tail = stream::once(async move {
        let total = written.load(Ordering::Relaxed);
        tracing::debug!(bytes = total, "bytes written");
        counter!("git_http.bytes_streamed").increment(total);
        on_complete(total);
        None::<std::io::Result<Bytes>>
    })
    .filter_map(future::ready);
    data.chain(tail)
}

fn git_response(content_type: String, body: Body) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        body,
    )
        .into_response()
}
