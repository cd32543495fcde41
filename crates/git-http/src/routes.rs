//! Maps request paths onto the three smart HTTP operations.

/// The protocol operation a route dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `GET <repo>/info/refs?service=...`
    Advertisement,
    /// `POST <repo>/git-upload-pack`
    Fetch,
    /// `POST <repo>/git-receive-pack`
    Push,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Advertisement => "info_refs",
            Operation::Fetch => "upload_pack",
            Operation::Push => "receive_pack",
        }
    }
}

#[derive(Debug)]
pub struct RouteMatcher {
    /// Literal path suffix; everything before `/<suffix>` is the repository.
    pub suffix: &'static str,
    /// When non-empty, at least one of these query parameters must be present.
    pub params: &'static [&'static str],
    pub operation: Operation,
}

impl RouteMatcher {
    fn capture<'p>(&self, path: &'p str) -> Option<&'p str> {
        let repo = path.strip_suffix(self.suffix)?.strip_suffix('/')?;
        (!repo.is_empty()).then_some(repo)
    }

    fn params_matched(&self, query: Option<&str>) -> bool {
        if self.params.is_empty() {
            return true;
        }
        let Some(query) = query else { return false };
        url::form_urlencoded::parse(query.as_bytes())
            .any(|(key, _)| self.params.iter().any(|p| *p == key))
    }
}

/// Evaluated in order, first match wins.
pub static ROUTES: [RouteMatcher; 3] = [
    RouteMatcher {
        suffix: "info/refs",
        params: &["service"],
        operation: Operation::Advertisement,
    },
    RouteMatcher {
        suffix: "git-upload-pack",
        params: &[],
        operation: Operation::Fetch,
    },
    RouteMatcher {
        suffix: "git-receive-pack",
        params: &[],
        operation: Operation::Push,
    },
];

/// A matched request: the repository as the client named it and the rest of
/// the path.
#[derive(Debug, Clone)]
pub struct Route {
    pub repo_path: String,
    pub file: String,
    pub matched: &'static RouteMatcher,
}

impl Route {
    pub fn operation(&self) -> Operation {
        self.matched.operation
    }
}

/// `path` is the request path as received; a single leading slash is dropped.
pub fn match_route(path: &str, query: Option<&str>) -> Option<Route> {
    let path = path.strip_prefix('/').unwrap_or(path);

    for matcher in ROUTES.iter() {
        let Some(repo) = matcher.capture(path) else { continue };
        if !matcher.params_matched(query) {
            continue;
        }
        let file = path.replacen(&format!("{repo}/"), "", 1);
        tracing::debug!(repo, file = %file, "matched route");
        return Some(Route {
            repo_path: repo.to_string(),
            file,
            matched: matcher,
        });
    }

    tracing::debug!(path, "no route found");
    None
}
