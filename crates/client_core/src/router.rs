use std::{cmp::Reverse, collections::BTreeMap, sync::Arc};

use serde::Serialize;
use shared::domain::{Role, User};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};
use url::form_urlencoded;

use crate::{
    events::{ClientEvent, ToastLevel},
    gateway::ApiGateway,
    session::SessionState,
    views::{NotFoundView, RouteContext, View, ViewError, ViewHandler},
};

pub const LOAD_FAILED_MESSAGE: &str = "failed to load page";
const MAX_REDIRECTS: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("invalid route pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Rest(String),
}

/// `/product/:id`, `/admin/users`, `/seller/*page`.
///
/// `:name` captures one segment; a trailing `*name` captures the remaining
/// segments joined by `/`, possibly none (`/seller/` yields `page = ""`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    pub fn parse(raw: &str) -> Result<Self, RouteError> {
        let invalid = |reason: &str| RouteError::InvalidPattern {
            pattern: raw.to_string(),
            reason: reason.to_string(),
        };
        if !raw.starts_with('/') {
            return Err(invalid("must start with '/'"));
        }

        let parts: Vec<&str> = split_segments(raw).collect();
        let mut segments = Vec::with_capacity(parts.len());
        for (index, part) in parts.iter().enumerate() {
            let segment = if let Some(name) = part.strip_prefix(':') {
                if name.is_empty() {
                    return Err(invalid("parameter without a name"));
                }
                Segment::Param(name.to_string())
            } else if let Some(name) = part.strip_prefix('*') {
                if name.is_empty() {
                    return Err(invalid("wildcard without a name"));
                }
                if index + 1 != parts.len() {
                    return Err(invalid("wildcard must be the last segment"));
                }
                Segment::Rest(name.to_string())
            } else {
                Segment::Literal((*part).to_string())
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_exact(&self) -> bool {
        self.segments
            .iter()
            .all(|segment| matches!(segment, Segment::Literal(_)))
    }

    /// Sort key for parametrized routes: more literal segments first, then
    /// longer patterns, wildcards last.
    fn specificity(&self) -> (Reverse<usize>, Reverse<usize>, bool) {
        let literals = self
            .segments
            .iter()
            .filter(|segment| matches!(segment, Segment::Literal(_)))
            .count();
        let has_rest = matches!(self.segments.last(), Some(Segment::Rest(_)));
        (Reverse(literals), Reverse(self.segments.len()), has_rest)
    }

    pub fn matches(&self, path: &str) -> Option<BTreeMap<String, String>> {
        let parts: Vec<&str> = split_segments(path).collect();
        let mut params = BTreeMap::new();

        for (index, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(literal) => {
                    if parts.get(index) != Some(&literal.as_str()) {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    params.insert(name.clone(), (*parts.get(index)?).to_string());
                }
                Segment::Rest(name) => {
                    let rest = parts.get(index..).unwrap_or_default();
                    params.insert(name.clone(), rest.join("/"));
                    return Some(params);
                }
            }
        }

        (parts.len() == self.segments.len()).then_some(params)
    }
}

fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

/// Roles a page admits, and where everyone else is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGuard {
    roles: Vec<Role>,
    redirect: String,
    message: String,
}

impl RoleGuard {
    pub fn new(
        roles: impl IntoIterator<Item = Role>,
        redirect: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            roles: roles.into_iter().collect(),
            redirect: redirect.into(),
            message: message.into(),
        }
    }

    pub fn admits(&self, user: Option<&User>) -> bool {
        user.is_some_and(|user| self.roles.contains(&user.role))
    }

    pub fn redirect(&self) -> &str {
        &self.redirect
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub struct Route {
    name: String,
    pattern: RoutePattern,
    handler: Arc<dyn ViewHandler>,
    requires_auth: bool,
    role_guard: Option<RoleGuard>,
}

impl Route {
    pub fn new(
        name: impl Into<String>,
        pattern: &str,
        handler: impl ViewHandler + 'static,
    ) -> Result<Self, RouteError> {
        Ok(Self {
            name: name.into(),
            pattern: RoutePattern::parse(pattern)?,
            handler: Arc::new(handler),
            requires_auth: false,
            role_guard: None,
        })
    }

    /// Redirect to the login location instead of rendering while logged out.
    pub fn protected(mut self) -> Self {
        self.requires_auth = true;
        self
    }

    /// Logged-in users outside `guard`'s roles are redirected with a warning.
    /// Implies [`Route::protected`].
    pub fn restricted(mut self, guard: RoleGuard) -> Self {
        self.requires_auth = true;
        self.role_guard = Some(guard);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &RoutePattern {
        &self.pattern
    }

    pub fn requires_auth(&self) -> bool {
        self.requires_auth
    }

    pub fn role_guard(&self) -> Option<&RoleGuard> {
        self.role_guard.as_ref()
    }
}

pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub params: BTreeMap<String, String>,
}

/// Fixed route table, ordered once at construction.
pub struct RouteTable {
    exact: Vec<Route>,
    parametrized: Vec<Route>,
    not_found: Arc<dyn ViewHandler>,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Self {
        let (exact, mut parametrized): (Vec<Route>, Vec<Route>) =
            routes.into_iter().partition(|route| route.pattern.is_exact());
        // Stable: equally specific routes keep declaration order.
        parametrized.sort_by_key(|route| route.pattern.specificity());
        Self {
            exact,
            parametrized,
            not_found: Arc::new(NotFoundView),
        }
    }

    pub fn with_not_found(mut self, handler: impl ViewHandler + 'static) -> Self {
        self.not_found = Arc::new(handler);
        self
    }

    /// Exact routes first, then parametrized routes by specificity.
    pub fn resolve(&self, path: &str) -> Option<RouteMatch<'_>> {
        if let Some(route) = self
            .exact
            .iter()
            .find(|route| route.pattern.matches(path).is_some())
        {
            return Some(RouteMatch {
                route,
                params: BTreeMap::new(),
            });
        }

        self.parametrized.iter().find_map(|route| {
            route
                .pattern
                .matches(path)
                .map(|params| RouteMatch { route, params })
        })
    }

}

/// Location split into a normalized path and decoded query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub path: String,
    pub query: BTreeMap<String, String>,
}

impl Location {
    pub fn parse(raw: &str) -> Self {
        let without_fragment = raw.split('#').next().unwrap_or_default();
        let (path, query) = match without_fragment.split_once('?') {
            Some((path, query)) => (path, query),
            None => (without_fragment, ""),
        };

        let segments: Vec<&str> = split_segments(path).collect();
        let path = format!("/{}", segments.join("/"));
        let query = form_urlencoded::parse(query.as_bytes())
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        Self { path, query }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ViewState {
    Idle,
    Loading { path: String, generation: u64 },
    Rendered { path: String, view: View },
    Error { path: String, message: String },
}

struct RouterState {
    history: Vec<String>,
    generation: u64,
    view: ViewState,
}

enum Resolution {
    Done(ViewState),
    Redirect(String),
}

/// Maps locations to view handlers and tracks the page lifecycle.
///
/// Each resolution takes a new generation number. Handlers run without the
/// state lock held, so navigations can overlap; the result of a superseded
/// generation is dropped instead of replacing the newer page.
pub struct ViewRouter {
    table: RouteTable,
    gateway: Arc<ApiGateway>,
    session: Arc<SessionState>,
    login_path: String,
    inner: Mutex<RouterState>,
    events: broadcast::Sender<ClientEvent>,
}

impl ViewRouter {
    pub fn new(
        table: RouteTable,
        gateway: Arc<ApiGateway>,
        login_path: impl Into<String>,
        events: broadcast::Sender<ClientEvent>,
    ) -> Self {
        let session = Arc::clone(gateway.session());
        Self {
            table,
            gateway,
            session,
            login_path: login_path.into(),
            inner: Mutex::new(RouterState {
                history: Vec::new(),
                generation: 0,
                view: ViewState::Idle,
            }),
            events,
        }
    }

    /// Records `path` as the current location, then resolves it.
    pub async fn navigate(&self, path: &str) -> ViewState {
        self.push_history(path).await;
        self.resolve(path).await
    }

    /// Returns to the previous location without recording a new entry.
    pub async fn back(&self) -> Option<ViewState> {
        let previous = {
            let mut guard = self.inner.lock().await;
            if guard.history.len() < 2 {
                return None;
            }
            guard.history.pop();
            guard.history.last().cloned()
        }?;
        Some(self.resolve(&previous).await)
    }

    pub async fn resolve(&self, path: &str) -> ViewState {
        let mut target = path.to_string();
        for _ in 0..=MAX_REDIRECTS {
            match self.resolve_once(&target).await {
                Resolution::Done(state) => return state,
                Resolution::Redirect(to) => {
                    info!(from = %target, to = %to, "redirecting");
                    let _ = self.events.send(ClientEvent::Redirected {
                        from: target.clone(),
                        to: to.clone(),
                    });
                    self.replace_history(&target, &to).await;
                    target = to;
                }
            }
        }

        warn!(path = %target, "too many redirects");
        let generation = self.begin(&target).await;
        self.publish(
            generation,
            ViewState::Error {
                path: target,
                message: LOAD_FAILED_MESSAGE.to_string(),
            },
        )
        .await
    }

    async fn resolve_once(&self, raw: &str) -> Resolution {
        let location = Location::parse(raw);
        let generation = self.begin(&location.path).await;
        let session = self.session.snapshot().await;

        let matched = self.table.resolve(&location.path);
        let (handler, params, requires_auth, role_guard, name) = match matched {
            Some(RouteMatch { route, params }) => (
                Arc::clone(&route.handler),
                params,
                route.requires_auth,
                route.role_guard.as_ref(),
                route.name.as_str(),
            ),
            None => (
                Arc::clone(&self.table.not_found),
                BTreeMap::new(),
                false,
                None,
                "not_found",
            ),
        };

        if requires_auth && !session.is_authenticated() && location.path != self.login_path {
            debug!(path = %location.path, route = name, "route requires login");
            return self.redirect_to_login(generation).await;
        }

        if let Some(guard) = role_guard {
            if !guard.admits(session.user()) && location.path != guard.redirect() {
                let role = session.user().map(|user| user.role.to_string());
                debug!(path = %location.path, route = name, role = ?role, "role not admitted");
                return self
                    .redirect_with_warning(generation, guard.redirect(), guard.message())
                    .await;
            }
        }

        debug!(path = %location.path, route = name, generation, "rendering view");
        let ctx = RouteContext {
            path: location.path.clone(),
            params,
            query: location.query,
            session,
            gateway: Arc::clone(&self.gateway),
        };

        let state = match handler.render(&ctx).await {
            Ok(view) => ViewState::Rendered {
                path: location.path,
                view,
            },
            Err(ViewError::Unauthorized) if location.path != self.login_path => {
                return self.redirect_to_login(generation).await;
            }
            Err(err) => {
                warn!(path = %location.path, route = name, error = %err, "view failed");
                ViewState::Error {
                    path: location.path,
                    message: LOAD_FAILED_MESSAGE.to_string(),
                }
            }
        };

        Resolution::Done(self.publish(generation, state).await)
    }

    async fn redirect_to_login(&self, generation: u64) -> Resolution {
        let guard = self.inner.lock().await;
        if guard.generation != generation {
            return Resolution::Done(guard.view.clone());
        }
        Resolution::Redirect(self.login_path.clone())
    }

    async fn redirect_with_warning(&self, generation: u64, to: &str, message: &str) -> Resolution {
        {
            let guard = self.inner.lock().await;
            if guard.generation != generation {
                return Resolution::Done(guard.view.clone());
            }
        }
        let _ = self
            .events
            .send(ClientEvent::toast(ToastLevel::Warning, message));
        Resolution::Redirect(to.to_string())
    }

    async fn begin(&self, path: &str) -> u64 {
        let mut guard = self.inner.lock().await;
        guard.generation += 1;
        let generation = guard.generation;
        guard.view = ViewState::Loading {
            path: path.to_string(),
            generation,
        };
        let state = guard.view.clone();
        drop(guard);

        let _ = self.events.send(ClientEvent::ViewChanged { view: state });
        generation
    }

    /// Applies `state` unless a newer resolution started meanwhile. Returns
    /// the state that is current afterwards.
    async fn publish(&self, generation: u64, state: ViewState) -> ViewState {
        let mut guard = self.inner.lock().await;
        if guard.generation != generation {
            debug!(
                generation,
                current = guard.generation,
                "discarding stale view result"
            );
            return guard.view.clone();
        }
        guard.view = state.clone();
        drop(guard);

        let _ = self.events.send(ClientEvent::ViewChanged { view: state.clone() });
        state
    }

    async fn push_history(&self, path: &str) {
        let mut guard = self.inner.lock().await;
        if guard.history.last().map(String::as_str) != Some(path) {
            guard.history.push(path.to_string());
        }
    }

    /// A redirect takes the place of the location that caused it.
    async fn replace_history(&self, from: &str, to: &str) {
        let mut guard = self.inner.lock().await;
        if guard.history.last().map(String::as_str) == Some(from) {
            guard.history.pop();
        }
        if guard.history.last().map(String::as_str) != Some(to) {
            guard.history.push(to.to_string());
        }
    }

    pub async fn state(&self) -> ViewState {
        self.inner.lock().await.view.clone()
    }

    pub async fn current_path(&self) -> Option<String> {
        self.inner.lock().await.history.last().cloned()
    }

    pub async fn history(&self) -> Vec<String> {
        self.inner.lock().await.history.clone()
    }
}

#[cfg(test)]
#[path = "tests/router_tests.rs"]
mod tests;
