use std::sync::Arc;

use shared::{
    error::ApiFailure,
    protocol::{ApiResponse, LoginRequest, RegisterRequest},
};
use storage::{SessionStore, Storage};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod router;
pub mod routes;
pub mod session;
pub mod views;

pub use config::{load_settings, Product, Settings};
pub use error::ClientError;
pub use events::{ClientEvent, ToastLevel};
pub use gateway::{ApiGateway, CallOptions, Method, RequestBody};
pub use router::{Location, RoleGuard, Route, RouteError, RouteTable, ViewRouter, ViewState};
pub use session::SessionState;
pub use views::{FetchView, RouteContext, StaticView, View, ViewError, ViewHandler};

const EVENT_CAPACITY: usize = 1024;
const REGISTER_PATH: &str = "/register";

/// Wires session state, gateway and router of one client instance.
pub struct Coordinator {
    settings: Settings,
    session: Arc<SessionState>,
    gateway: Arc<ApiGateway>,
    router: ViewRouter,
    events: broadcast::Sender<ClientEvent>,
}

impl Coordinator {
    /// Uses the route table of `settings.product`.
    pub fn new(settings: Settings, store: Arc<dyn SessionStore>) -> Result<Self, ClientError> {
        let table = match settings.product {
            Product::Blog => routes::blog_routes()?,
            Product::Shop => routes::shop_routes()?,
        };
        Self::with_routes(settings, store, table)
    }

    pub fn with_routes(
        settings: Settings,
        store: Arc<dyn SessionStore>,
        table: RouteTable,
    ) -> Result<Self, ClientError> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let session = Arc::new(SessionState::new(store, events.clone()));
        let gateway = Arc::new(ApiGateway::new(
            settings.api_base()?,
            settings.convention,
            settings.request_timeout(),
            Arc::clone(&session),
            events.clone(),
        )?);
        let router = ViewRouter::new(
            table,
            Arc::clone(&gateway),
            settings.login_path.clone(),
            events.clone(),
        );

        Ok(Self {
            settings,
            session,
            gateway,
            router,
            events,
        })
    }

    /// Opens the SQLite session store named by `settings.database_url`.
    pub async fn open(settings: Settings) -> anyhow::Result<Self> {
        let database_url = storage::prepare_database_url(&settings.database_url)?;
        let store = Storage::new(&database_url).await?;
        Ok(Self::new(settings, Arc::new(store))?)
    }

    /// Restores the persisted session, then resolves `initial` (or the home
    /// location).
    pub async fn start(&self, initial: Option<&str>) -> ViewState {
        let session = self.session.load_persisted().await;
        if session.is_authenticated() && self.settings.restore_user_on_start {
            self.refresh_current_user().await;
        }

        let path = initial.unwrap_or(self.settings.home_path.as_str());
        let authenticated = self.session.is_authenticated().await;
        info!(path, authenticated, "client started");
        self.router.navigate(path).await
    }

    pub async fn login(&self, username: &str, password: &str) -> ApiResponse {
        let request = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let response = api::auth::login(&self.gateway, &request).await;
        if !response.is_success() {
            return response;
        }

        match api::auth::auth_payload(response.clone()) {
            Ok(Some(payload)) => {
                self.session
                    .set_authenticated(payload.token, payload.user, payload.seller)
                    .await;
                self.toast(ToastLevel::Success, "logged in");
                self.router.navigate(&self.settings.home_path).await;
                response
            }
            Ok(None) => {
                warn!(username, "login response carried no token");
                self.reject("login response carried no token")
            }
            Err(err) => {
                warn!(username, error = %err, "unreadable login response");
                self.reject(err.message)
            }
        }
    }

    /// Logs straight in when the backend answers with a token; otherwise sends
    /// the user to the login location.
    pub async fn register(&self, username: &str, email: &str, password: &str) -> ApiResponse {
        let request = RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        let response = api::auth::register(&self.gateway, &request).await;
        if !response.is_success() {
            return response;
        }

        match api::auth::auth_payload(response.clone()) {
            Ok(Some(payload)) => {
                self.session
                    .set_authenticated(payload.token, payload.user, payload.seller)
                    .await;
                self.toast(ToastLevel::Success, "account created");
                self.router.navigate(&self.settings.home_path).await;
            }
            Ok(None) => {
                self.toast(ToastLevel::Success, "account created, please log in");
                self.router.navigate(&self.settings.login_path).await;
            }
            Err(err) => {
                debug!(username, error = %err, "register response without a session");
                self.router.navigate(&self.settings.login_path).await;
            }
        }
        response
    }

    /// Tells the backend (best effort), drops the session and leaves pages
    /// that only make sense while logged in.
    pub async fn logout(&self) {
        if self.session.is_authenticated().await {
            let response = api::auth::logout(&self.gateway).await;
            if let Some(failure) = response.failure() {
                debug!(kind = ?failure.kind, message = %failure.message, "logout call failed");
            }
        }
        self.session.clear().await;

        let current = self.router.current_path().await;
        let on_public_page = current
            .as_deref()
            .map(|raw| self.is_public(&Location::parse(raw).path))
            .unwrap_or(true);
        if !on_public_page {
            self.router.navigate(&self.settings.home_path).await;
        }
    }

    /// Re-reads the identity behind the current token. Returns whether the
    /// session was updated.
    pub async fn refresh_current_user(&self) -> bool {
        match api::auth::current_user(&self.gateway).await {
            Ok(payload) => self.session.update_user(payload.user, payload.seller).await,
            Err(err) => {
                debug!(kind = ?err.kind, message = %err.message, "current user not refreshed");
                false
            }
        }
    }

    pub async fn navigate(&self, path: &str) -> ViewState {
        self.router.navigate(path).await
    }

    pub async fn back(&self) -> Option<ViewState> {
        self.router.back().await
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    pub fn gateway(&self) -> &Arc<ApiGateway> {
        &self.gateway
    }

    pub fn router(&self) -> &ViewRouter {
        &self.router
    }

    fn is_public(&self, path: &str) -> bool {
        path == "/"
            || path == self.settings.home_path
            || path == self.settings.login_path
            || path == REGISTER_PATH
    }

    fn reject(&self, message: impl Into<String>) -> ApiResponse {
        let message = message.into();
        self.toast(ToastLevel::Error, message.clone());
        ApiResponse::Failure(ApiFailure::transport(message))
    }

    fn toast(&self, level: ToastLevel, message: impl Into<String>) {
        let _ = self.events.send(ClientEvent::toast(level, message));
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
