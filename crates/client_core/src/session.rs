use std::sync::Arc;

use shared::domain::{AuthSession, SellerProfile, Session, User};
use storage::{keys, SessionStore};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::events::ClientEvent;

/// Authenticated identity of the client, mirrored into a [`SessionStore`].
///
/// Token and user are only ever written or erased together, so every reader
/// sees either a complete session or none at all.
pub struct SessionState {
    inner: RwLock<Session>,
    store: Arc<dyn SessionStore>,
    events: broadcast::Sender<ClientEvent>,
}

impl SessionState {
    pub fn new(store: Arc<dyn SessionStore>, events: broadcast::Sender<ClientEvent>) -> Self {
        Self {
            inner: RwLock::new(Session::empty()),
            store,
            events,
        }
    }

    /// Loads the persisted session. Half-written or unreadable state is purged
    /// and the client starts logged out.
    pub async fn load_persisted(&self) -> Session {
        let loaded = match self.read_persisted().await {
            Ok(Some(auth)) => Session::authenticated(auth),
            Ok(None) => Session::empty(),
            Err(reason) => {
                warn!(%reason, "discarding persisted session");
                if let Err(err) = self.store.remove(&keys::ALL).await {
                    warn!(error = %format!("{err:#}"), "failed to purge persisted session");
                }
                Session::empty()
            }
        };

        {
            let mut guard = self.inner.write().await;
            *guard = loaded.clone();
        }

        if let Some(user) = loaded.user() {
            info!(username = %user.username, "restored persisted session");
            self.notify(&loaded);
        }
        loaded
    }

    async fn read_persisted(&self) -> Result<Option<AuthSession>, String> {
        let token = self
            .store
            .get(keys::AUTH_TOKEN)
            .await
            .map_err(|err| format!("{err:#}"))?;
        let user = self
            .store
            .get(keys::CURRENT_USER)
            .await
            .map_err(|err| format!("{err:#}"))?;

        let (token, user) = match (token, user) {
            (None, None) => return Ok(None),
            (Some(token), Some(user)) => (token, user),
            (Some(_), None) => return Err("token stored without user".into()),
            (None, Some(_)) => return Err("user stored without token".into()),
        };
        if token.is_empty() {
            return Err("stored token is empty".into());
        }

        let user: User = serde_json::from_str(&user)
            .map_err(|err| format!("stored user is unreadable: {err}"))?;

        let seller_profile = match self.store.get(keys::SELLER_PROFILE).await {
            Ok(Some(raw)) => match serde_json::from_str::<SellerProfile>(&raw) {
                Ok(profile) => Some(profile),
                Err(err) => {
                    warn!(error = %err, "ignoring unreadable seller profile");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "failed to read seller profile");
                None
            }
        };

        Ok(Some(AuthSession {
            token,
            user,
            seller_profile,
        }))
    }

    pub async fn set_authenticated(
        &self,
        token: impl Into<String>,
        user: User,
        seller_profile: Option<SellerProfile>,
    ) {
        let auth = AuthSession {
            token: token.into(),
            user,
            seller_profile,
        };
        let snapshot = {
            let mut guard = self.inner.write().await;
            *guard = Session::authenticated(auth);
            self.persist(&guard).await;
            guard.clone()
        };

        if let Some(user) = snapshot.user() {
            info!(username = %user.username, role = %user.role, "session authenticated");
        }
        self.notify(&snapshot);
    }

    /// Replaces the identity of the current session. Returns `false` (and does
    /// nothing) when logged out.
    pub async fn update_user(&self, user: User, seller_profile: Option<SellerProfile>) -> bool {
        let snapshot = {
            let mut guard = self.inner.write().await;
            let Some(auth) = guard.auth_mut() else {
                return false;
            };
            auth.user = user;
            auth.seller_profile = seller_profile;
            self.persist(&guard).await;
            guard.clone()
        };
        self.notify(&snapshot);
        true
    }

    /// Erases the session in memory and in the store. Returns whether a session
    /// was present.
    pub async fn clear(&self) -> bool {
        let previous = {
            let mut guard = self.inner.write().await;
            let previous = guard.take();
            if let Err(err) = self.store.remove(&keys::ALL).await {
                warn!(error = %format!("{err:#}"), "failed to erase persisted session");
            }
            previous
        };

        match previous {
            Some(auth) => {
                info!(username = %auth.user.username, "session cleared");
                self.notify(&Session::empty());
                true
            }
            None => {
                debug!("session already clear");
                false
            }
        }
    }

    pub async fn is_authenticated(&self) -> bool {
        self.inner.read().await.is_authenticated()
    }

    pub async fn token(&self) -> Option<String> {
        self.inner.read().await.token().map(str::to_string)
    }

    pub async fn snapshot(&self) -> Session {
        self.inner.read().await.clone()
    }

    async fn persist(&self, session: &Session) {
        let Some(auth) = session.auth() else {
            return;
        };

        let user = match serde_json::to_string(&auth.user) {
            Ok(user) => user,
            Err(err) => {
                warn!(error = %err, "failed to serialize user; session kept in memory only");
                return;
            }
        };
        let seller_profile = auth
            .seller_profile
            .as_ref()
            .and_then(|profile| serde_json::to_string(profile).ok());

        let entries = [
            (keys::AUTH_TOKEN, Some(auth.token.clone())),
            (keys::CURRENT_USER, Some(user)),
            (keys::SELLER_PROFILE, seller_profile),
        ];
        if let Err(err) = self.store.write_all(&entries).await {
            warn!(error = %format!("{err:#}"), "failed to persist session");
        }
    }

    fn notify(&self, session: &Session) {
        let _ = self.events.send(ClientEvent::SessionChanged {
            authenticated: session.is_authenticated(),
            username: session.user().map(|user| user.username.clone()),
        });
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
