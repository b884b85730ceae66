use crate::error::ApiError;
use crate::gateway::Gateway;
use crate::routes::Navigation;
use crate::store::CredentialStore;
use crate::types::User;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;

/// Observable authentication state.
///
/// A session is authenticated exactly when a user is present, so the two can
/// never disagree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub user: Option<User>,
    pub is_loading: bool,
    pub error: Option<String>,
    /// Startup reconciliation has settled.
    pub is_initialized: bool,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

/// Drives login, callback completion, logout and startup reconciliation.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    gateway: Gateway,
    state: watch::Sender<SessionState>,
    auth_checked: AtomicBool,
}

impl SessionController {
    pub fn new(gateway: Gateway) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        let inner = Arc::new(ControllerInner {
            gateway,
            state,
            auth_checked: AtomicBool::new(false),
        });
        // The controller owns the gateway; a strong handle here would cycle.
        let controller: Weak<ControllerInner> = Arc::downgrade(&inner);
        inner.gateway.on_session_expired(move || {
            if let Some(inner) = controller.upgrade() {
                info!("session expired");
                inner.state.send_modify(signed_out);
            }
        });
        Self { inner }
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Receive every state change from now on.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn gateway(&self) -> &Gateway {
        &self.inner.gateway
    }

    fn store(&self) -> &CredentialStore {
        self.inner.gateway.store()
    }

    fn update(&self, apply: impl FnOnce(&mut SessionState)) {
        self.inner.state.send_modify(apply);
    }

    /// Ask the backend for the identity provider URL and navigate to it.
    pub async fn login(&self) -> Result<(), ApiError> {
        self.update(|state| {
            state.is_loading = true;
            state.error = None;
        });

        let target = match self.inner.gateway.initiate_login().await {
            Ok(response) => Url::parse(&response.auth_url)
                .map_err(|err| ApiError::Decode(format!("invalid auth url: {err}"))),
            Err(err) => Err(err),
        };

        match target {
            Ok(url) => {
                info!(
                    host = url.host_str().unwrap_or_default(),
                    "redirecting to identity provider"
                );
                self.inner.gateway.navigate(Navigation::External { url });
                self.update(|state| state.is_loading = false);
                Ok(())
            }
            Err(err) => {
                self.update(|state| {
                    state.error = Some(err.message());
                    state.is_loading = false;
                });
                Err(err)
            }
        }
    }

    /// Exchange the authorization code the identity provider returned.
    pub async fn complete_callback(&self, auth_code: &str) -> Result<User, ApiError> {
        self.update(|state| {
            state.is_loading = true;
            state.error = None;
        });

        let outcome = match self.inner.gateway.exchange_code(auth_code).await {
            Ok(auth) => self
                .store()
                .put(&auth.tokens, &auth.user)
                .map(|()| auth.user)
                .map_err(ApiError::from),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(user) => {
                info!(user_id = %user.id, "signed in");
                let signed_in = user.clone();
                self.update(|state| {
                    state.user = Some(signed_in);
                    state.is_loading = false;
                    state.error = None;
                    state.is_initialized = true;
                });
                Ok(user)
            }
            Err(err) => {
                warn!(%err, "auth code exchange failed");
                self.update(|state| {
                    state.error = Some(err.message());
                    state.is_loading = false;
                });
                Err(err)
            }
        }
    }

    /// End the session. Local state is always cleared, even when the backend
    /// cannot be reached.
    pub async fn logout(&self) {
        self.update(|state| state.is_loading = true);
        if let Err(err) = self.inner.gateway.logout().await {
            warn!(%err, "logout request failed");
        }
        if let Err(err) = self.store().clear() {
            warn!(%err, "failed to clear stored credential");
        }
        self.update(|state| {
            *state = SessionState {
                is_initialized: true,
                ..SessionState::default()
            };
        });
        info!("signed out");
    }

    /// Reconcile the stored session with the backend. Runs once per
    /// controller; later calls return immediately.
    pub async fn check_auth(&self) {
        if self.inner.auth_checked.swap(true, Ordering::SeqCst) {
            debug!("auth already checked, skipping");
            return;
        }

        let store = self.store();
        let (Some(cached), Some(_)) = (store.get_user(), store.access_token()) else {
            self.update(|state| {
                state.user = None;
                state.is_initialized = true;
            });
            return;
        };

        // Publish the cached user before any network round trip.
        self.update(|state| {
            state.user = Some(cached);
            state.error = None;
        });

        match self.inner.gateway.validate_token().await {
            Ok(validation) if validation.valid => {
                let fetched = match validation.user_id {
                    Some(user_id) => self.inner.gateway.get_user(&user_id).await,
                    None => Err(ApiError::Decode(
                        "token validation carried no user id".to_string(),
                    )),
                };
                match fetched {
                    Ok(current) => {
                        if let Err(err) = self.store().put_user(&current) {
                            warn!(%err, "failed to cache current user");
                        }
                        self.update(|state| {
                            state.user = Some(current);
                            state.error = None;
                            state.is_initialized = true;
                        });
                    }
                    Err(err @ ApiError::RefreshFailed(_)) => {
                        warn!(%err, "session ended while fetching current user");
                        self.update(signed_out);
                    }
                    Err(err) => {
                        warn!(%err, "failed to fetch current user, keeping cached profile");
                        self.update(|state| state.is_initialized = true);
                    }
                }
            }
            Ok(_) => {
                info!("stored token is no longer valid, refreshing");
                if let Err(err) = self.refresh_auth().await {
                    debug!(%err, "startup refresh did not restore the session");
                }
            }
            Err(err) => {
                warn!(%err, "auth check failed, attempting refresh");
                if let Err(err) = self.refresh_auth().await {
                    debug!(%err, "startup refresh did not restore the session");
                }
            }
        }
    }

    /// Exchange the stored refresh token directly, outside the gateway's
    /// in-flight guard. Any failure ends the session.
    pub async fn refresh_auth(&self) -> Result<User, ApiError> {
        let Some(refresh_token) = self.store().refresh_token() else {
            self.end_session();
            return Err(ApiError::Unauthorized(
                "No refresh token available".to_string(),
            ));
        };

        let outcome = match self.inner.gateway.refresh_token(&refresh_token).await {
            Ok(auth) => self
                .store()
                .put(&auth.tokens, &auth.user)
                .map(|()| auth.user)
                .map_err(ApiError::from),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(user) => {
                info!(user_id = %user.id, "session refreshed");
                let refreshed = user.clone();
                self.update(|state| {
                    state.user = Some(refreshed);
                    state.error = None;
                    state.is_initialized = true;
                });
                Ok(user)
            }
            Err(err) => {
                warn!(%err, "session refresh failed");
                self.end_session();
                Err(ApiError::RefreshFailed(err.message()))
            }
        }
    }

    /// Replace the cached profile, e.g. after the user edits their settings.
    pub fn update_user(&self, user: User) -> Result<(), ApiError> {
        self.store().put_user(&user)?;
        self.update(|state| state.user = Some(user));
        Ok(())
    }

    pub fn clear_error(&self) {
        self.update(|state| state.error = None);
    }

    fn end_session(&self) {
        if let Err(err) = self.store().clear() {
            warn!(%err, "failed to clear stored credential");
        }
        self.update(signed_out);
    }
}

fn signed_out(state: &mut SessionState) {
    state.user = None;
    state.is_loading = false;
    state.is_initialized = true;
}
