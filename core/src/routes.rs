//! Navigation side effects and the client route table.
//!
//! The core never renders anything. When a flow needs the user to land
//! somewhere else (the identity provider, the login page after a failed
//! refresh, the dashboard after a callback) it emits a [`Navigation`] on the
//! session context's channel and the front end decides how to follow it.

use crate::session::{SessionController, SessionState};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Navigation {
    /// Full navigation away from the application, e.g. to the identity provider.
    External { url: Url },
    To { route: Route },
}

impl Navigation {
    pub fn to(route: Route) -> Self {
        Self::To { route }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "page", rename_all = "snake_case")]
pub enum Route {
    Home,
    Login { error: Option<String> },
    Callback,
    Dashboard,
    Explore,
    Write,
    Post { slug: String },
    EditPost { slug: String },
    Profile,
    Settings,
}

impl Route {
    pub fn login() -> Self {
        Self::Login { error: None }
    }

    pub fn login_error(reason: impl Into<String>) -> Self {
        Self::Login {
            error: Some(reason.into()),
        }
    }

    pub fn path(&self) -> String {
        match self {
            Self::Home => "/".to_string(),
            Self::Login { error: None } => "/login".to_string(),
            Self::Login { error: Some(error) } => {
                let encoded: String =
                    url::form_urlencoded::byte_serialize(error.as_bytes()).collect();
                format!("/login?error={encoded}")
            }
            Self::Callback => "/auth/callback".to_string(),
            Self::Dashboard => "/dashboard".to_string(),
            Self::Explore => "/explore".to_string(),
            Self::Write => "/write".to_string(),
            Self::Post { slug } => format!("/post/{slug}"),
            Self::EditPost { slug } => format!("/post/{slug}/edit"),
            Self::Profile => "/profile".to_string(),
            Self::Settings => "/settings".to_string(),
        }
    }

    pub fn requires_auth(&self) -> bool {
        matches!(
            self,
            Self::Dashboard | Self::Write | Self::EditPost { .. } | Self::Profile | Self::Settings
        )
    }
}

/// Redirect for a protected route visited without a session.
///
/// Nothing is decided while the session is still loading.
pub fn guard(route: &Route, state: &SessionState) -> Option<Navigation> {
    if route.requires_auth() && !state.is_loading && !state.is_authenticated() {
        Some(Navigation::to(Route::login()))
    } else {
        None
    }
}

/// Where the OAuth callback page sends the user, given its query parameters.
pub async fn resolve_callback(
    session: &SessionController,
    auth_code: Option<&str>,
    error: Option<&str>,
) -> Navigation {
    if let Some(error) = error.filter(|e| !e.is_empty()) {
        return Navigation::to(Route::login_error(error));
    }
    match auth_code.filter(|code| !code.is_empty()) {
        Some(code) => match session.complete_callback(code).await {
            Ok(_) => Navigation::to(Route::Dashboard),
            Err(err) => {
                tracing::warn!(%err, "auth callback failed");
                Navigation::to(Route::login_error("callback_failed"))
            }
        },
        None => Navigation::to(Route::login_error("no_auth_code")),
    }
}
