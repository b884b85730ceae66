//! Single funnel for every HTTP call to the BlogHub backend.
//!
//! Each request carries the stored access token as a bearer credential.
//! When the backend answers 401 the gateway exchanges the refresh token for
//! a new credential and re-dispatches the request once. Concurrent requests
//! that fail against the same expired credential share one refresh call:
//! the first one installs a [`Shared`] future in the in-flight slot and the
//! others await a clone of it. The future empties the slot itself, once,
//! after it settles. A failed refresh clears the store, fires the
//! session-expired hook and navigates to the login page.

use crate::config::ClientSettings;
use crate::error::ApiError;
use crate::routes::{Navigation, Route};
use crate::store::CredentialStore;
use crate::types::{
    AuthResponse, AuthTokens, AuthUrlResponse, CreatePostRequest, Envelope, ExchangeRequest,
    ListParams, ListPostsResponse, LogoutRequest, Post, PostStats, RefreshRequest,
    TokenValidation, UpdatePostRequest, User,
};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use url::Url;

const API_PREFIX: [&str; 2] = ["api", "v1"];

type RefreshOutcome = Result<AuthTokens, ApiError>;
type InflightRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;
type ExpiryHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    http: reqwest::Client,
    base_url: Url,
    store: CredentialStore,
    refresh: Mutex<Option<InflightRefresh>>,
    on_expired: Mutex<Option<ExpiryHook>>,
    navigation: UnboundedSender<Navigation>,
}

/// One logical backend call, replayable for the post-refresh retry.
struct ApiRequest {
    method: Method,
    segments: Vec<String>,
    query: Vec<(&'static str, String)>,
    body: Option<serde_json::Value>,
    fallback: &'static str,
}

impl ApiRequest {
    fn new(method: Method, segments: &[&str], fallback: &'static str) -> Self {
        Self {
            method,
            segments: segments.iter().map(|s| (*s).to_string()).collect(),
            query: Vec::new(),
            body: None,
            fallback,
        }
    }

    fn get(segments: &[&str], fallback: &'static str) -> Self {
        Self::new(Method::GET, segments, fallback)
    }

    fn query(mut self, query: Vec<(&'static str, String)>) -> Self {
        self.query = query;
        self
    }

    fn json(mut self, body: &impl Serialize) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|err| ApiError::Validation(format!("unencodable request body: {err}")))?;
        self.body = Some(value);
        Ok(self)
    }

    fn describe(&self) -> String {
        format!("{} /{}", self.method, self.segments.join("/"))
    }
}

impl Gateway {
    pub fn new(
        settings: &ClientSettings,
        store: CredentialStore,
        navigation: UnboundedSender<Navigation>,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent(concat!("bloghub/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ApiError::from_reqwest)?;
        if settings.api_url.cannot_be_a_base() {
            return Err(ApiError::Validation(format!(
                "api url `{}` cannot be used as a base",
                settings.api_url
            )));
        }
        Ok(Self {
            inner: Arc::new(GatewayInner {
                http,
                base_url: settings.api_url.clone(),
                store,
                refresh: Mutex::new(None),
                on_expired: Mutex::new(None),
                navigation,
            }),
        })
    }

    pub fn store(&self) -> &CredentialStore {
        &self.inner.store
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Run `hook` whenever a failed refresh ends the session. Replaces any
    /// earlier hook.
    pub(crate) fn on_session_expired(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.inner.on_expired.lock() = Some(Arc::new(hook));
    }

    pub(crate) fn navigate(&self, navigation: Navigation) {
        if self.inner.navigation.send(navigation).is_err() {
            debug!("navigation receiver dropped");
        }
    }

    // ===== auth =====

    pub async fn initiate_login(&self) -> Result<AuthUrlResponse, ApiError> {
        let request = ApiRequest::get(&["auth", "google"], "Failed to get Google auth URL");
        self.execute(request).await
    }

    pub async fn exchange_code(&self, auth_code: &str) -> Result<AuthResponse, ApiError> {
        require_non_empty(auth_code, "auth code")?;
        let request = ApiRequest::new(
            Method::POST,
            &["auth", "exchange"],
            "Failed to exchange auth code",
        )
        .json(&ExchangeRequest { auth_code })?;
        self.execute(request).await
    }

    /// Exchange a refresh token for a new credential.
    ///
    /// This call never carries a bearer credential and never enters the
    /// refresh pipeline itself.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<AuthResponse, ApiError> {
        require_non_empty(refresh_token, "refresh token")?;
        let request = ApiRequest::new(Method::POST, &["auth", "refresh"], "Failed to refresh token")
            .json(&RefreshRequest { refresh_token })?;
        let response = self.dispatch(&request, None).await?;
        let data = Self::decode(response, request.fallback).await?;
        required(data, request.fallback)
    }

    /// Tell the backend the current access token is finished with.
    ///
    /// Does nothing when no token is stored. Local state is not touched.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let Some(access_token) = self.inner.store.access_token() else {
            return Ok(());
        };
        let request = ApiRequest::new(Method::POST, &["auth", "logout"], "Failed to logout")
            .json(&LogoutRequest {
                access_token: &access_token,
            })?;
        self.execute_unit(request).await
    }

    pub async fn validate_token(&self) -> Result<TokenValidation, ApiError> {
        let request = ApiRequest::get(&["auth", "validate"], "Failed to validate token");
        self.execute(request).await
    }

    // ===== users =====

    pub async fn get_current_user(&self) -> Result<User, ApiError> {
        if self.inner.store.access_token().is_none() {
            return Err(ApiError::Unauthorized("No access token available".to_string()));
        }
        let validation = self.validate_token().await?;
        match validation.user_id {
            Some(user_id) if validation.valid => self.get_user(&user_id).await,
            _ => Err(ApiError::Unauthorized("Invalid token".to_string())),
        }
    }

    pub async fn get_user(&self, user_id: &str) -> Result<User, ApiError> {
        require_non_empty(user_id, "user id")?;
        let request = ApiRequest::get(&["users", user_id], "Failed to get user data");
        self.execute(request).await
    }

    pub async fn get_public_profile(&self, user_id: &str) -> Result<User, ApiError> {
        require_non_empty(user_id, "user id")?;
        let request = ApiRequest::get(
            &["public", "users", user_id, "profile"],
            "Failed to get user profile",
        );
        self.execute(request).await
    }

    // ===== posts =====

    pub async fn create_post(&self, post: &CreatePostRequest) -> Result<Post, ApiError> {
        require_non_empty(&post.title, "title")?;
        let request =
            ApiRequest::new(Method::POST, &["posts"], "Failed to create post").json(post)?;
        self.execute(request).await
    }

    pub async fn get_post(&self, post_id: &str) -> Result<Post, ApiError> {
        require_non_empty(post_id, "post id")?;
        let request = ApiRequest::get(&["posts", post_id], "Failed to get post");
        self.execute(request).await
    }

    /// Fetch one of the caller's own posts by slug, drafts included.
    pub async fn get_own_post_by_slug(&self, slug: &str) -> Result<Post, ApiError> {
        require_non_empty(slug, "slug")?;
        let request = ApiRequest::get(&["posts", "slug", slug], "Failed to get post for editing");
        self.execute(request).await
    }

    pub async fn get_post_by_slug(&self, slug: &str) -> Result<Post, ApiError> {
        require_non_empty(slug, "slug")?;
        let request = ApiRequest::get(&["public", "posts", "slug", slug], "Failed to get post");
        self.execute(request).await
    }

    pub async fn update_post(
        &self,
        post_id: &str,
        changes: &UpdatePostRequest,
    ) -> Result<Post, ApiError> {
        require_non_empty(post_id, "post id")?;
        let request = ApiRequest::new(Method::PUT, &["posts", post_id], "Failed to update post")
            .json(changes)?;
        self.execute(request).await
    }

    pub async fn delete_post(&self, post_id: &str) -> Result<(), ApiError> {
        require_non_empty(post_id, "post id")?;
        let request = ApiRequest::new(Method::DELETE, &["posts", post_id], "Failed to delete post");
        self.execute_unit(request).await
    }

    pub async fn list_posts(&self, params: ListParams) -> Result<ListPostsResponse, ApiError> {
        let request =
            ApiRequest::get(&["public", "posts"], "Failed to list posts").query(params.to_query());
        self.execute(request).await
    }

    pub async fn list_user_posts(
        &self,
        user_id: &str,
        params: ListParams,
    ) -> Result<ListPostsResponse, ApiError> {
        require_non_empty(user_id, "user id")?;
        let request = ApiRequest::get(
            &["public", "posts", "user", user_id],
            "Failed to get user posts",
        )
        .query(params.to_query());
        self.execute(request).await
    }

    pub async fn search_posts(
        &self,
        query: &str,
        params: ListParams,
    ) -> Result<ListPostsResponse, ApiError> {
        require_non_empty(query, "search query")?;
        let mut pairs = vec![("q", query.to_string())];
        pairs.extend(params.to_query());
        let request =
            ApiRequest::get(&["public", "posts", "search"], "Failed to search posts").query(pairs);
        self.execute(request).await
    }

    pub async fn get_post_stats(&self) -> Result<PostStats, ApiError> {
        let request = ApiRequest::get(&["public", "posts", "stats"], "Failed to get post stats");
        self.execute(request).await
    }

    // ===== pipeline =====

    async fn execute<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let data = self.execute_raw(&request).await?;
        required(data, request.fallback)
    }

    async fn execute_unit(&self, request: ApiRequest) -> Result<(), ApiError> {
        self.execute_raw::<serde_json::Value>(&request)
            .await
            .map(|_| ())
    }

    async fn execute_raw<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
    ) -> Result<Option<T>, ApiError> {
        let sent_with = self.inner.store.access_token();
        let response = self.dispatch(request, sent_with.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Self::decode(response, request.fallback).await;
        }

        let rejection = Self::rejection(response).await;
        debug!(request = %request.describe(), "credential rejected, refreshing");
        let tokens = self
            .refreshed_credential(sent_with.as_deref(), rejection)
            .await?;

        let retry = self.dispatch(request, Some(&tokens.access_token)).await?;
        if retry.status() == StatusCode::UNAUTHORIZED {
            return Err(Self::rejection(retry).await);
        }
        Self::decode(retry, request.fallback).await
    }

    /// Resolve the credential to retry with after a 401.
    async fn refreshed_credential(
        &self,
        sent_with: Option<&str>,
        rejection: ApiError,
    ) -> RefreshOutcome {
        let inflight = {
            let mut slot = self.inner.refresh.lock();
            match slot.as_ref() {
                Some(inflight) => inflight.clone(),
                None => {
                    // A peer may already have replaced the credential this
                    // request was sent with.
                    if let Some(current) = self.inner.store.get() {
                        if sent_with != Some(current.access_token.as_str()) {
                            return Ok(current);
                        }
                    }
                    let Some(refresh_token) = self.inner.store.refresh_token() else {
                        return Err(rejection);
                    };
                    let gateway = self.clone();
                    let inflight = async move { gateway.run_refresh(refresh_token).await }
                        .boxed()
                        .shared();
                    *slot = Some(inflight.clone());
                    inflight
                }
            }
        };
        inflight.await
    }

    async fn run_refresh(&self, refresh_token: String) -> RefreshOutcome {
        let outcome = match self.refresh_token(&refresh_token).await {
            Ok(auth) => self
                .inner
                .store
                .put(&auth.tokens, &auth.user)
                .map(|()| {
                    info!(user_id = %auth.user.id, "session credential refreshed");
                    auth.tokens
                })
                .map_err(ApiError::from),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(tokens) => {
                self.inner.refresh.lock().take();
                Ok(tokens)
            }
            Err(err) => {
                warn!(%err, "credential refresh failed, ending session");
                if let Err(clear_err) = self.inner.store.clear() {
                    warn!(%clear_err, "failed to clear stored credential");
                }
                self.inner.refresh.lock().take();
                let hook = self.inner.on_expired.lock().clone();
                if let Some(hook) = hook {
                    hook();
                }
                self.navigate(Navigation::to(Route::login()));
                Err(ApiError::RefreshFailed(err.message()))
            }
        }
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<Response, ApiError> {
        let url = self.endpoint(&request.segments)?;
        debug!(request = %request.describe(), authenticated = bearer.is_some(), "dispatching");
        let mut builder = self.inner.http.request(request.method.clone(), url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        builder.send().await.map_err(ApiError::from_reqwest)
    }

    fn endpoint(&self, segments: &[String]) -> Result<Url, ApiError> {
        let mut url = self.inner.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::Validation("api url cannot be used as a base".to_string()))?
            .pop_if_empty()
            .extend(API_PREFIX)
            .extend(segments);
        Ok(url)
    }

    async fn decode<T: DeserializeOwned>(
        response: Response,
        fallback: &str,
    ) -> Result<Option<T>, ApiError> {
        let status = response.status();
        let body = response.bytes().await.map_err(ApiError::from_reqwest)?;
        let envelope: Envelope<T> = match serde_json::from_slice(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(ApiError::Backend {
                    code: status.as_u16().to_string(),
                    message: fallback.to_string(),
                })
            }
            Err(err) => return Err(ApiError::Decode(err.to_string())),
        };
        if !envelope.success || !status.is_success() {
            let (code, message) = match envelope.error {
                Some(error) if !error.message.is_empty() => (error.code, error.message),
                Some(error) => (error.code, fallback.to_string()),
                None => (status.as_u16().to_string(), fallback.to_string()),
            };
            return Err(ApiError::Backend { code, message });
        }
        Ok(envelope.data)
    }

    async fn rejection(response: Response) -> ApiError {
        let message = response
            .bytes()
            .await
            .ok()
            .and_then(|body| serde_json::from_slice::<Envelope<serde_json::Value>>(&body).ok())
            .and_then(|envelope| envelope.error)
            .map(|error| error.message)
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| "Unauthorized".to_string());
        ApiError::Unauthorized(message)
    }
}

fn required<T>(data: Option<T>, fallback: &str) -> Result<T, ApiError> {
    data.ok_or_else(|| ApiError::Decode(format!("{fallback}: response carried no data")))
}

fn require_non_empty(value: &str, what: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        Err(ApiError::Validation(format!("{what} is required")))
    } else {
        Ok(())
    }
}
