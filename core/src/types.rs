use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Error body carried inside a failed [`Envelope`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvelopeError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// Uniform wrapper around every backend response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<EnvelopeError>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

/// The credential pair issued by a code exchange or a refresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: i64,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthResponse {
    pub user: User,
    pub tokens: AuthTokens,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthUrlResponse {
    pub auth_url: String,
    #[serde(default)]
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenValidation {
    pub valid: bool,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExchangeRequest<'a> {
    pub auth_code: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct LogoutRequest<'a> {
    pub access_token: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub content: String,
    pub slug: String,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A post as it appears in listings, without its body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostSummary {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub slug: String,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Post> for PostSummary {
    fn from(post: &Post) -> Self {
        Self {
            id: post.id.clone(),
            user_id: post.user_id.clone(),
            title: post.title.clone(),
            slug: post.slug.clone(),
            published: post.published,
            created_at: post.created_at,
            updated_at: post.updated_at,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreatePostRequest {
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdatePostRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListPostsResponse {
    pub posts: Vec<PostSummary>,
    pub limit: u32,
    pub offset: u32,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostStats {
    pub total_published_posts: u64,
    #[serde(default)]
    pub user_posts_count: Option<u64>,
}

/// Pagination and filtering for list and search calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListParams {
    pub limit: u32,
    pub offset: u32,
    pub published_only: Option<bool>,
}

impl ListParams {
    pub const DEFAULT_LIMIT: u32 = 20;

    pub fn page(limit: u32, offset: u32) -> Self {
        Self {
            limit,
            offset,
            published_only: None,
        }
    }

    pub fn published(mut self, published_only: bool) -> Self {
        self.published_only = Some(published_only);
        self
    }

    pub(crate) fn to_query(self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if self.limit > 0 {
            query.push(("limit", self.limit.to_string()));
        }
        if self.offset > 0 {
            query.push(("offset", self.offset.to_string()));
        }
        if let Some(published_only) = self.published_only {
            query.push(("published_only", published_only.to_string()));
        }
        query
    }
}

impl Default for ListParams {
    fn default() -> Self {
        Self::page(Self::DEFAULT_LIMIT, 0)
    }
}
