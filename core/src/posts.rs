use crate::error::ApiError;
use crate::gateway::Gateway;
use crate::types::{
    CreatePostRequest, ListParams, ListPostsResponse, Post, PostStats, PostSummary,
    UpdatePostRequest,
};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostState {
    pub posts: Vec<PostSummary>,
    pub current_post: Option<Post>,
    pub user_posts: Vec<PostSummary>,
    pub stats: Option<PostStats>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub has_more: bool,
    pub current_page: u32,
}

impl Default for PostState {
    fn default() -> Self {
        Self {
            posts: Vec::new(),
            current_post: None,
            user_posts: Vec::new(),
            stats: None,
            is_loading: false,
            error: None,
            has_more: true,
            current_page: 0,
        }
    }
}

/// Post listings and the post being viewed or edited, kept in sync with the
/// backend through the gateway.
#[derive(Clone)]
pub struct PostRepository {
    gateway: Gateway,
    inner: Arc<RwLock<PostState>>,
}

impl PostRepository {
    pub fn new(gateway: Gateway) -> Self {
        Self {
            gateway,
            inner: Arc::new(RwLock::new(PostState::default())),
        }
    }

    pub fn state(&self) -> PostState {
        self.inner.read().clone()
    }

    pub async fn create_post(&self, request: CreatePostRequest) -> Result<Post, ApiError> {
        self.begin();
        match self.gateway.create_post(&request).await {
            Ok(post) => {
                let mut state = self.inner.write();
                if !state.user_posts.is_empty() {
                    state.user_posts.insert(0, PostSummary::from(&post));
                }
                state.is_loading = false;
                Ok(post)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    pub async fn update_post(
        &self,
        post_id: &str,
        changes: UpdatePostRequest,
    ) -> Result<Post, ApiError> {
        self.begin();
        match self.gateway.update_post(post_id, &changes).await {
            Ok(updated) => {
                let mut guard = self.inner.write();
                let state = &mut *guard;
                let summary = PostSummary::from(&updated);
                for entry in state
                    .posts
                    .iter_mut()
                    .chain(state.user_posts.iter_mut())
                    .filter(|entry| entry.id == post_id)
                {
                    *entry = summary.clone();
                }
                if state.current_post.as_ref().is_some_and(|p| p.id == post_id) {
                    state.current_post = Some(updated.clone());
                }
                state.is_loading = false;
                Ok(updated)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    pub async fn delete_post(&self, post_id: &str) -> Result<(), ApiError> {
        self.begin();
        match self.gateway.delete_post(post_id).await {
            Ok(()) => {
                let mut state = self.inner.write();
                state.posts.retain(|post| post.id != post_id);
                state.user_posts.retain(|post| post.id != post_id);
                if state.current_post.as_ref().is_some_and(|p| p.id == post_id) {
                    state.current_post = None;
                }
                state.is_loading = false;
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Load a page of public posts. Offset zero replaces the list, any other
    /// offset appends to it.
    pub async fn fetch_posts(&self, params: ListParams) {
        let params = published_by_default(params);
        self.begin();
        match self.gateway.list_posts(params).await {
            Ok(page) => self.accumulate(page, params, |state| &mut state.posts),
            Err(err) => {
                self.fail(err);
            }
        }
    }

    pub async fn fetch_user_posts(&self, user_id: &str, params: ListParams) {
        self.begin();
        match self.gateway.list_user_posts(user_id, params).await {
            Ok(page) => self.accumulate(page, params, |state| &mut state.user_posts),
            Err(err) => {
                self.fail(err);
            }
        }
    }

    pub async fn search_posts(&self, query: &str, params: ListParams) {
        let params = published_by_default(params);
        self.begin();
        match self.gateway.search_posts(query, params).await {
            Ok(page) => self.accumulate(page, params, |state| &mut state.posts),
            Err(err) => {
                self.fail(err);
            }
        }
    }

    pub async fn fetch_post(&self, post_id: &str) {
        self.begin();
        let result = self.gateway.get_post(post_id).await;
        self.settle_current(result);
    }

    pub async fn fetch_post_by_slug(&self, slug: &str) {
        self.begin();
        let result = self.gateway.get_post_by_slug(slug).await;
        self.settle_current(result);
    }

    /// Load one of the caller's own posts for editing, drafts included.
    pub async fn fetch_post_for_edit(&self, slug: &str) -> Result<Post, ApiError> {
        self.begin();
        match self.gateway.get_own_post_by_slug(slug).await {
            Ok(post) => {
                let mut state = self.inner.write();
                state.current_post = Some(post.clone());
                state.is_loading = false;
                Ok(post)
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    pub async fn fetch_stats(&self) {
        match self.gateway.get_post_stats().await {
            Ok(stats) => self.inner.write().stats = Some(stats),
            Err(err) => warn!(%err, "failed to fetch post stats"),
        }
    }

    pub fn clear_current_post(&self) {
        self.inner.write().current_post = None;
    }

    pub fn clear_error(&self) {
        self.inner.write().error = None;
    }

    pub fn reset(&self) {
        let mut state = self.inner.write();
        state.posts.clear();
        state.user_posts.clear();
        state.current_page = 0;
        state.has_more = true;
    }

    fn begin(&self) {
        let mut state = self.inner.write();
        state.is_loading = true;
        state.error = None;
    }

    fn fail(&self, err: ApiError) -> ApiError {
        let mut state = self.inner.write();
        state.error = Some(err.message());
        state.is_loading = false;
        err
    }

    fn settle_current(&self, result: Result<Post, ApiError>) {
        match result {
            Ok(post) => {
                let mut state = self.inner.write();
                state.current_post = Some(post);
                state.is_loading = false;
            }
            Err(err) => {
                self.fail(err);
            }
        }
    }

    fn accumulate(
        &self,
        page: ListPostsResponse,
        params: ListParams,
        list: impl FnOnce(&mut PostState) -> &mut Vec<PostSummary>,
    ) {
        let returned = page.posts.len() as u64;
        let mut state = self.inner.write();
        let target = list(&mut state);
        if params.offset == 0 {
            *target = page.posts;
        } else {
            target.extend(page.posts);
        }
        state.has_more = u64::from(params.offset) + returned < page.total;
        state.current_page = params.offset.checked_div(params.limit).unwrap_or(0);
        state.is_loading = false;
    }
}

fn published_by_default(params: ListParams) -> ListParams {
    if params.published_only.is_some() {
        params
    } else {
        params.published(true)
    }
}
