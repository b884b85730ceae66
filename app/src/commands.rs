use crate::cli::{Command, PageArgs, PostsCommand};
use crate::render;
use anyhow::{anyhow, bail, Context, Result};
use bloghub_core::routes::{guard, resolve_callback};
use bloghub_core::{
    CreatePostRequest, ListParams, Navigation, PostState, Route, SessionContext,
    UpdatePostRequest, User,
};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;

/// Executes one CLI command against a session context and prints the result.
pub struct Runner {
    context: SessionContext,
    navigation: UnboundedReceiver<Navigation>,
    json: bool,
}

impl Runner {
    pub fn new(
        context: SessionContext,
        navigation: UnboundedReceiver<Navigation>,
        json: bool,
    ) -> Self {
        Self {
            context,
            navigation,
            json,
        }
    }

    pub async fn run(&mut self, command: Command) -> Result<()> {
        let outcome = self.dispatch(command).await;
        self.flush_navigation()?;
        outcome
    }

    async fn dispatch(&self, command: Command) -> Result<()> {
        match command {
            Command::Login => {
                self.context.session().login().await?;
                Ok(())
            }
            Command::Callback { code, error } => self.callback(code, error).await,
            Command::Logout => {
                self.context.session().logout().await;
                self.emit(&self.context.session().state(), || "Signed out.".to_string())
            }
            Command::Status => {
                self.context.session().check_auth().await;
                let state = self.context.session().state();
                self.emit(&state, || render::session(&state))
            }
            Command::Whoami => {
                self.require(Route::Profile).await?;
                let user = self.context.gateway().get_current_user().await?;
                self.emit(&user, || render::user(&user))
            }
            Command::Posts(command) => self.posts(command).await,
        }
    }

    async fn callback(&self, code: Option<String>, error: Option<String>) -> Result<()> {
        let target = resolve_callback(
            self.context.session(),
            code.as_deref(),
            error.as_deref(),
        )
        .await;
        self.print_navigation(&target)?;
        match target {
            Navigation::To {
                route: Route::Login {
                    error: Some(reason),
                },
            } => {
                let detail = self.context.session().state().error;
                match detail {
                    Some(detail) => bail!("sign-in failed ({reason}): {detail}"),
                    None => bail!("sign-in failed ({reason})"),
                }
            }
            _ => {
                let state = self.context.session().state();
                self.emit(&state, || render::session(&state))
            }
        }
    }

    async fn posts(&self, command: PostsCommand) -> Result<()> {
        let posts = self.context.posts().clone();
        match command {
            PostsCommand::List(page) => {
                posts.fetch_posts(params(page)).await;
                let state = settled(posts.state())?;
                self.emit(&state.posts, || render::listing(&state.posts, &state))
            }
            PostsCommand::Mine(page) => {
                let user = self.require(Route::Dashboard).await?;
                posts
                    .fetch_user_posts(&user.id, params(page).published(false))
                    .await;
                let state = settled(posts.state())?;
                self.emit(&state.user_posts, || {
                    render::listing(&state.user_posts, &state)
                })
            }
            PostsCommand::User { user_id, page } => {
                let author = self.context.gateway().get_public_profile(&user_id).await?;
                posts.fetch_user_posts(&user_id, params(page)).await;
                let state = settled(posts.state())?;
                self.emit(&state.user_posts, || {
                    format!(
                        "Posts by {}\n{}",
                        author.name,
                        render::listing(&state.user_posts, &state)
                    )
                })
            }
            PostsCommand::Search { query, page } => {
                posts.search_posts(&query, params(page)).await;
                let state = settled(posts.state())?;
                self.emit(&state.posts, || render::listing(&state.posts, &state))
            }
            PostsCommand::Show { slug } => {
                posts.fetch_post_by_slug(&slug).await;
                let post = settled(posts.state())?
                    .current_post
                    .ok_or_else(|| anyhow!("post `{slug}` not found"))?;
                self.emit(&post, || render::post(&post))
            }
            PostsCommand::Edit { slug } => {
                self.require(Route::EditPost { slug: slug.clone() }).await?;
                let post = posts.fetch_post_for_edit(&slug).await?;
                self.emit(&post, || render::post(&post))
            }
            PostsCommand::Create {
                title,
                content,
                slug,
                publish,
            } => {
                self.require(Route::Write).await?;
                let request = CreatePostRequest {
                    title,
                    content,
                    slug,
                    published: Some(publish),
                };
                let post = posts.create_post(request).await?;
                self.emit(&post, || format!("Created {} (/{})", post.id, post.slug))
            }
            PostsCommand::Update {
                post_id,
                title,
                content,
                slug,
                publish,
                unpublish,
            } => {
                self.require(Route::Dashboard).await?;
                let published = match (publish, unpublish) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                };
                let changes = UpdatePostRequest {
                    title,
                    content,
                    slug,
                    published,
                };
                let post = posts.update_post(&post_id, changes).await?;
                self.emit(&post, || format!("Updated {} (/{})", post.id, post.slug))
            }
            PostsCommand::Delete { post_id } => {
                self.require(Route::Dashboard).await?;
                posts.delete_post(&post_id).await?;
                self.emit(&post_id, || format!("Deleted {post_id}"))
            }
            PostsCommand::Stats => {
                posts.fetch_stats().await;
                let stats = posts
                    .state()
                    .stats
                    .context("post statistics are unavailable")?;
                self.emit(&stats, || render::stats(&stats))
            }
        }
    }

    /// Reconcile the session and refuse to continue when `route` needs a
    /// signed-in user and there is none.
    async fn require(&self, route: Route) -> Result<User> {
        self.context.session().check_auth().await;
        let state = self.context.session().state();
        if let Some(redirect) = guard(&route, &state) {
            debug!(route = %route.path(), "protected route without session");
            self.print_navigation(&redirect)?;
            bail!("not signed in; run `bloghub login` first");
        }
        state
            .user
            .ok_or_else(|| anyhow!("not signed in; run `bloghub login` first"))
    }

    fn flush_navigation(&mut self) -> Result<()> {
        while let Ok(navigation) = self.navigation.try_recv() {
            self.print_navigation(&navigation)?;
        }
        Ok(())
    }

    fn print_navigation(&self, navigation: &Navigation) -> Result<()> {
        self.emit(navigation, || render::navigation(navigation))
    }

    fn emit<T: Serialize + ?Sized>(&self, value: &T, text: impl FnOnce() -> String) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            println!("{}", text());
        }
        Ok(())
    }
}

fn params(page: PageArgs) -> ListParams {
    ListParams::page(page.limit, page.offset)
}

/// The repository records fetch failures in its state instead of returning them.
fn settled(state: PostState) -> Result<PostState> {
    if let Some(error) = &state.error {
        bail!("{error}");
    }
    Ok(state)
}
