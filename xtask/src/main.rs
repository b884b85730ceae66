use anyhow::{bail, ensure, Context, Result};
use bloghub_core::{
    telemetry, CreatePostRequest, CredentialStore, FileKeyValueStore, ListParams, Navigation, Route,
};
use bloghub_tests::MockBackend;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "xtask", version, about = "Automation helpers for BlogHub")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sign in, browse, write a post and sign out against an in-process mock backend.
    Smoke,
}

fn main() -> Result<()> {
    telemetry::init_tracing(EnvFilter::new("info"))?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Smoke => smoke_test(),
    }
}

fn smoke_test() -> Result<()> {
    let runtime = Runtime::new()?;
    runtime.block_on(async {
        let backend = MockBackend::start().await;
        backend.mount_happy_path("smoke-code", "smoke-user").await;
        let storage = FileKeyValueStore::temporary()?;
        info!(path = %storage.path().display(), "using scratch credential file");
        let (context, mut navigation) = backend.context(CredentialStore::new(Arc::new(storage)));
        let session = context.session();

        session.login().await?;
        match navigation.try_recv() {
            Ok(Navigation::External { url }) => info!(%url, "login redirect"),
            other => bail!("expected an identity provider redirect, got {other:?}"),
        }

        let landing =
            bloghub_core::routes::resolve_callback(session, Some("smoke-code"), None).await;
        ensure!(
            landing == Navigation::to(Route::Dashboard),
            "callback landed on {landing:?}"
        );

        session.check_auth().await;
        let user = session.state().user.context("no user after sign-in")?;
        info!(user_id = %user.id, "session established");

        let posts = context.posts();
        posts.fetch_posts(ListParams::default()).await;
        let listed = posts.state();
        if let Some(error) = listed.error {
            bail!("listing failed: {error}");
        }
        info!(posts = listed.posts.len(), "fetched public posts");

        let created = posts
            .create_post(CreatePostRequest {
                title: "Hello from xtask".to_string(),
                content: "Smoke test body".to_string(),
                ..CreatePostRequest::default()
            })
            .await?;
        info!(post_id = %created.id, slug = %created.slug, "created post");

        session.logout().await;
        ensure!(
            !session.state().is_authenticated() && context.store().get().is_none(),
            "session survived logout"
        );
        let requests = backend
            .server()
            .received_requests()
            .await
            .map_or(0, |recorded| recorded.len());
        info!(requests, "smoke test passed");
        Ok::<_, anyhow::Error>(())
    })
}
