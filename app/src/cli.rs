use clap::{Args, Parser, Subcommand};
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "bloghub", version, about = "BlogHub command-line client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
    /// Backend base URL, overriding bloghub.yaml and BLOGHUB_API_URL.
    #[arg(long, global = true)]
    pub api_url: Option<Url>,
    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start Google sign-in and print the URL to open.
    Login,
    /// Complete sign-in with the parameters the identity provider returned.
    Callback {
        #[arg(long)]
        code: Option<String>,
        #[arg(long)]
        error: Option<String>,
    },
    Logout,
    /// Reconcile the stored session with the backend.
    Status,
    /// Fetch the signed-in user's profile from the backend.
    Whoami,
    #[command(subcommand)]
    Posts(PostsCommand),
}

#[derive(Subcommand, Debug)]
pub enum PostsCommand {
    /// Published posts from every author.
    List(PageArgs),
    /// Your own posts, drafts included.
    Mine(PageArgs),
    User {
        user_id: String,
        #[command(flatten)]
        page: PageArgs,
    },
    Search {
        query: String,
        #[command(flatten)]
        page: PageArgs,
    },
    Show {
        slug: String,
    },
    /// Load one of your posts for editing.
    Edit {
        slug: String,
    },
    Create {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        content: String,
        #[arg(long)]
        slug: Option<String>,
        #[arg(long)]
        publish: bool,
    },
    Update {
        post_id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
        #[arg(long)]
        slug: Option<String>,
        #[arg(long, conflicts_with = "unpublish")]
        publish: bool,
        #[arg(long)]
        unpublish: bool,
    },
    Delete {
        post_id: String,
    },
    Stats,
}

#[derive(Args, Debug, Clone, Copy)]
pub struct PageArgs {
    #[arg(long, default_value_t = 20)]
    pub limit: u32,
    #[arg(long, default_value_t = 0)]
    pub offset: u32,
}
