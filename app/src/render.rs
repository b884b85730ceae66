//! Plain-text rendering for terminal output.

use bloghub_core::{Navigation, Post, PostState, PostStats, PostSummary, SessionState, User};
use std::fmt::Write;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn user(user: &User) -> String {
    let mut out = format!("{} <{}>\n  id: {}", user.name, user.email, user.id);
    if let Some(location) = &user.location {
        let _ = write!(out, "\n  location: {location}");
    }
    if let Some(website) = &user.website {
        let _ = write!(out, "\n  website: {website}");
    }
    if let Some(bio) = &user.bio {
        let _ = write!(out, "\n  bio: {bio}");
    }
    if !user.is_active {
        out.push_str("\n  (inactive)");
    }
    out
}

pub fn session(state: &SessionState) -> String {
    let mut out = match &state.user {
        Some(user) => format!("Signed in as {} <{}>", user.name, user.email),
        None => "Not signed in".to_string(),
    };
    if let Some(error) = &state.error {
        let _ = write!(out, "\nerror: {error}");
    }
    out
}

pub fn summary_line(post: &PostSummary) -> String {
    let status = if post.published { "published" } else { "draft" };
    format!(
        "{}  {}  [{}]  {}  /{}",
        post.created_at.format(DATE_FORMAT),
        post.id,
        status,
        post.title,
        post.slug
    )
}

pub fn listing(posts: &[PostSummary], state: &PostState) -> String {
    if posts.is_empty() {
        return "No posts.".to_string();
    }
    let mut out = posts
        .iter()
        .map(summary_line)
        .collect::<Vec<_>>()
        .join("\n");
    if state.has_more {
        let _ = write!(out, "\n(page {}, more available)", state.current_page + 1);
    }
    out
}

pub fn post(post: &Post) -> String {
    let status = if post.published { "published" } else { "draft" };
    format!(
        "{}\n/{} ({status}, updated {})\n\n{}",
        post.title,
        post.slug,
        post.updated_at.format(DATE_FORMAT),
        post.content
    )
}

pub fn stats(stats: &PostStats) -> String {
    let mut out = format!("published posts: {}", stats.total_published_posts);
    if let Some(own) = stats.user_posts_count {
        let _ = write!(out, "\nyour posts: {own}");
    }
    out
}

pub fn navigation(navigation: &Navigation) -> String {
    match navigation {
        Navigation::External { url } => format!("Open {url} in your browser to continue."),
        Navigation::To { route } => format!("-> {}", route.path()),
    }
}
