pub mod cli;
pub mod commands;
pub mod render;

pub use cli::{Cli, Command, PostsCommand};
pub use commands::Runner;
