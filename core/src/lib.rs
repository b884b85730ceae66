pub mod config;
pub mod context;
pub mod error;
pub mod gateway;
pub mod posts;
pub mod routes;
pub mod session;
pub mod store;
pub mod telemetry;
pub mod types;

pub use config::{ClientSettings, ConfigError};
pub use context::SessionContext;
pub use error::{ApiError, StoreError};
pub use gateway::Gateway;
pub use posts::{PostRepository, PostState};
pub use routes::{Navigation, Route};
pub use session::{SessionController, SessionState};
pub use store::{CredentialStore, FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
pub use types::{
    AuthResponse, AuthTokens, CreatePostRequest, ListParams, ListPostsResponse, Post, PostStats,
    PostSummary, UpdatePostRequest, User,
};
