//! Mock BlogHub backend shared by the integration tests and `xtask smoke`.

use bloghub_core::{
    ClientSettings, CredentialStore, KeyValueStore, MemoryKeyValueStore, Navigation,
    SessionContext,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};


pub const API: &str = "/api/v1";

pub struct MockBackend {
    server: MockServer,
}

impl MockBackend {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn server(&self) -> &MockServer {
        &self.server
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn settings(&self) -> ClientSettings {
        ClientSettings::for_api(&self.server.uri()).expect("mock server url")
    }

    pub fn context(
        &self,
        store: CredentialStore,
    ) -> (SessionContext, UnboundedReceiver<Navigation>) {
        SessionContext::new(&self.settings(), store).expect("session context")
    }

    /// Number of requests the server has seen for `endpoint` (relative to the API prefix).
    pub async fn hits(&self, endpoint: &str) -> usize {
        let full = format!("{API}{endpoint}");
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path() == full)
            .count()
    }

    /// Mount a well-behaved backend for one user: login, exchange, validation,
    /// profile, a post listing, post creation and logout.
    pub async fn mount_happy_path(&self, code: &str, user_id: &str) {
        let user = user_json(user_id, "Smoke Tester");
        Mock::given(method("GET"))
            .and(path(format!("{API}/auth/google")))
            .respond_with(ok(json!({
                "auth_url": "https://accounts.google.com/o/oauth2/v2/auth?client_id=bloghub",
                "state": "state-1"
            })))
            .mount(&self.server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("{API}/auth/exchange")))
            .and(body_json(json!({ "auth_code": code })))
            .respond_with(ok(auth_json("access-1", "refresh-1", user.clone())))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{API}/auth/validate")))
            .and(header("authorization", "Bearer access-1"))
            .respond_with(ok(json!({ "valid": true, "user_id": user_id })))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{API}/users/{user_id}")))
            .respond_with(ok(user))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{API}/public/posts")))
            .respond_with(ok(list_json(
                vec![summary_json("p1", user_id), summary_json("p2", user_id)],
                20,
                0,
                2,
            )))
            .mount(&self.server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("{API}/posts")))
            .respond_with(ok(post_json("p3", user_id, "hello-smoke")))
            .mount(&self.server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("{API}/auth/logout")))
            .respond_with(ok(Value::Null))
            .mount(&self.server)
            .await;
    }
}

pub fn ok(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "success": true,
        "message": "ok",
        "data": data
    }))
}

pub fn failure(status: u16, code: &str, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(json!({
        "success": false,
        "message": message,
        "error": { "code": code, "message": message }
    }))
}

pub fn user_json(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "email": format!("{id}@example.com"),
        "name": name,
        "picture": null,
        "is_active": true,
        "created_at": "2025-01-01T00:00:00Z",
        "updated_at": "2025-01-02T00:00:00Z"
    })
}

pub fn auth_json(access: &str, refresh: &str, user: Value) -> Value {
    json!({
        "user": user,
        "tokens": {
            "access_token": access,
            "refresh_token": refresh,
            "token_type": "Bearer",
            "expires_in": 3600
        }
    })
}

pub fn summary_json(id: &str, user_id: &str) -> Value {
    json!({
        "id": id,
        "user_id": user_id,
        "title": format!("Post {id}"),
        "slug": format!("post-{id}"),
        "published": true,
        "created_at": "2025-01-01T00:00:00Z",
        "updated_at": "2025-01-01T00:00:00Z"
    })
}

pub fn post_json(id: &str, user_id: &str, slug: &str) -> Value {
    json!({
        "id": id,
        "user_id": user_id,
        "title": format!("Post {id}"),
        "content": "Body text",
        "slug": slug,
        "published": true,
        "created_at": "2025-01-01T00:00:00Z",
        "updated_at": "2025-01-03T00:00:00Z"
    })
}

pub fn list_json(posts: Vec<Value>, limit: u32, offset: u32, total: u64) -> Value {
    json!({ "posts": posts, "limit": limit, "offset": offset, "total": total })
}

/// A credential store holding the given session, as a previous run would have left it.
pub fn seeded_store(access: &str, refresh: Option<&str>, user: Option<Value>) -> CredentialStore {
    let backend = Arc::new(MemoryKeyValueStore::new());
    let mut entries = vec![("access_token", access.to_string())];
    if let Some(refresh) = refresh {
        entries.push(("refresh_token", refresh.to_string()));
    }
    if let Some(user) = user {
        entries.push(("user", user.to_string()));
    }
    backend.set_many(&entries).expect("seed store");
    CredentialStore::new(backend)
}
