use crate::config::ClientSettings;
use crate::error::ApiError;
use crate::gateway::Gateway;
use crate::posts::PostRepository;
use crate::routes::Navigation;
use crate::session::SessionController;
use crate::store::CredentialStore;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

/// Everything one client process shares: the credential store, the gateway
/// in front of the backend, the session controller and the post repository.
///
/// Dropping the last clone tears the session down; nothing is global.
#[derive(Clone)]
pub struct SessionContext {
    gateway: Gateway,
    session: SessionController,
    posts: PostRepository,
}

impl SessionContext {
    /// Wire up a context around `store`. Navigation requests from every
    /// component arrive on the returned receiver.
    pub fn new(
        settings: &ClientSettings,
        store: CredentialStore,
    ) -> Result<(Self, UnboundedReceiver<Navigation>), ApiError> {
        let (navigation_tx, navigation_rx) = unbounded_channel();
        let gateway = Gateway::new(settings, store, navigation_tx)?;
        let session = SessionController::new(gateway.clone());
        let posts = PostRepository::new(gateway.clone());
        Ok((
            Self {
                gateway,
                session,
                posts,
            },
            navigation_rx,
        ))
    }

    /// A context persisting credentials at `settings.storage_path`.
    pub fn open(
        settings: &ClientSettings,
    ) -> Result<(Self, UnboundedReceiver<Navigation>), ApiError> {
        let store = CredentialStore::open(&settings.storage_path)?;
        Self::new(settings, store)
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    pub fn posts(&self) -> &PostRepository {
        &self.posts
    }

    pub fn store(&self) -> &CredentialStore {
        self.gateway.store()
    }
}
