use crate::backend::{AuthEvent, AuthProvider, ObjectStorage, RowStore};
use crate::config::app::DEFAULT_NEARBY_RADIUS_KM;
use crate::services::report_cache::ReportCache;
use crate::websocket::hub::ChangeFeed;
use std::sync::Arc;

/// Everything a request needs, built once at startup and injected as an
/// `Extension`.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RowStore>,
    pub storage: Arc<dyn ObjectStorage>,
    pub auth: Arc<dyn AuthProvider>,
    pub feed: ChangeFeed,
    pub reports: ReportCache,
    pub nearby_default_radius_km: f64,
}

impl AppState {
    pub fn new(
        store: Arc<dyn RowStore>,
        storage: Arc<dyn ObjectStorage>,
        auth: Arc<dyn AuthProvider>,
    ) -> Self {
        Self {
            store,
            storage,
            auth,
            feed: ChangeFeed::new(),
            reports: ReportCache::new(),
            nearby_default_radius_km: DEFAULT_NEARBY_RADIUS_KM,
        }
    }

    pub fn with_nearby_radius(mut self, radius_km: f64) -> Self {
        self.nearby_default_radius_km = radius_km;
        self
    }

    /// Close a user's live subscriptions when their session ends.
    pub fn spawn_session_watcher(&self) -> tokio::task::JoinHandle<()> {
        let mut events = self.auth.subscribe();
        let feed = self.feed.clone();

        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                match event {
                    AuthEvent::SignedIn { user_id } => {
                        tracing::debug!(%user_id, "Session started");
                    }
                    AuthEvent::SignedOut { user_id } => {
                        let closed = feed.disconnect_user(user_id);
                        tracing::info!(%user_id, closed, "Session ended, subscriptions closed");
                    }
                }
            }
        })
    }
}
