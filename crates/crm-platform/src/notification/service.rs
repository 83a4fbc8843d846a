//! Notification delivery: inbox first, then the live room.

use std::sync::Arc;

use tracing::{debug, warn};

use super::entity::{Notification, NotificationResponse};
use super::hub::NotificationHub;
use super::repository::NotificationStore;

/// What happened to one notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Stored (or storing failed) and offered to the live room
    Sent { live_subscribers: usize },
    /// Dedup key already used; nothing stored or pushed
    Suppressed,
}

pub struct NotificationService {
    store: Arc<dyn NotificationStore>,
    hub: Arc<NotificationHub>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn NotificationStore>, hub: Arc<NotificationHub>) -> Self {
        Self { store, hub }
    }

    pub fn hub(&self) -> &Arc<NotificationHub> {
        &self.hub
    }

    /// Persist then push. An inbox failure is logged and the push still happens.
    pub async fn notify(&self, notification: Notification) -> Delivery {
        match self.store.insert(&notification).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(
                    user_id = %notification.user_id,
                    dedup_key = ?notification.dedup_key,
                    "Notification already delivered, skipping"
                );
                return Delivery::Suppressed;
            }
            Err(e) => {
                warn!(
                    user_id = %notification.user_id,
                    error = %e,
                    "Failed to store notification"
                );
            }
        }

        let live_subscribers = self
            .hub
            .publish(&notification.user_id, NotificationResponse::from(&notification));
        Delivery::Sent { live_subscribers }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::notification::entity::{NotificationCategory, NotificationKind};
    use crate::shared::error::{PlatformError, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// In-memory inbox honouring the (userId, dedupKey) uniqueness
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        pub entries: Mutex<Vec<Notification>>,
        pub fail: bool,
    }

    #[async_trait]
    impl NotificationStore for MemoryStore {
        async fn insert(&self, notification: &Notification) -> Result<bool> {
            if self.fail {
                return Err(PlatformError::internal("inbox unavailable"));
            }
            let mut entries = self.entries.lock().unwrap();
            let taken = notification.dedup_key.is_some()
                && entries.iter().any(|n| {
                    n.user_id == notification.user_id && n.dedup_key == notification.dedup_key
                });
            if taken {
                return Ok(false);
            }
            entries.push(notification.clone());
            Ok(true)
        }
    }

    fn reminder(key: &str) -> Notification {
        Notification::new(
            "u1",
            NotificationKind::Warning,
            NotificationCategory::Client,
            "Relance",
            "Jean Dupont attend une réponse",
        )
        .with_dedup_key(key)
    }

    #[tokio::test]
    async fn test_dedup_key_delivers_at_most_once() {
        let store = Arc::new(MemoryStore::default());
        let hub = Arc::new(NotificationHub::default());
        let service = NotificationService::new(store.clone(), hub.clone());
        let mut rx = hub.subscribe("u1");

        assert_eq!(service.notify(reminder("client-pending:c1")).await, Delivery::Sent { live_subscribers: 1 });
        assert_eq!(service.notify(reminder("client-pending:c1")).await, Delivery::Suppressed);

        assert_eq!(store.entries.lock().unwrap().len(), 1);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_entries_without_key_are_never_suppressed() {
        let store = Arc::new(MemoryStore::default());
        let service = NotificationService::new(store.clone(), Arc::new(NotificationHub::default()));

        for _ in 0..2 {
            let n = Notification::new("u1", NotificationKind::Info, NotificationCategory::System, "t", "m");
            assert_eq!(service.notify(n).await, Delivery::Sent { live_subscribers: 0 });
        }
        assert_eq!(store.entries.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_store_failure_still_pushes() {
        let store = Arc::new(MemoryStore { fail: true, ..Default::default() });
        let hub = Arc::new(NotificationHub::default());
        let service = NotificationService::new(store, hub.clone());
        let mut rx = hub.subscribe("u1");

        assert_eq!(service.notify(reminder("k")).await, Delivery::Sent { live_subscribers: 1 });
        assert_eq!(rx.recv().await.unwrap().title, "Relance");
    }
}
