use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use skiff_types::events::NotificationEvent;
use skiff_types::models::Notification;

/// REST collaborator for notification actions. The core never retries
/// these calls; a failure is returned to the caller and the store is left
/// unchanged.
#[allow(async_fn_in_trait)]
pub trait NotificationApi: Send + Sync {
    async fn fetch_notifications(&self) -> anyhow::Result<Vec<Notification>>;
    async fn fetch_unread_count(&self) -> anyhow::Result<u64>;
    async fn mark_read(&self, id: &str) -> anyhow::Result<()>;
    async fn mark_all_read(&self) -> anyhow::Result<()>;
    async fn delete(&self, id: &str) -> anyhow::Result<()>;
    async fn delete_all(&self) -> anyhow::Result<()>;
}

/// The per-session notification list plus its unread counter.
///
/// The counter is stored separately from the list so badge rendering is
/// O(1); every mutation path updates both together. Clones share state.
#[derive(Clone, Default)]
pub struct NotificationStore {
    inner: Arc<RwLock<NotificationStoreInner>>,
}

#[derive(Default)]
struct NotificationStoreInner {
    notifications: Vec<Notification>,
    unread_count: u64,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initial population, once per user session. The two reads are
    /// independent: either one failing does not block the other.
    pub async fn bootstrap(&self, api: &impl NotificationApi) {
        let (list, count) = tokio::join!(api.fetch_notifications(), api.fetch_unread_count());
        let mut inner = self.inner.write().expect("notification lock poisoned");
        match list {
            Ok(list) => inner.notifications = list,
            Err(e) => warn!("initial notification fetch failed: {e:#}"),
        }
        match count {
            Ok(count) => inner.unread_count = count,
            Err(e) => warn!("initial unread count fetch failed: {e:#}"),
        }
    }

    /// Merge one inbound event.
    pub fn apply(&self, event: NotificationEvent) {
        let mut inner = self.inner.write().expect("notification lock poisoned");
        match event {
            NotificationEvent::New { notification, unread_count } => {
                // The server may redeliver; a duplicate still carries an
                // authoritative count worth adopting.
                let duplicate = inner.notifications.iter().any(|n| n.id == notification.id);
                if !duplicate {
                    inner.notifications.insert(0, notification);
                }
                match unread_count {
                    Some(count) => inner.unread_count = count,
                    None if !duplicate => inner.unread_count += 1,
                    None => {}
                }
            }
            NotificationEvent::Read { id, read_at, unread_count } => {
                let flipped = mark_read_in_place(&mut inner.notifications, &id, read_at);
                match unread_count {
                    Some(count) => inner.unread_count = count,
                    None if flipped => inner.unread_count = inner.unread_count.saturating_sub(1),
                    None => debug!(id, "read event for unknown or already-read notification"),
                }
            }
            NotificationEvent::CountUpdate { unread_count } => {
                inner.unread_count = unread_count;
            }
        }
    }

    /// Mark one notification read. REST first; the store only mutates
    /// after the call succeeds — no optimistic pre-mutation to roll back.
    pub async fn mark_as_read(&self, api: &impl NotificationApi, id: &str) -> anyhow::Result<()> {
        api.mark_read(id).await?;
        let mut inner = self.inner.write().expect("notification lock poisoned");
        if mark_read_in_place(&mut inner.notifications, id, Utc::now()) {
            inner.unread_count = inner.unread_count.saturating_sub(1);
        }
        Ok(())
    }

    /// Mark everything read. REST first, mutation after success.
    pub async fn mark_all_as_read(&self, api: &impl NotificationApi) -> anyhow::Result<()> {
        api.mark_all_read().await?;
        let mut inner = self.inner.write().expect("notification lock poisoned");
        let now = Utc::now();
        for notification in &mut inner.notifications {
            if !notification.is_read {
                notification.is_read = true;
                notification.read_at = Some(now);
            }
        }
        inner.unread_count = 0;
        Ok(())
    }

    /// Delete one notification. REST first, mutation after success.
    pub async fn remove(&self, api: &impl NotificationApi, id: &str) -> anyhow::Result<()> {
        api.delete(id).await?;
        let mut inner = self.inner.write().expect("notification lock poisoned");
        if let Some(index) = inner.notifications.iter().position(|n| n.id == id) {
            let removed = inner.notifications.remove(index);
            if !removed.is_read {
                inner.unread_count = inner.unread_count.saturating_sub(1);
            }
        }
        Ok(())
    }

    /// Delete everything. REST first, mutation after success.
    pub async fn remove_all(&self, api: &impl NotificationApi) -> anyhow::Result<()> {
        api.delete_all().await?;
        let mut inner = self.inner.write().expect("notification lock poisoned");
        inner.notifications.clear();
        inner.unread_count = 0;
        Ok(())
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.inner
            .read()
            .expect("notification lock poisoned")
            .notifications
            .clone()
    }

    pub fn unread_count(&self) -> u64 {
        self.inner.read().expect("notification lock poisoned").unread_count
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("notification lock poisoned").notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Flip a notification's read flag. Returns true only when the flag
/// actually changed, so callers adjust the counter exactly once.
fn mark_read_in_place(
    notifications: &mut [Notification],
    id: &str,
    read_at: DateTime<Utc>,
) -> bool {
    match notifications.iter_mut().find(|n| n.id == id) {
        Some(notification) if !notification.is_read => {
            notification.is_read = true;
            notification.read_at = Some(read_at);
            true
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::Mutex;

    /// Scriptable collaborator: counts calls, optionally fails them.
    #[derive(Default)]
    struct FakeApi {
        notifications: Vec<Notification>,
        unread: u64,
        fail_list: bool,
        fail_count: bool,
        fail_actions: bool,
        calls: Mutex<Vec<&'static str>>,
    }

    impl FakeApi {
        fn called(&self, name: &'static str) {
            self.calls.lock().unwrap().push(name);
        }
    }

    impl NotificationApi for FakeApi {
        async fn fetch_notifications(&self) -> anyhow::Result<Vec<Notification>> {
            self.called("list");
            if self.fail_list {
                return Err(anyhow!("list unavailable"));
            }
            Ok(self.notifications.clone())
        }
        async fn fetch_unread_count(&self) -> anyhow::Result<u64> {
            self.called("count");
            if self.fail_count {
                return Err(anyhow!("count unavailable"));
            }
            Ok(self.unread)
        }
        async fn mark_read(&self, _id: &str) -> anyhow::Result<()> {
            self.called("mark_read");
            if self.fail_actions { Err(anyhow!("rejected")) } else { Ok(()) }
        }
        async fn mark_all_read(&self) -> anyhow::Result<()> {
            self.called("mark_all_read");
            if self.fail_actions { Err(anyhow!("rejected")) } else { Ok(()) }
        }
        async fn delete(&self, _id: &str) -> anyhow::Result<()> {
            self.called("delete");
            if self.fail_actions { Err(anyhow!("rejected")) } else { Ok(()) }
        }
        async fn delete_all(&self) -> anyhow::Result<()> {
            self.called("delete_all");
            if self.fail_actions { Err(anyhow!("rejected")) } else { Ok(()) }
        }
    }

    fn notification(id: &str, read: bool) -> Notification {
        Notification {
            id: id.to_string(),
            user_id: "7".to_string(),
            kind: "INFO".to_string(),
            title: format!("title {id}"),
            message: String::new(),
            metadata: serde_json::Map::new(),
            is_read: read,
            created_at: Utc::now(),
            read_at: None,
        }
    }

    fn new_event(id: &str, unread_count: Option<u64>) -> NotificationEvent {
        NotificationEvent::New { notification: notification(id, false), unread_count }
    }

    /// The §8 invariant: counter equals unread entries whenever no
    /// authoritative count diverged.
    fn assert_consistent(store: &NotificationStore) {
        let unread = store.notifications().iter().filter(|n| !n.is_read).count() as u64;
        assert_eq!(store.unread_count(), unread);
    }

    #[tokio::test]
    async fn test_bootstrap_scenario_then_new_notification() {
        let api = FakeApi {
            notifications: vec![notification("a", true), notification("b", false)],
            unread: 1,
            ..Default::default()
        };
        let store = NotificationStore::new();
        store.bootstrap(&api).await;
        assert_eq!(store.len(), 2);
        assert_eq!(store.unread_count(), 1);

        // NEW_NOTIFICATION without an unreadCount field increments locally.
        store.apply(new_event("c", None));
        assert_eq!(store.unread_count(), 2);
        assert_eq!(store.notifications()[0].id, "c"); // prepended
        assert_consistent(&store);
    }

    #[tokio::test]
    async fn test_bootstrap_reads_fail_independently() {
        let api = FakeApi {
            notifications: vec![notification("a", false)],
            unread: 1,
            fail_list: true,
            ..Default::default()
        };
        let store = NotificationStore::new();
        store.bootstrap(&api).await;
        assert!(store.is_empty());
        assert_eq!(store.unread_count(), 1); // count read still landed
        assert_eq!(*api.calls.lock().unwrap(), vec!["list", "count"]);
    }

    #[test]
    fn test_new_adopts_authoritative_count() {
        let store = NotificationStore::new();
        store.apply(new_event("a", Some(5)));
        assert_eq!(store.unread_count(), 5);
    }

    #[test]
    fn test_redelivered_new_does_not_double_count() {
        let store = NotificationStore::new();
        store.apply(new_event("a", None));
        store.apply(new_event("a", None));
        assert_eq!(store.len(), 1);
        assert_eq!(store.unread_count(), 1);
        assert_consistent(&store);
    }

    #[test]
    fn test_read_event_decrements_once() {
        let store = NotificationStore::new();
        store.apply(new_event("a", None));
        store.apply(new_event("b", None));

        let read = NotificationEvent::Read { id: "a".into(), read_at: Utc::now(), unread_count: None };
        store.apply(read.clone());
        assert_eq!(store.unread_count(), 1);
        assert_consistent(&store);

        // Redelivered read event: flag already set, counter untouched.
        store.apply(read);
        assert_eq!(store.unread_count(), 1);
        assert_consistent(&store);

        // Unknown id never drives the counter negative.
        store.apply(NotificationEvent::Read { id: "ghost".into(), read_at: Utc::now(), unread_count: None });
        assert_eq!(store.unread_count(), 1);
    }

    #[test]
    fn test_count_update_leaves_list_alone() {
        let store = NotificationStore::new();
        store.apply(new_event("a", None));
        store.apply(NotificationEvent::CountUpdate { unread_count: 9 });
        assert_eq!(store.unread_count(), 9);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_mark_as_read_calls_rest_then_mutates() {
        let api = FakeApi::default();
        let store = NotificationStore::new();
        store.apply(new_event("a", None));

        store.mark_as_read(&api, "a").await.unwrap();
        assert!(store.notifications()[0].is_read);
        assert!(store.notifications()[0].read_at.is_some());
        assert_eq!(store.unread_count(), 0);
        assert_consistent(&store);

        // Marking it again succeeds but changes nothing.
        store.mark_as_read(&api, "a").await.unwrap();
        assert_eq!(store.unread_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_rest_call_leaves_store_unchanged() {
        let api = FakeApi { fail_actions: true, ..Default::default() };
        let store = NotificationStore::new();
        store.apply(new_event("a", None));

        assert!(store.mark_as_read(&api, "a").await.is_err());
        assert!(!store.notifications()[0].is_read);
        assert_eq!(store.unread_count(), 1);

        assert!(store.remove(&api, "a").await.is_err());
        assert_eq!(store.len(), 1);

        assert!(store.mark_all_as_read(&api).await.is_err());
        assert_eq!(store.unread_count(), 1);

        assert!(store.remove_all(&api).await.is_err());
        assert_eq!(store.len(), 1);
        assert_consistent(&store);
    }

    #[tokio::test]
    async fn test_mark_all_and_remove_all() {
        let api = FakeApi::default();
        let store = NotificationStore::new();
        store.apply(new_event("a", None));
        store.apply(new_event("b", None));

        store.mark_all_as_read(&api).await.unwrap();
        assert_eq!(store.unread_count(), 0);
        assert!(store.notifications().iter().all(|n| n.is_read));
        assert_consistent(&store);

        store.remove_all(&api).await.unwrap();
        assert!(store.is_empty());
        assert_eq!(store.unread_count(), 0);
    }

    #[tokio::test]
    async fn test_remove_unread_notification_decrements() {
        let api = FakeApi::default();
        let store = NotificationStore::new();
        store.apply(new_event("a", None));
        store.apply(new_event("b", None));

        store.remove(&api, "b").await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.unread_count(), 1);
        assert_consistent(&store);
    }

    #[test]
    fn test_interleaved_events_stay_consistent() {
        let store = NotificationStore::new();
        store.apply(new_event("a", None));
        store.apply(new_event("b", None));
        store.apply(NotificationEvent::Read { id: "b".into(), read_at: Utc::now(), unread_count: None });
        store.apply(new_event("c", None));
        store.apply(NotificationEvent::Read { id: "a".into(), read_at: Utc::now(), unread_count: Some(1) });
        assert_consistent(&store);
        assert_eq!(store.unread_count(), 1);
    }
}
