// src/services/notification_store.rs
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::models::Notification;
use crate::services::notification_channel::ChannelEvent;

/// Session-scoped notification list, newest first, with an unread counter.
#[derive(Debug, Default)]
pub struct NotificationStore {
    notifications: Vec<Notification>,
    unread_count: u32,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn unread_count(&self) -> u32 {
        self.unread_count
    }

    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }

    /// Inserts at the front. A known id is replaced in place and never
    /// counted as unread twice. A duplicate that flips read back to unread
    /// is not counted; the next server `unread_count` corrects the total.
    pub fn append(&mut self, notification: Notification) {
        if let Some(existing) = self.notifications.iter_mut().find(|n| n.id == notification.id) {
            if !existing.is_read && notification.is_read {
                self.unread_count = self.unread_count.saturating_sub(1);
            }
            *existing = notification;
            return;
        }

        if !notification.is_read {
            self.unread_count += 1;
        }
        self.notifications.insert(0, notification);
    }

    pub fn mark_as_read(&mut self, id: &str) {
        if let Some(notification) = self.notifications.iter_mut().find(|n| n.id == id) {
            if !notification.is_read {
                notification.is_read = true;
                self.unread_count = self.unread_count.saturating_sub(1);
            }
        }
    }

    pub fn mark_all_as_read(&mut self) {
        for notification in &mut self.notifications {
            notification.is_read = true;
        }
        self.unread_count = 0;
    }

    /// Server count always wins over local bookkeeping.
    pub fn set_unread_count(&mut self, count: u32) {
        self.unread_count = count;
    }

    pub fn clear(&mut self) {
        self.notifications.clear();
        self.unread_count = 0;
    }

    pub fn apply(&mut self, event: &ChannelEvent) {
        match event {
            ChannelEvent::Notification(notification) => self.append(notification.clone()),
            ChannelEvent::UnreadCount(count) => self.set_unread_count(*count),
            ChannelEvent::StateChanged(_) | ChannelEvent::AuthenticationFailed => {}
        }
    }

    /// Feeds channel events into a shared store until the channel goes away.
    /// Takes the channel's lossless `feed()`, so a reader blocked on the store
    /// lock only delays frames.
    pub fn spawn_feed(
        store: Arc<Mutex<NotificationStore>>,
        mut events: mpsc::UnboundedReceiver<ChannelEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                store.lock().await.apply(&event);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConnectionState;

    fn note(id: &str) -> Notification {
        Notification::new(id, "order_update", "Update", "Your order moved")
    }

    #[test]
    fn test_append_newest_first() {
        let mut store = NotificationStore::new();
        store.append(note("a"));
        store.append(note("b"));
        let ids: Vec<_> = store.notifications().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(store.unread_count(), 2);
    }

    #[test]
    fn test_duplicate_id_replaces_in_place() {
        let mut store = NotificationStore::new();
        store.append(note("a"));
        store.append(note("b"));
        store.append(Notification::new("a", "order_update", "Edited", "New body"));

        assert_eq!(store.len(), 2);
        assert_eq!(store.unread_count(), 2);
        assert_eq!(store.notifications()[1].title, "Edited");
    }

    #[test]
    fn test_duplicate_marked_read_decrements() {
        let mut store = NotificationStore::new();
        store.append(note("a"));
        store.append(note("a").read());
        assert_eq!(store.unread_count(), 0);
        assert!(store.notifications()[0].is_read);
    }

    #[test]
    fn test_duplicate_marked_unread_is_not_recounted() {
        let mut store = NotificationStore::new();
        store.append(note("a").read());
        store.append(note("b"));
        store.append(note("a"));

        assert!(!store.notifications()[1].is_read);
        assert_eq!(store.unread_count(), 1);

        store.mark_as_read("a");
        store.mark_as_read("b");
        assert_eq!(store.unread_count(), 0);

        store.set_unread_count(1);
        assert_eq!(store.unread_count(), 1);
    }

    #[test]
    fn test_read_notification_does_not_count() {
        let mut store = NotificationStore::new();
        store.append(note("a").read());
        assert_eq!(store.unread_count(), 0);
    }

    #[test]
    fn test_mark_as_read() {
        let mut store = NotificationStore::new();
        store.append(note("a"));
        store.append(note("b"));

        store.mark_as_read("a");
        assert_eq!(store.unread_count(), 1);
        store.mark_as_read("a");
        assert_eq!(store.unread_count(), 1);
        store.mark_as_read("missing");
        assert_eq!(store.unread_count(), 1);
    }

    #[test]
    fn test_mark_all_then_mark_one_stays_at_zero() {
        let mut store = NotificationStore::new();
        store.append(note("a"));
        store.append(note("b"));

        store.mark_all_as_read();
        store.mark_as_read("a");
        store.mark_as_read("zzz");
        assert_eq!(store.unread_count(), 0);
        assert!(store.notifications().iter().all(|n| n.is_read));
    }

    #[test]
    fn test_floor_holds_after_server_overwrite() {
        let mut store = NotificationStore::new();
        store.append(note("a"));
        store.set_unread_count(0);
        store.mark_as_read("a");
        assert_eq!(store.unread_count(), 0);
    }

    #[test]
    fn test_unread_count_event_overwrites() {
        let mut store = NotificationStore::new();
        store.append(note("a"));
        store.append(note("b"));
        store.apply(&ChannelEvent::UnreadCount(9));
        assert_eq!(store.unread_count(), 9);
        store.apply(&ChannelEvent::Notification(note("c")));
        assert_eq!(store.unread_count(), 10);
        store.apply(&ChannelEvent::UnreadCount(1));
        assert_eq!(store.unread_count(), 1);
    }

    #[test]
    fn test_state_events_leave_store_untouched() {
        let mut store = NotificationStore::new();
        store.append(note("a"));
        store.apply(&ChannelEvent::StateChanged(ConnectionState::Connecting));
        store.apply(&ChannelEvent::AuthenticationFailed);
        assert_eq!(store.len(), 1);
        assert_eq!(store.unread_count(), 1);
    }

    #[test]
    fn test_clear() {
        let mut store = NotificationStore::new();
        store.append(note("a"));
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.unread_count(), 0);
    }

    #[tokio::test]
    async fn test_feed_applies_events_in_order() {
        let store = Arc::new(Mutex::new(NotificationStore::new()));
        let (tx, rx) = mpsc::unbounded_channel();
        let feed = NotificationStore::spawn_feed(store.clone(), rx);

        tx.send(ChannelEvent::Notification(note("a"))).unwrap();
        tx.send(ChannelEvent::UnreadCount(5)).unwrap();
        drop(tx);
        feed.await.unwrap();

        let store = store.lock().await;
        assert_eq!(store.len(), 1);
        assert_eq!(store.unread_count(), 5);
    }
}
