// Notifier that logs and fans notifications out to connected dashboards
use crate::application::notifier::{Notification, NotificationKind, Notifier};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, notification: Notification) {
        match notification.kind {
            NotificationKind::Info => {
                tracing::info!(title = %notification.title, "{}", notification.description)
            }
            NotificationKind::Error => {
                tracing::error!(title = %notification.title, "{}", notification.description)
            }
        }
        // no subscribers is fine
        let _ = self.sender.send(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_notifications() {
        let notifier = BroadcastNotifier::new();
        notifier.notify(Notification::info("Dropped", "nobody listening"));

        let mut rx = notifier.subscribe();
        notifier.notify(Notification::error("Read Error", "boom"));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.title, "Read Error");
        assert_eq!(received.kind, NotificationKind::Error);
    }
}
