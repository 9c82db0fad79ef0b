// Notification sink - user-facing connect/disconnect/error events
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub description: String,
}

impl Notification {
    pub fn info(title: &str, description: &str) -> Self {
        Self {
            kind: NotificationKind::Info,
            title: title.to_string(),
            description: description.to_string(),
        }
    }

    pub fn error(title: &str, description: &str) -> Self {
        Self {
            kind: NotificationKind::Error,
            title: title.to_string(),
            description: description.to_string(),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}
