use tokio::sync::broadcast;

use crate::model::Notification;

const CHANNEL_CAPACITY: usize = 256;

/// Outbound notification sink. Fire-and-forget: the engine never waits on
/// delivery and never rolls back a state change because a send failed.
pub trait Notifier: Send + Sync {
    fn send(&self, notification: Notification);
}

/// Broadcast hub. Dispatchers (mailers, loggers, tests) subscribe and
/// receive every notification sent after they subscribed.
pub struct NotifyHub {
    sender: broadcast::Sender<Notification>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            sender: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }
}

impl Notifier for NotifyHub {
    /// No-op if nobody is listening.
    fn send(&self, notification: Notification) {
        metrics::counter!(
            crate::observability::NOTIFICATIONS_SENT_TOTAL,
            "template" => notification.template.as_str()
        )
        .increment(1);
        if self.sender.send(notification).is_err() {
            tracing::debug!("notification dropped: no dispatcher subscribed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Recipient, TemplateKind};
    use ulid::Ulid;

    #[tokio::test]
    async fn subscriber_receives_notification() {
        let hub = NotifyHub::new();
        let mut rx = hub.subscribe();

        let n = Notification::new(Recipient::Member(Ulid::new()), TemplateKind::DayReminder)
            .param("work_date", "2024-06-10");
        hub.send(n.clone());

        assert_eq!(rx.recv().await.unwrap(), n);
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        hub.send(Notification::new(
            Recipient::Email {
                address: "ops@example.com".into(),
                name: "Ops".into(),
            },
            TemplateKind::ConfirmationRequest,
        ));
    }
}
