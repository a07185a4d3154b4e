//! User-visible transient notifications ("toasts").

use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::{short_id, Order, OrderStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub description: String,
}

impl Notification {
    pub fn new_order(order: &Order) -> Self {
        Self {
            level: NotificationLevel::Info,
            title: "New Order Received!".to_string(),
            description: format!(
                "Order #{} from {}",
                order.short_id(5),
                order.customer_display()
            ),
        }
    }

    pub fn status_updated(order_id: &str, status: OrderStatus) -> Self {
        Self {
            level: NotificationLevel::Success,
            title: "Status Updated".to_string(),
            description: format!("Order {} is now {}.", short_id(order_id, 8), status),
        }
    }

    pub fn update_failed() -> Self {
        Self {
            level: NotificationLevel::Error,
            title: "Update Failed".to_string(),
            description: "An error occurred while updating the status.".to_string(),
        }
    }
}

/// Sending half. Cheap to clone; a closed feed silently discards.
#[derive(Clone)]
pub struct NotificationSink {
    sender: mpsc::UnboundedSender<Notification>,
}

pub struct NotificationFeed {
    receiver: mpsc::UnboundedReceiver<Notification>,
}

pub fn channel() -> (NotificationSink, NotificationFeed) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (NotificationSink { sender }, NotificationFeed { receiver })
}

impl NotificationSink {
    pub fn notify(&self, notification: Notification) {
        debug!(title = %notification.title, "Notifying");
        let _ = self.sender.send(notification);
    }
}

impl NotificationFeed {
    pub async fn next(&mut self) -> Option<Notification> {
        self.receiver.recv().await
    }

    /// Everything delivered so far, without waiting.
    pub fn drain(&mut self) -> Vec<Notification> {
        let mut drained = Vec::new();
        while let Ok(notification) = self.receiver.try_recv() {
            drained.push(notification);
        }
        drained
    }
}
