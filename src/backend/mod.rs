//! The hosted backing store, seen from the kitchen dashboard.
//!
//! Storage, queries and change notification all live behind
//! [`OrderBackend`]. The dashboard never deletes or creates orders itself;
//! it reads, updates status and listens.

pub mod entity;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;

use crate::domain::{Order, OrderId, OrderRow, OrderStatus};

pub use memory::InMemoryBackend;

/// Errors surfaced by the backing store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("Query failed: {0}")]
    Query(String),
    #[error("Mutation failed: {0}")]
    Mutation(String),
    #[error("Order not found: {0}")]
    NotFound(OrderId),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Row-level change pushed by the backing store.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    Insert { new: OrderRow },
    Update { new: OrderRow },
    /// `old` is absent when the store only reports the primary key.
    Delete { id: OrderId, old: Option<OrderRow> },
}

impl ChangeEvent {
    pub fn order_id(&self) -> &str {
        match self {
            ChangeEvent::Insert { new } | ChangeEvent::Update { new } => &new.id,
            ChangeEvent::Delete { id, .. } => id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::Insert { .. } => "insert",
            ChangeEvent::Update { .. } => "update",
            ChangeEvent::Delete { .. } => "delete",
        }
    }
}

/// A live change-event listener. Dropping it unsubscribes.
pub struct Subscription {
    receiver: broadcast::Receiver<ChangeEvent>,
}

impl Subscription {
    pub fn new(receiver: broadcast::Receiver<ChangeEvent>) -> Self {
        Self { receiver }
    }

    /// Next change, or `None` once the backing store closes the channel.
    ///
    /// Deliveries lost to a slow consumer are skipped; the reconciling poll
    /// repairs whatever they would have changed.
    pub async fn next_event(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Change subscription lagged; events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[async_trait]
pub trait OrderBackend: Send + Sync + 'static {
    /// Select one order by id, with its line items joined.
    async fn fetch_order(&self, id: &str) -> Result<Option<Order>, BackendError>;

    /// Orders newest first, optionally limited.
    async fn fetch_recent(&self, limit: Option<usize>) -> Result<Vec<Order>, BackendError>;

    /// Row images of every order created at or after `since`.
    async fn fetch_created_since(&self, since: DateTime<Utc>) -> Result<Vec<OrderRow>, BackendError>;

    async fn count_by_status(&self, statuses: &[OrderStatus]) -> Result<u64, BackendError>;

    /// Persist a new status for the order with this id.
    async fn update_status(&self, id: &str, status: OrderStatus) -> Result<(), BackendError>;

    async fn subscribe(&self) -> Result<Subscription, BackendError>;
}
