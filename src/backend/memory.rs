//! In-memory backing store.
//!
//! Orders live in a [`ResourceActor`]; its change feed is bridged into row
//! level [`ChangeEvent`]s for dashboard subscribers. The customer-facing
//! surface (placing and removing orders) is exposed as inherent methods.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::entity::OrderPatch;
use super::{BackendError, ChangeEvent, OrderBackend, Subscription};
use crate::actor_framework::{Change, FrameworkError, ResourceActor, ResourceClient};
use crate::domain::{NewOrder, Order, OrderRow, OrderStatus};

pub struct InMemoryBackend {
    orders: ResourceClient<Order>,
    events: broadcast::Sender<ChangeEvent>,
    bridge: JoinHandle<()>,
}

impl InMemoryBackend {
    /// Starts the order actor and the change bridge.
    pub fn new(buffer_size: usize) -> Self {
        let (actor, client) = ResourceActor::<Order>::new(buffer_size, || Uuid::new_v4().to_string());
        tokio::spawn(actor.run());
        Self::from_client(client, buffer_size)
    }

    /// Wraps an existing order client. The actor behind it is owned elsewhere.
    pub fn from_client(orders: ResourceClient<Order>, buffer_size: usize) -> Self {
        let (events, _) = broadcast::channel(buffer_size);
        let bridge = tokio::spawn(bridge_changes(orders.subscribe(), events.clone()));
        Self {
            orders,
            events,
            bridge,
        }
    }

    /// Number of live change subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    #[instrument(skip(self, order), fields(customer = ?order.customer_name))]
    pub async fn place_order(&self, order: NewOrder) -> Result<Order, BackendError> {
        let id = self.orders.create(order).await.map_err(mutation_error)?;
        info!(order_id = %id, "Order placed");
        self.orders
            .get(id.clone())
            .await
            .map_err(query_error)?
            .ok_or(BackendError::NotFound(id))
    }

    #[instrument(skip(self))]
    pub async fn remove_order(&self, id: &str) -> Result<Order, BackendError> {
        let removed = self.orders.delete(id.to_string()).await.map_err(mutation_error)?;
        info!(order_id = %id, "Order removed");
        Ok(removed)
    }
}

impl Drop for InMemoryBackend {
    fn drop(&mut self) {
        self.bridge.abort();
    }
}

async fn bridge_changes(
    mut changes: broadcast::Receiver<Change<Order>>,
    events: broadcast::Sender<ChangeEvent>,
) {
    loop {
        let event = match changes.recv().await {
            Ok(Change::Inserted(order)) => ChangeEvent::Insert { new: order.row() },
            Ok(Change::Updated(order)) => ChangeEvent::Update { new: order.row() },
            Ok(Change::Deleted(order)) => ChangeEvent::Delete {
                id: order.id.clone(),
                old: Some(order.row()),
            },
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                debug!(missed, "Change bridge lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        // no listeners is fine
        let _ = events.send(event);
    }
}

#[async_trait]
impl OrderBackend for InMemoryBackend {
    #[instrument(skip(self))]
    async fn fetch_order(&self, id: &str) -> Result<Option<Order>, BackendError> {
        debug!("Fetching order");
        self.orders.get(id.to_string()).await.map_err(query_error)
    }

    #[instrument(skip(self))]
    async fn fetch_recent(&self, limit: Option<usize>) -> Result<Vec<Order>, BackendError> {
        let mut orders = self.orders.query(|_| true).await.map_err(query_error)?;
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        if let Some(limit) = limit {
            orders.truncate(limit);
        }
        debug!(count = orders.len(), "Fetched recent orders");
        Ok(orders)
    }

    #[instrument(skip(self))]
    async fn fetch_created_since(&self, since: DateTime<Utc>) -> Result<Vec<OrderRow>, BackendError> {
        let orders = self
            .orders
            .query(move |order| order.created_at >= since)
            .await
            .map_err(query_error)?;
        Ok(orders.iter().map(Order::row).collect())
    }

    #[instrument(skip(self))]
    async fn count_by_status(&self, statuses: &[OrderStatus]) -> Result<u64, BackendError> {
        let wanted = statuses.to_vec();
        let matched = self
            .orders
            .query(move |order| wanted.contains(&order.status))
            .await
            .map_err(query_error)?;
        Ok(matched.len() as u64)
    }

    #[instrument(skip(self))]
    async fn update_status(&self, id: &str, status: OrderStatus) -> Result<(), BackendError> {
        let patch = OrderPatch { status: Some(status) };
        self.orders
            .update(id.to_string(), patch)
            .await
            .map_err(mutation_error)?;
        debug!("Status persisted");
        Ok(())
    }

    async fn subscribe(&self) -> Result<Subscription, BackendError> {
        Ok(Subscription::new(self.events.subscribe()))
    }
}

fn query_error(err: FrameworkError) -> BackendError {
    match err {
        FrameworkError::NotFound(id) => BackendError::NotFound(id),
        FrameworkError::Rejected(reason) => BackendError::Query(reason),
        FrameworkError::ActorClosed | FrameworkError::ActorDropped => {
            BackendError::Unavailable(err.to_string())
        }
    }
}

fn mutation_error(err: FrameworkError) -> BackendError {
    match err {
        FrameworkError::NotFound(id) => BackendError::NotFound(id),
        FrameworkError::Rejected(reason) => BackendError::Mutation(reason),
        FrameworkError::ActorClosed | FrameworkError::ActorDropped => {
            BackendError::Unavailable(err.to_string())
        }
    }
}
