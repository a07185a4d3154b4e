//! # Mock Framework
//!
//! Test doubles for the two seams of the crate.
//!
//! - [`create_mock_client`] hands out a [`ResourceClient`] whose requests land
//!   on a receiver the test controls. Pair it with the `expect_*` helpers to
//!   answer each request by hand.
//! - [`ScriptedBackend`] is an [`OrderBackend`] whose fetches and updates can
//!   be held in flight or made to fail, so interleavings that depend on
//!   network timing can be reproduced step by step.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, Notify};

use crate::actor_framework::{Entity, Filter, FrameworkError, ResourceClient, ResourceRequest, Response};
use crate::backend::{BackendError, ChangeEvent, OrderBackend, Subscription};
use crate::domain::{Order, OrderId, OrderRow, OrderStatus};

/// Creates a mock client and a receiver for asserting requests.
///
/// No actor runs behind the client. Each request stays on `receiver` until
/// the test takes it and answers through its `respond_to` channel.
pub fn create_mock_client<T: Entity>(buffer_size: usize) -> (ResourceClient<T>, mpsc::Receiver<ResourceRequest<T>>) {
    let (sender, receiver) = mpsc::channel(buffer_size);
    let (changes, _) = broadcast::channel(buffer_size);
    (ResourceClient::new(sender, changes), receiver)
}

/// Helper to verify that the next message is a Create request
pub async fn expect_create<T: Entity>(
    receiver: &mut mpsc::Receiver<ResourceRequest<T>>,
) -> Option<(T::CreatePayload, Response<T::Id>)> {
    match receiver.recv().await {
        Some(ResourceRequest::Create { payload, respond_to }) => Some((payload, respond_to)),
        _ => None,
    }
}

/// Helper to verify that the next message is a Get request
pub async fn expect_get<T: Entity>(receiver: &mut mpsc::Receiver<ResourceRequest<T>>) -> Option<(T::Id, Response<Option<T>>)> {
    match receiver.recv().await {
        Some(ResourceRequest::Get { id, respond_to }) => Some((id, respond_to)),
        _ => None,
    }
}

/// Helper to verify that the next message is an Update request
pub async fn expect_update<T: Entity>(
    receiver: &mut mpsc::Receiver<ResourceRequest<T>>,
) -> Option<(T::Id, T::Patch, Response<T>)> {
    match receiver.recv().await {
        Some(ResourceRequest::Update { id, patch, respond_to }) => Some((id, patch, respond_to)),
        _ => None,
    }
}

/// Helper to verify that the next message is a Query request
pub async fn expect_query<T: Entity>(receiver: &mut mpsc::Receiver<ResourceRequest<T>>) -> Option<(Filter<T>, Response<Vec<T>>)> {
    match receiver.recv().await {
        Some(ResourceRequest::Query { filter, respond_to }) => Some((filter, respond_to)),
        _ => None,
    }
}

/// Polls `check` until it holds, failing the test after five seconds.
pub async fn wait_for<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let reached = tokio::time::timeout(Duration::from_secs(5), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "condition not reached in time");
}

#[derive(Default)]
struct Script {
    orders: HashMap<OrderId, Order>,
    held_fetches: HashMap<OrderId, Arc<Notify>>,
    held_update: Option<Arc<Notify>>,
    fail_fetches: bool,
    fail_updates: bool,
    fetch_counts: HashMap<OrderId, usize>,
}

/// Backing store driven entirely by the test.
pub struct ScriptedBackend {
    script: Mutex<Script>,
    events: broadcast::Sender<ChangeEvent>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            script: Mutex::new(Script::default()),
            events,
        }
    }

    /// Inserts or replaces an order without emitting an event.
    pub fn put(&self, order: Order) {
        self.script.lock().unwrap().orders.insert(order.id.clone(), order);
    }

    /// Removes an order without emitting an event.
    pub fn take(&self, id: &str) -> Option<Order> {
        self.script.lock().unwrap().orders.remove(id)
    }

    /// Every stored order, newest first.
    pub fn all(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self.script.lock().unwrap().orders.values().cloned().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        orders
    }

    pub fn status_of(&self, id: &str) -> Option<OrderStatus> {
        self.script.lock().unwrap().orders.get(id).map(|order| order.status)
    }

    /// Pushes a change event to every subscriber.
    pub fn emit(&self, event: ChangeEvent) {
        let _ = self.events.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    /// The next fetch of `id` reads the store, then waits for the returned
    /// gate before answering.
    pub fn hold_fetches(&self, id: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.script.lock().unwrap().held_fetches.insert(id.to_string(), gate.clone());
        gate
    }

    /// The next status update waits for the returned gate before it is written.
    pub fn hold_updates(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.script.lock().unwrap().held_update = Some(gate.clone());
        gate
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.script.lock().unwrap().fail_fetches = fail;
    }

    pub fn fail_updates(&self, fail: bool) {
        self.script.lock().unwrap().fail_updates = fail;
    }

    /// Completed single-order fetches of `id`.
    pub fn fetch_count(&self, id: &str) -> usize {
        self.script.lock().unwrap().fetch_counts.get(id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl OrderBackend for ScriptedBackend {
    async fn fetch_order(&self, id: &str) -> Result<Option<Order>, BackendError> {
        let (found, gate, fail) = {
            let mut script = self.script.lock().unwrap();
            (
                script.orders.get(id).cloned(),
                script.held_fetches.remove(id),
                script.fail_fetches,
            )
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        *self.script.lock().unwrap().fetch_counts.entry(id.to_string()).or_default() += 1;
        if fail {
            return Err(BackendError::Query("scripted fetch failure".into()));
        }
        Ok(found)
    }

    async fn fetch_recent(&self, limit: Option<usize>) -> Result<Vec<Order>, BackendError> {
        let mut orders = self.all();
        if let Some(limit) = limit {
            orders.truncate(limit);
        }
        Ok(orders)
    }

    async fn fetch_created_since(&self, since: DateTime<Utc>) -> Result<Vec<OrderRow>, BackendError> {
        Ok(self
            .all()
            .iter()
            .filter(|order| order.created_at >= since)
            .map(Order::row)
            .collect())
    }

    async fn count_by_status(&self, statuses: &[OrderStatus]) -> Result<u64, BackendError> {
        let script = self.script.lock().unwrap();
        Ok(script.orders.values().filter(|o| statuses.contains(&o.status)).count() as u64)
    }

    async fn update_status(&self, id: &str, status: OrderStatus) -> Result<(), BackendError> {
        let gate = self.script.lock().unwrap().held_update.take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let row = {
            let mut script = self.script.lock().unwrap();
            if script.fail_updates {
                return Err(BackendError::Mutation("scripted update failure".into()));
            }
            let order = script
                .orders
                .get_mut(id)
                .ok_or_else(|| BackendError::NotFound(id.to_string()))?;
            order.status = status;
            order.row()
        };
        self.emit(ChangeEvent::Update { new: row });
        Ok(())
    }

    async fn subscribe(&self) -> Result<Subscription, BackendError> {
        Ok(Subscription::new(self.events.subscribe()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::entity::OrderPatch;
    use crate::backend::InMemoryBackend;
    use crate::domain::NewOrder;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_mock_client() {
        let (client, mut receiver) = create_mock_client::<Order>(10);

        let create_task = tokio::spawn(async move { client.create(NewOrder::new(Some("Asha"), Decimal::TEN)).await });

        let (payload, responder) = expect_create(&mut receiver).await.expect("Expected Create request");
        assert_eq!(payload.customer_name.as_deref(), Some("Asha"));
        responder.send(Ok("order_1".to_string())).unwrap();

        let result = create_task.await.unwrap();
        assert_eq!(result, Ok("order_1".to_string()));
    }

    #[tokio::test]
    async fn test_backend_status_update_request() {
        let (client, mut receiver) = create_mock_client::<Order>(10);
        let backend = InMemoryBackend::from_client(client, 10);

        let update = tokio::spawn(async move { backend.update_status("o1", OrderStatus::Ready).await });

        let (id, patch, responder) = expect_update(&mut receiver).await.expect("Expected Update request");
        assert_eq!(id, "o1");
        assert!(matches!(patch, OrderPatch { status: Some(OrderStatus::Ready) }));
        responder.send(Err(FrameworkError::NotFound("o1".to_string()))).unwrap();

        assert_eq!(update.await.unwrap(), Err(BackendError::NotFound("o1".to_string())));
    }

    #[tokio::test]
    async fn test_backend_fetch_maps_missing_order() {
        let (client, mut receiver) = create_mock_client::<Order>(10);
        let backend = InMemoryBackend::from_client(client, 10);

        let fetch = tokio::spawn(async move { backend.fetch_order("gone").await });

        let (id, responder) = expect_get(&mut receiver).await.expect("Expected Get request");
        assert_eq!(id, "gone");
        responder.send(Ok(None)).unwrap();

        assert_eq!(fetch.await.unwrap(), Ok(None));
    }

    #[tokio::test]
    async fn test_backend_count_runs_filter() {
        let (client, mut receiver) = create_mock_client::<Order>(10);
        let backend = InMemoryBackend::from_client(client, 10);

        let count = tokio::spawn(async move { backend.count_by_status(&[OrderStatus::Ready]).await });

        let (filter, responder) = expect_query(&mut receiver).await.expect("Expected Query request");
        let stored: Vec<Order> = [OrderStatus::Ready, OrderStatus::Received, OrderStatus::Ready]
            .into_iter()
            .enumerate()
            .map(|(n, status)| {
                let mut order = Order::from_create(format!("o{}", n), NewOrder::new(None, Decimal::ONE)).unwrap();
                order.status = status;
                order
            })
            .collect();
        responder.send(Ok(stored.into_iter().filter(|o| filter(o)).collect())).unwrap();

        assert_eq!(count.await.unwrap(), Ok(2));
    }

    #[tokio::test]
    async fn test_scripted_fetch_waits_for_gate() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.put(Order::from_create("o1".into(), NewOrder::new(None, Decimal::ONE)).unwrap());
        let gate = backend.hold_fetches("o1");

        let fetch = {
            let backend = backend.clone();
            tokio::spawn(async move { backend.fetch_order("o1").await })
        };
        tokio::task::yield_now().await;
        assert!(!fetch.is_finished());
        assert_eq!(backend.fetch_count("o1"), 0);

        gate.notify_one();
        fetch.await.unwrap().unwrap();
        assert_eq!(backend.fetch_count("o1"), 1);

        // only the first fetch is held
        assert!(backend.fetch_order("o1").await.unwrap().is_some());
    }
}
