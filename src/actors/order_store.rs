use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn, Instrument};

use super::collection::{InsertOutcome, OptimisticTag, OrderCollection, Ticket};
use crate::backend::{BackendError, ChangeEvent, OrderBackend};
use crate::clients::OrderStoreClient;
use crate::clock::Clock;
use crate::config::{TrackerConfig, TransitionPolicy};
use crate::domain::{HourlyActivity, Order, OrderId, OrderRow, OrderStatus};
use crate::error::StoreError;
use crate::messages::{OrderStoreRequest, PollSnapshot, ServiceResponse};
use crate::notifications::{Notification, NotificationSink};

/// Owner of the local order mirror.
///
/// All mutations happen inside [`run`](Self::run), one message at a time.
/// Network calls never block the loop: they run in spawned tasks that post
/// a completion message back, so events keep flowing while a fetch is out.
pub struct OrderStoreService {
    receiver: mpsc::Receiver<OrderStoreRequest>,
    loopback: mpsc::WeakSender<OrderStoreRequest>,
    backend: Arc<dyn OrderBackend>,
    clock: Arc<dyn Clock>,
    notifier: NotificationSink,
    policy: TransitionPolicy,
    rollback_on_failure: bool,
    collection: OrderCollection,
    hourly: HourlyActivity,
}

impl OrderStoreService {
    pub fn new(
        config: &TrackerConfig,
        backend: Arc<dyn OrderBackend>,
        clock: Arc<dyn Clock>,
        notifier: NotificationSink,
        initial: PollSnapshot,
    ) -> (Self, OrderStoreClient) {
        let (sender, receiver) = mpsc::channel(config.channel_buffer);
        let hourly = HourlyActivity::rebuild(initial.created_today, clock.now());
        let service = Self {
            receiver,
            loopback: sender.downgrade(),
            backend,
            clock,
            notifier,
            policy: config.transition_policy,
            rollback_on_failure: config.rollback_on_failure,
            collection: OrderCollection::new(initial.orders),
            hourly,
        };
        (service, OrderStoreClient::new(sender))
    }

    #[instrument(name = "order_store", skip(self))]
    pub async fn run(mut self) {
        info!(orders = self.collection.len(), "OrderStore starting");

        while let Some(msg) = self.receiver.recv().await {
            match msg {
                OrderStoreRequest::Snapshot { respond_to } => {
                    let _ = respond_to.send(Ok(self.collection.orders().to_vec()));
                }
                OrderStoreRequest::GetOrder { id, respond_to } => {
                    let _ = respond_to.send(Ok(self.collection.get(&id).cloned()));
                }
                OrderStoreRequest::HourlyActivity { respond_to } => {
                    let _ = respond_to.send(Ok(self.hourly.clone()));
                }
                OrderStoreRequest::Transition { id, status, respond_to } => {
                    self.handle_transition(id, status, respond_to);
                }
                OrderStoreRequest::ApplyEvent { event, respond_to } => {
                    self.handle_event(event);
                    let _ = respond_to.send(Ok(()));
                }
                OrderStoreRequest::BeginPoll { respond_to } => {
                    let _ = respond_to.send(Ok(self.collection.issue_ticket()));
                }
                OrderStoreRequest::ApplyPoll {
                    ticket,
                    snapshot,
                    respond_to,
                } => {
                    self.handle_poll(ticket, snapshot);
                    let _ = respond_to.send(Ok(()));
                }
                OrderStoreRequest::InsertFetched { id, ticket, result } => {
                    self.handle_insert_fetched(id, ticket, result);
                }
                OrderStoreRequest::UpdateFetched { row, ticket, result } => {
                    self.handle_update_fetched(row, ticket, result);
                }
                OrderStoreRequest::TransitionPersisted {
                    id,
                    tag,
                    result,
                    respond_to,
                } => {
                    self.handle_transition_persisted(id, tag, result, respond_to);
                }
                OrderStoreRequest::Shutdown => {
                    info!("OrderStore shutting down");
                    break;
                }
            }
        }

        info!("OrderStore stopped");
    }

    #[instrument(fields(order_id = %event.order_id(), kind = event.kind()), skip(self, event))]
    fn handle_event(&mut self, event: ChangeEvent) {
        match event {
            ChangeEvent::Insert { new } => {
                let Some(ticket) = self.collection.begin_insert(&new.id) else {
                    debug!("Duplicate insert ignored");
                    return;
                };
                let now = self.clock.now();
                self.hourly.record_created(&new.id, new.created_at, now);

                let backend = self.backend.clone();
                let id = new.id;
                self.spawn_followup(async move {
                    let result = backend.fetch_order(&id).await;
                    OrderStoreRequest::InsertFetched { id, ticket, result }
                });
            }
            ChangeEvent::Update { new } => {
                let ticket = self.collection.issue_ticket();
                let backend = self.backend.clone();
                self.spawn_followup(async move {
                    let result = backend.fetch_order(&new.id).await;
                    OrderStoreRequest::UpdateFetched {
                        row: new,
                        ticket,
                        result,
                    }
                });
            }
            ChangeEvent::Delete { id, .. } => {
                let removed = self.collection.remove(&id);
                let now = self.clock.now();
                self.hourly.record_removed(&id, now);
                match removed {
                    Some(_) => info!("Order removed"),
                    None => debug!("Delete for unknown order"),
                }
            }
        }
    }

    #[instrument(fields(order_id = %id, %ticket), skip(self, result))]
    fn handle_insert_fetched(&mut self, id: OrderId, ticket: Ticket, result: Result<Option<Order>, BackendError>) {
        match result {
            Ok(Some(order)) => {
                let notification = Notification::new_order(&order);
                match self.collection.complete_insert(order, ticket) {
                    InsertOutcome::Added => {
                        info!("New order added");
                        self.notifier.notify(notification);
                    }
                    InsertOutcome::AlreadyPresent => {
                        info!("New order already delivered by poll");
                        self.notifier.notify(notification);
                    }
                    InsertOutcome::Discarded => debug!("Insert superseded; discarded"),
                }
            }
            Ok(None) => {
                self.collection.abandon_insert(&id);
                warn!("Inserted order no longer exists");
            }
            Err(e) => {
                self.collection.abandon_insert(&id);
                warn!(error = %e, "Fetching inserted order failed; next poll will pick it up");
            }
        }
    }

    #[instrument(fields(order_id = %row.id, %ticket), skip(self, row, result))]
    fn handle_update_fetched(&mut self, row: OrderRow, ticket: Ticket, result: Result<Option<Order>, BackendError>) {
        let applied = match result {
            Ok(Some(order)) => self.collection.apply_refetched(order, ticket),
            Ok(None) => {
                debug!("Re-fetch found nothing; merging pushed row");
                self.collection.merge_row(&row, ticket)
            }
            Err(e) => {
                warn!(error = %e, "Re-fetch failed; merging pushed row");
                self.collection.merge_row(&row, ticket)
            }
        };
        if applied {
            info!(status = %row.status, "Order updated");
        } else {
            debug!("Update stale or for unknown order; discarded");
        }
    }

    #[instrument(fields(%ticket, orders = snapshot.orders.len()), skip(self, snapshot))]
    fn handle_poll(&mut self, ticket: Ticket, snapshot: PollSnapshot) {
        self.collection.replace_all(snapshot.orders, ticket);
        self.hourly = HourlyActivity::rebuild(snapshot.created_today, self.clock.now());
        debug!("Reconciled with poll snapshot");
    }

    #[instrument(fields(order_id = %id, %status), skip(self, respond_to))]
    fn handle_transition(&mut self, id: OrderId, status: OrderStatus, respond_to: ServiceResponse<(), StoreError>) {
        let Some(current) = self.collection.get(&id).map(|order| order.status) else {
            warn!("Transition requested for unknown order");
            let _ = respond_to.send(Err(StoreError::NotFound(id)));
            return;
        };

        if !current.can_transition_to(status) {
            match self.policy {
                TransitionPolicy::Strict => {
                    warn!(from = %current, "Transition rejected");
                    let _ = respond_to.send(Err(StoreError::InvalidTransition { from: current, to: status }));
                    return;
                }
                TransitionPolicy::Lenient => {
                    warn!(from = %current, "Transition outside the kitchen flow; applying anyway");
                }
            }
        }

        let Some(tag) = self.collection.apply_optimistic(&id, status) else {
            let _ = respond_to.send(Err(StoreError::NotFound(id)));
            return;
        };
        info!(ticket = %tag.ticket, from = %tag.previous, "Status applied optimistically");

        let backend = self.backend.clone();
        self.spawn_followup(async move {
            let result = backend.update_status(&id, status).await;
            OrderStoreRequest::TransitionPersisted {
                id,
                tag,
                result,
                respond_to,
            }
        });
    }

    #[instrument(fields(order_id = %id, status = %tag.target), skip(self, tag, result, respond_to))]
    fn handle_transition_persisted(
        &mut self,
        id: OrderId,
        tag: OptimisticTag,
        result: Result<(), BackendError>,
        respond_to: ServiceResponse<(), StoreError>,
    ) {
        match result {
            Ok(()) => {
                self.collection.confirm(&id, tag.ticket);
                info!("Status change confirmed");
                self.notifier.notify(Notification::status_updated(&id, tag.target));
                let _ = respond_to.send(Ok(()));
            }
            Err(e) => {
                error!(error = %e, "Persisting status change failed");
                self.notifier.notify(Notification::update_failed());
                if self.rollback_on_failure && self.collection.rollback(&id, tag.ticket) {
                    info!(restored = %tag.previous, "Optimistic status rolled back");
                }
                let _ = respond_to.send(Err(StoreError::Backend(e)));
            }
        }
    }

    /// Runs `work` off the loop and posts its completion back to this store.
    fn spawn_followup<F>(&self, work: F)
    where
        F: Future<Output = OrderStoreRequest> + Send + 'static,
    {
        let loopback = self.loopback.clone();
        tokio::spawn(
            async move {
                let completion = work.await;
                match loopback.upgrade() {
                    Some(sender) => {
                        let _ = sender.send(completion).await;
                    }
                    None => debug!("Store gone; completion dropped"),
                }
            }
            .in_current_span(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{local_time, FixedClock};
    use crate::mock_framework::{wait_for, ScriptedBackend};
    use crate::notifications::{self, NotificationLevel};
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    fn order(id: &str, status: OrderStatus) -> Order {
        Order {
            id: id.to_string(),
            status,
            customer_name: Some("Kiran".to_string()),
            table_number: Some("12".to_string()),
            total_amount: Decimal::new(2400, 2),
            created_at: Utc::now(),
            items: Vec::new(),
        }
    }

    fn start(
        backend: Arc<ScriptedBackend>,
        config: TrackerConfig,
        initial: Vec<Order>,
    ) -> (OrderStoreClient, notifications::NotificationFeed) {
        let snapshot = PollSnapshot {
            orders: initial,
            created_today: Vec::new(),
        };
        start_with(backend, config, Arc::new(FixedClock::at(12, 0)), snapshot)
    }

    fn start_with(
        backend: Arc<ScriptedBackend>,
        config: TrackerConfig,
        clock: Arc<FixedClock>,
        snapshot: PollSnapshot,
    ) -> (OrderStoreClient, notifications::NotificationFeed) {
        let (sink, feed) = notifications::channel();
        let (service, client) = OrderStoreService::new(&config, backend, clock, sink, snapshot);
        tokio::spawn(service.run());
        (client, feed)
    }

    fn created_at(id: &str, hour: u32) -> Order {
        let mut placed = order(id, OrderStatus::Received);
        placed.created_at = local_time(hour, 0).with_timezone(&Utc);
        placed
    }

    #[tokio::test]
    async fn test_transition_is_visible_before_confirmation() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.put(order("o1", OrderStatus::Received));
        let gate = backend.hold_updates();
        let (client, mut feed) = start(backend.clone(), TrackerConfig::default(), backend.all());

        let pending = {
            let client = client.clone();
            tokio::spawn(async move { client.transition("o1".into(), OrderStatus::Preparing).await })
        };

        wait_for(|| {
            let client = client.clone();
            async move {
                let order = client.get_order("o1".into()).await.unwrap().unwrap();
                order.status == OrderStatus::Preparing
            }
        })
        .await;
        assert_eq!(backend.status_of("o1"), Some(OrderStatus::Received));
        assert!(feed.drain().is_empty());

        gate.notify_one();
        assert_eq!(pending.await.unwrap(), Ok(()));
        assert_eq!(backend.status_of("o1"), Some(OrderStatus::Preparing));

        let notes = feed.drain();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].title, "Status Updated");
    }

    #[tokio::test]
    async fn test_failed_transition_rolls_back_and_notifies() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.put(order("o1", OrderStatus::Preparing));
        backend.fail_updates(true);
        let (client, mut feed) = start(backend.clone(), TrackerConfig::default(), backend.all());

        let result = client.transition("o1".into(), OrderStatus::Ready).await;
        assert!(matches!(result, Err(StoreError::Backend(_))));

        let order = client.get_order("o1".into()).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Preparing);

        let notes = feed.drain();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].level, NotificationLevel::Error);
        assert_eq!(notes[0].title, "Update Failed");
    }

    #[tokio::test]
    async fn test_failed_transition_without_rollback_keeps_optimistic_status() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.put(order("o1", OrderStatus::Preparing));
        backend.fail_updates(true);
        let config = TrackerConfig {
            rollback_on_failure: false,
            ..TrackerConfig::default()
        };
        let (client, _feed) = start(backend.clone(), config, backend.all());

        assert!(client.transition("o1".into(), OrderStatus::Ready).await.is_err());
        let order = client.get_order("o1".into()).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Ready);
    }

    #[tokio::test]
    async fn test_transition_policy() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.put(order("o1", OrderStatus::Completed));
        backend.put(order("o2", OrderStatus::Completed));

        // lenient: applied and persisted even though completed is terminal
        let (lenient, _feed) = start(backend.clone(), TrackerConfig::default(), backend.all());
        assert_eq!(lenient.transition("o1".into(), OrderStatus::Preparing).await, Ok(()));
        assert_eq!(backend.status_of("o1"), Some(OrderStatus::Preparing));

        let strict_config = TrackerConfig {
            transition_policy: TransitionPolicy::Strict,
            ..TrackerConfig::default()
        };
        let (strict, _feed) = start(backend.clone(), strict_config, backend.all());
        assert_eq!(
            strict.transition("o2".into(), OrderStatus::Preparing).await,
            Err(StoreError::InvalidTransition {
                from: OrderStatus::Completed,
                to: OrderStatus::Preparing
            })
        );
        let untouched = strict.get_order("o2".into()).await.unwrap().unwrap();
        assert_eq!(untouched.status, OrderStatus::Completed);
    }

    #[tokio::test]
    async fn test_transition_of_unknown_order() {
        let backend = Arc::new(ScriptedBackend::new());
        let (client, _feed) = start(backend, TrackerConfig::default(), Vec::new());
        assert_eq!(
            client.transition("ghost".into(), OrderStatus::Ready).await,
            Err(StoreError::NotFound("ghost".into()))
        );
    }

    #[tokio::test]
    async fn test_update_refetch_after_delete_does_not_resurrect() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.put(order("o1", OrderStatus::Received));
        let (client, _feed) = start(backend.clone(), TrackerConfig::default(), backend.all());

        // the re-fetch reads the record, then its response is held in flight
        let gate = backend.hold_fetches("o1");
        let mut changed = order("o1", OrderStatus::Preparing);
        changed.customer_name = Some("changed".into());
        backend.put(changed.clone());
        client.apply_event(ChangeEvent::Update { new: changed.row() }).await.unwrap();

        backend.take("o1");
        client
            .apply_event(ChangeEvent::Delete { id: "o1".into(), old: None })
            .await
            .unwrap();
        assert!(client.snapshot().await.unwrap().is_empty());

        gate.notify_one();
        wait_for(|| {
            let backend = backend.clone();
            async move { backend.fetch_count("o1") == 1 }
        })
        .await;
        // a later request drains the completion that is already queued
        tokio::task::yield_now().await;
        assert!(client.get_order("o1".into()).await.unwrap().is_none());
        assert!(client.snapshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_falls_back_to_row_merge() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut original = order("o1", OrderStatus::Preparing);
        original.items.push(crate::domain::OrderLineItem {
            id: "li".into(),
            quantity: 1,
            notes: None,
            menu_item_name: Some("Biryani".into()),
        });
        let (client, _feed) = start(backend.clone(), TrackerConfig::default(), vec![original.clone()]);
        backend.fail_fetches(true);

        let mut row = original.row();
        row.status = OrderStatus::Ready;
        client.apply_event(ChangeEvent::Update { new: row }).await.unwrap();

        wait_for(|| {
            let client = client.clone();
            async move {
                let order = client.get_order("o1".into()).await.unwrap().unwrap();
                order.status == OrderStatus::Ready
            }
        })
        .await;
        let order = client.get_order("o1".into()).await.unwrap().unwrap();
        assert_eq!(order.items.len(), 1);
    }

    #[tokio::test]
    async fn test_insert_outside_list_window_is_not_counted_twice() {
        let backend = Arc::new(ScriptedBackend::new());
        let older = created_at("o1", 10);
        backend.put(older.clone());
        // o1 was created today but sits below the loaded list window
        let snapshot = PollSnapshot {
            orders: Vec::new(),
            created_today: vec![(older.id.clone(), older.created_at)],
        };
        let (client, _feed) = start_with(backend.clone(), TrackerConfig::default(), Arc::new(FixedClock::at(12, 0)), snapshot);

        client.apply_event(ChangeEvent::Insert { new: older.row() }).await.unwrap();
        client.apply_event(ChangeEvent::Insert { new: older.row() }).await.unwrap();
        wait_for(|| {
            let client = client.clone();
            async move { client.get_order("o1".into()).await.unwrap().is_some() }
        })
        .await;

        let hourly = client.hourly_activity().await.unwrap();
        assert_eq!(hourly.count(10), 1);
        assert_eq!(hourly.total(), 1);
    }

    #[tokio::test]
    async fn test_delete_replayed_after_poll_leaves_hourly_alone() {
        let backend = Arc::new(ScriptedBackend::new());
        let (a, b) = (created_at("a", 10), created_at("b", 10));
        let snapshot = PollSnapshot {
            orders: vec![a.clone(), b.clone()],
            created_today: vec![(a.id.clone(), a.created_at), (b.id.clone(), b.created_at)],
        };
        let (client, _feed) = start_with(backend, TrackerConfig::default(), Arc::new(FixedClock::at(12, 0)), snapshot);

        let delete_b = ChangeEvent::Delete { id: "b".into(), old: Some(b.row()) };
        client.apply_event(delete_b.clone()).await.unwrap();
        assert_eq!(client.hourly_activity().await.unwrap().count(10), 1);

        let ticket = client.begin_poll().await.unwrap();
        let refreshed = PollSnapshot {
            orders: vec![a.clone()],
            created_today: vec![(a.id.clone(), a.created_at)],
        };
        client.apply_poll(ticket, refreshed).await.unwrap();
        client.apply_event(delete_b).await.unwrap();

        let hourly = client.hourly_activity().await.unwrap();
        assert_eq!(hourly.count(10), 1);
        assert!(hourly.is_counted("a"));
        assert!(!hourly.is_counted("b"));
    }

    #[tokio::test]
    async fn test_hourly_starts_over_on_a_new_day() {
        let backend = Arc::new(ScriptedBackend::new());
        let yesterday = created_at("old", 10);
        let clock = Arc::new(FixedClock::at(23, 0));
        let snapshot = PollSnapshot {
            orders: vec![yesterday.clone()],
            created_today: vec![(yesterday.id.clone(), yesterday.created_at)],
        };
        let (client, _feed) = start_with(backend.clone(), TrackerConfig::default(), clock.clone(), snapshot);
        assert_eq!(client.hourly_activity().await.unwrap().total(), 1);

        let next_morning = local_time(9, 0) + Duration::days(1);
        clock.set(next_morning);
        let mut fresh = order("new", OrderStatus::Received);
        fresh.created_at = next_morning.with_timezone(&Utc);
        backend.put(fresh.clone());
        client.apply_event(ChangeEvent::Insert { new: fresh.row() }).await.unwrap();

        let hourly = client.hourly_activity().await.unwrap();
        assert_eq!(hourly.day(), next_morning.date_naive());
        assert_eq!(hourly.count(10), 0);
        assert_eq!(hourly.count(9), 1);
        assert_eq!(hourly.total(), 1);
    }
}
