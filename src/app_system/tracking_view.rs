use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn, Instrument};

use crate::actors::OrderStoreService;
use crate::backend::{OrderBackend, Subscription};
use crate::clients::OrderStoreClient;
use crate::clock::{start_of_day, Clock};
use crate::config::TrackerConfig;
use crate::error::StoreError;
use crate::messages::PollSnapshot;
use crate::notifications::NotificationSink;

/// The live order list of the kitchen dashboard.
///
/// Owns every task tied to the view being on screen: the store actor, the
/// change-event pump and the reconciling poll. They are started together by
/// [`activate`](Self::activate) and torn down together by
/// [`deactivate`](Self::deactivate) or by dropping the view.
pub struct OrderTrackingView {
    client: OrderStoreClient,
    backend: Arc<dyn OrderBackend>,
    clock: Arc<dyn Clock>,
    poll_limit: usize,
    store: Option<JoinHandle<()>>,
    background: Vec<JoinHandle<()>>,
}

impl OrderTrackingView {
    #[instrument(name = "activate_view", skip_all)]
    pub async fn activate(
        backend: Arc<dyn OrderBackend>,
        config: &TrackerConfig,
        clock: Arc<dyn Clock>,
        notifier: NotificationSink,
    ) -> Result<Self, StoreError> {
        let subscription = backend.subscribe().await?;
        let initial = load_snapshot(backend.as_ref(), None, clock.as_ref()).await?;
        info!(orders = initial.orders.len(), "Initial orders loaded");

        let (service, client) = OrderStoreService::new(config, backend.clone(), clock.clone(), notifier, initial);
        let store = tokio::spawn(service.run());

        let pump = tokio::spawn(pump_events(subscription, client.clone()).in_current_span());
        let poll = tokio::spawn(
            poll_periodically(
                backend.clone(),
                clock.clone(),
                client.clone(),
                config.poll_interval(),
                config.poll_limit,
            )
            .in_current_span(),
        );

        Ok(Self {
            client,
            backend,
            clock,
            poll_limit: config.poll_limit,
            store: Some(store),
            background: vec![pump, poll],
        })
    }

    pub fn client(&self) -> &OrderStoreClient {
        &self.client
    }

    /// Runs one reconciling poll now, outside the regular schedule.
    pub async fn refresh(&self) -> Result<(), StoreError> {
        poll_once(self.backend.as_ref(), self.clock.as_ref(), &self.client, self.poll_limit).await
    }

    /// Stops the pump and the poll, releasing the subscription, then stops the store.
    #[instrument(name = "deactivate_view", skip_all)]
    pub async fn deactivate(mut self) -> Result<(), StoreError> {
        info!("Deactivating order view");
        for handle in self.background.drain(..) {
            handle.abort();
            match handle.await {
                Err(e) if e.is_panic() => error!("View task panicked: {:?}", e),
                _ => {}
            }
        }

        self.client.shutdown().await?;
        if let Some(store) = self.store.take() {
            if let Err(e) = store.await {
                error!("Order store task failed: {:?}", e);
                return Err(StoreError::ActorCommunicationError(e.to_string()));
            }
        }

        info!("Order view deactivated");
        Ok(())
    }
}

impl Drop for OrderTrackingView {
    fn drop(&mut self) {
        for handle in &self.background {
            handle.abort();
        }
        if let Some(store) = &self.store {
            store.abort();
        }
    }
}

/// Loads the newest orders together with today's creation instants.
///
/// `limit` of `None` loads every order.
pub async fn load_snapshot(
    backend: &dyn OrderBackend,
    limit: Option<usize>,
    clock: &dyn Clock,
) -> Result<PollSnapshot, StoreError> {
    let since = start_of_day(clock.now());
    let (orders, today) = tokio::try_join!(backend.fetch_recent(limit), backend.fetch_created_since(since))?;
    Ok(PollSnapshot {
        orders,
        created_today: today.into_iter().map(|row| (row.id, row.created_at)).collect(),
    })
}

async fn pump_events(mut subscription: Subscription, client: OrderStoreClient) {
    while let Some(event) = subscription.next_event().await {
        if let Err(e) = client.apply_event(event).await {
            warn!(error = %e, "Order store gone; stopping event pump");
            return;
        }
    }
    debug!("Change subscription closed");
}

async fn poll_periodically(
    backend: Arc<dyn OrderBackend>,
    clock: Arc<dyn Clock>,
    client: OrderStoreClient,
    period: Duration,
    limit: usize,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match poll_once(backend.as_ref(), clock.as_ref(), &client, limit).await {
            Ok(()) => {}
            Err(StoreError::ActorCommunicationError(reason)) => {
                debug!(%reason, "Order store gone; stopping poll");
                return;
            }
            Err(e) => warn!(error = %e, "Reconciling poll failed"),
        }
    }
}

#[instrument(skip(backend, clock, client))]
async fn poll_once(
    backend: &dyn OrderBackend,
    clock: &dyn Clock,
    client: &OrderStoreClient,
    limit: usize,
) -> Result<(), StoreError> {
    let ticket = client.begin_poll().await?;
    let snapshot = load_snapshot(backend, Some(limit), clock).await?;
    debug!(%ticket, orders = snapshot.orders.len(), "Poll fetched");
    client.apply_poll(ticket, snapshot).await
}
