use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::actors::collection::{OptimisticTag, Ticket};
use crate::backend::{BackendError, ChangeEvent};
use crate::domain::{HourlyActivity, Order, OrderId, OrderRow, OrderStatus};
use crate::error::StoreError;

/// Generic type aliases for service communication
pub type ServiceResult<T, E> = std::result::Result<T, E>;
pub type ServiceResponse<T, E> = oneshot::Sender<ServiceResult<T, E>>;

/// Result of a bulk load or reconciling poll.
#[derive(Debug, Clone, Default)]
pub struct PollSnapshot {
    /// Newest first.
    pub orders: Vec<Order>,
    /// Id and creation instant of every order placed since local midnight.
    pub created_today: Vec<(OrderId, DateTime<Utc>)>,
}

/// Typed messages for the order store. Requests carry a oneshot channel for
/// the response; completions are posted back by the store's own background
/// fetches.
#[derive(Debug)]
pub enum OrderStoreRequest {
    Snapshot {
        respond_to: ServiceResponse<Vec<Order>, StoreError>,
    },
    GetOrder {
        id: OrderId,
        respond_to: ServiceResponse<Option<Order>, StoreError>,
    },
    HourlyActivity {
        respond_to: ServiceResponse<HourlyActivity, StoreError>,
    },
    Transition {
        id: OrderId,
        status: OrderStatus,
        respond_to: ServiceResponse<(), StoreError>,
    },
    ApplyEvent {
        event: ChangeEvent,
        respond_to: ServiceResponse<(), StoreError>,
    },
    BeginPoll {
        respond_to: ServiceResponse<Ticket, StoreError>,
    },
    ApplyPoll {
        ticket: Ticket,
        snapshot: PollSnapshot,
        respond_to: ServiceResponse<(), StoreError>,
    },
    InsertFetched {
        id: OrderId,
        ticket: Ticket,
        result: Result<Option<Order>, BackendError>,
    },
    UpdateFetched {
        row: OrderRow,
        ticket: Ticket,
        result: Result<Option<Order>, BackendError>,
    },
    TransitionPersisted {
        id: OrderId,
        tag: OptimisticTag,
        result: Result<(), BackendError>,
        respond_to: ServiceResponse<(), StoreError>,
    },
    Shutdown,
}
