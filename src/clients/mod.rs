use tokio::sync::{mpsc, oneshot};
use tracing::{debug, instrument};

use crate::actors::Ticket;
use crate::backend::ChangeEvent;
use crate::domain::{HourlyActivity, Order, OrderAction, OrderId, OrderStatus};
use crate::error::StoreError;
use crate::messages::{OrderStoreRequest, PollSnapshot};

macro_rules! client_method {
    ($client:ty => fn $method:ident($($param:ident: $param_type:ty),*) -> $return_type:ty as $request:ident::$variant:ident, Error = $error_type:ty) => {
        impl $client {
            #[instrument(skip(self))]
            pub async fn $method(&self, $($param: $param_type),*) -> Result<$return_type, $error_type> {
                debug!("Sending request");
                let (respond_to, response) = oneshot::channel();
                self.sender.send($request::$variant {
                    $($param,)*
                    respond_to,
                }).await.map_err(|_| <$error_type>::ActorCommunicationError("Actor closed".to_string()))?;

                response.await.map_err(|_| <$error_type>::ActorCommunicationError("Actor dropped".to_string()))?
            }
        }
    };
}

/// Handle to a running [`OrderStoreService`](crate::actors::OrderStoreService).
#[derive(Clone)]
pub struct OrderStoreClient {
    sender: mpsc::Sender<OrderStoreRequest>,
}

impl OrderStoreClient {
    pub fn new(sender: mpsc::Sender<OrderStoreRequest>) -> Self {
        Self { sender }
    }

    /// Applies a poll result fetched under `ticket`.
    #[instrument(skip(self, snapshot), fields(orders = snapshot.orders.len()))]
    pub async fn apply_poll(&self, ticket: Ticket, snapshot: PollSnapshot) -> Result<(), StoreError> {
        debug!("Sending request");
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(OrderStoreRequest::ApplyPoll {
                ticket,
                snapshot,
                respond_to,
            })
            .await
            .map_err(|_| StoreError::ActorCommunicationError("Actor closed".to_string()))?;

        response
            .await
            .map_err(|_| StoreError::ActorCommunicationError("Actor dropped".to_string()))?
    }

    /// Runs one of the kitchen's status actions.
    pub async fn perform(&self, id: OrderId, action: OrderAction) -> Result<(), StoreError> {
        self.transition(id, action.target()).await
    }

    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        debug!("Sending shutdown");
        self.sender
            .send(OrderStoreRequest::Shutdown)
            .await
            .map_err(|_| StoreError::ActorCommunicationError("Actor closed".to_string()))
    }
}

client_method!(OrderStoreClient => fn snapshot() -> Vec<Order> as OrderStoreRequest::Snapshot, Error = StoreError);
client_method!(OrderStoreClient => fn get_order(id: OrderId) -> Option<Order> as OrderStoreRequest::GetOrder, Error = StoreError);
client_method!(OrderStoreClient => fn hourly_activity() -> HourlyActivity as OrderStoreRequest::HourlyActivity, Error = StoreError);
client_method!(OrderStoreClient => fn transition(id: OrderId, status: OrderStatus) -> () as OrderStoreRequest::Transition, Error = StoreError);
client_method!(OrderStoreClient => fn apply_event(event: ChangeEvent) -> () as OrderStoreRequest::ApplyEvent, Error = StoreError);
client_method!(OrderStoreClient => fn begin_poll() -> Ticket as OrderStoreRequest::BeginPoll, Error = StoreError);
