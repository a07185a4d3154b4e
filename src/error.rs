use thiserror::Error;

use crate::backend::BackendError;
use crate::domain::{OrderId, OrderStatus};

/// Errors reported by the order store to its callers.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("Order not found: {0}")]
    NotFound(OrderId),
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("Actor communication error: {0}")]
    ActorCommunicationError(String),
}
