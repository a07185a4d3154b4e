use chrono::Utc;
use rust_decimal::Decimal;

use crate::actor_framework::Entity;
use crate::domain::{NewOrder, Order, OrderLineItem, OrderStatus};

/// Column updates accepted by the backing store.
#[derive(Debug, Clone, Default)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
}

impl Entity for Order {
    type Id = String;
    type CreatePayload = NewOrder;
    type Patch = OrderPatch;

    fn id(&self) -> &String {
        &self.id
    }

    /// Creates a stored order from a placed order.
    ///
    /// # Notes
    /// Line items get ids derived from the order id, and `created_at`
    /// defaults to the moment the store accepts the order.
    fn from_create(id: String, payload: NewOrder) -> Result<Self, String> {
        let items = payload
            .items
            .into_iter()
            .enumerate()
            .map(|(n, item)| OrderLineItem {
                id: format!("{}-{}", id, n + 1),
                quantity: item.quantity,
                notes: item.notes,
                menu_item_name: Some(item.menu_item_name),
            })
            .collect();

        Ok(Self {
            id,
            status: payload.status,
            customer_name: payload.customer_name,
            table_number: payload.table_number,
            total_amount: payload.total_amount,
            created_at: payload.created_at.unwrap_or_else(Utc::now),
            items,
        })
    }

    /// Orders enter the kitchen as received or pending, with a non-negative total.
    fn on_create(&mut self) -> Result<(), String> {
        if !matches!(self.status, OrderStatus::Received | OrderStatus::Pending) {
            return Err(format!("new orders cannot start as {}", self.status));
        }
        if self.total_amount < Decimal::ZERO {
            return Err(format!("negative total amount: {}", self.total_amount));
        }
        Ok(())
    }

    fn on_update(&mut self, patch: OrderPatch) -> Result<(), String> {
        if let Some(status) = patch.status {
            self.status = status;
        }
        Ok(())
    }
}
