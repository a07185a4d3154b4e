use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::OrderStatus;

pub type OrderId = String;

/// A single line on an order, as joined from the menu at order time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub id: String,
    pub quantity: u32,
    pub notes: Option<String>,
    /// `None` once the menu item has been deleted.
    pub menu_item_name: Option<String>,
}

impl OrderLineItem {
    pub fn display_name(&self) -> &str {
        self.menu_item_name.as_deref().unwrap_or("Item deleted")
    }
}

/// Represents a customer order together with its line items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub status: OrderStatus,
    pub customer_name: Option<String>,
    pub table_number: Option<String>,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<OrderLineItem>,
}

/// Scalar row image of an order, as carried by change events (no joined items).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRow {
    pub id: OrderId,
    pub status: OrderStatus,
    pub customer_name: Option<String>,
    pub table_number: Option<String>,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn row(&self) -> OrderRow {
        OrderRow {
            id: self.id.clone(),
            status: self.status,
            customer_name: self.customer_name.clone(),
            table_number: self.table_number.clone(),
            total_amount: self.total_amount,
            created_at: self.created_at,
        }
    }

    /// Shallow merge of a pushed row image. Line items are kept as they are.
    pub fn merge_row(&mut self, row: &OrderRow) {
        self.status = row.status;
        self.customer_name = row.customer_name.clone();
        self.table_number = row.table_number.clone();
        self.total_amount = row.total_amount;
        self.created_at = row.created_at;
    }

    pub fn customer_display(&self) -> &str {
        customer_display(self.customer_name.as_deref())
    }

    pub fn short_id(&self, len: usize) -> &str {
        short_id(&self.id, len)
    }
}

impl OrderRow {
    pub fn customer_display(&self) -> &str {
        customer_display(self.customer_name.as_deref())
    }
}

fn customer_display(name: Option<&str>) -> &str {
    match name {
        Some(name) if !name.trim().is_empty() => name,
        _ => "Guest",
    }
}

/// First `len` characters of an id, for compact display.
pub fn short_id(id: &str, len: usize) -> &str {
    match id.char_indices().nth(len) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

/// Payload for placing a new order through the customer-facing surface.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub status: OrderStatus,
    pub customer_name: Option<String>,
    pub table_number: Option<String>,
    pub total_amount: Decimal,
    /// Defaults to the time the backing store accepts the order.
    pub created_at: Option<DateTime<Utc>>,
    pub items: Vec<NewLineItem>,
}

#[derive(Debug, Clone)]
pub struct NewLineItem {
    pub quantity: u32,
    pub notes: Option<String>,
    pub menu_item_name: String,
}

impl NewOrder {
    pub fn new(customer_name: Option<&str>, total_amount: Decimal) -> Self {
        Self {
            status: OrderStatus::Received,
            customer_name: customer_name.map(str::to_string),
            table_number: None,
            total_amount,
            created_at: None,
            items: Vec::new(),
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table_number = Some(table.into());
        self
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = status;
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    pub fn with_item(mut self, quantity: u32, menu_item_name: impl Into<String>, notes: Option<&str>) -> Self {
        self.items.push(NewLineItem {
            quantity,
            notes: notes.map(str::to_string),
            menu_item_name: menu_item_name.into(),
        });
        self
    }
}
