use crate::backend::ChangeEvent;
use crate::domain::OrderRow;

/// The dashboard's short "recent orders" list.
///
/// Reconciles from event payloads alone; nothing is re-fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct RecentOrders {
    rows: Vec<OrderRow>,
    limit: usize,
}

impl RecentOrders {
    pub fn new(mut rows: Vec<OrderRow>, limit: usize) -> Self {
        rows.truncate(limit);
        Self { rows, limit }
    }

    pub fn rows(&self) -> &[OrderRow] {
        &self.rows
    }

    pub fn apply(&mut self, event: &ChangeEvent) {
        match event {
            ChangeEvent::Insert { new } => {
                if self.rows.iter().any(|row| row.id == new.id) {
                    return;
                }
                self.rows.insert(0, new.clone());
                self.rows.truncate(self.limit);
            }
            ChangeEvent::Update { new } => {
                if let Some(row) = self.rows.iter_mut().find(|row| row.id == new.id) {
                    *row = new.clone();
                }
            }
            ChangeEvent::Delete { id, .. } => self.rows.retain(|row| &row.id != id),
        }
    }
}
