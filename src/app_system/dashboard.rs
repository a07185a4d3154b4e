//! One-shot dashboard summary.

use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use tracing::{debug, instrument};

use super::RecentOrders;
use crate::backend::{ChangeEvent, OrderBackend};
use crate::clock::{start_of_day, Clock};
use crate::config::TrackerConfig;
use crate::domain::{HourlyActivity, Order, OrderStatus};
use crate::error::StoreError;

#[derive(Debug, Clone)]
pub struct DashboardSummary {
    /// Orders still moving through the kitchen.
    pub pending_orders: u64,
    pub completed_orders: u64,
    pub todays_revenue: Decimal,
    pub hourly: HourlyActivity,
    pub recent: RecentOrders,
}

impl DashboardSummary {
    /// Folds a pushed change into the recent list and the hourly chart.
    ///
    /// Counts and revenue are only refreshed by reloading.
    pub fn apply_event(&mut self, event: &ChangeEvent, now: DateTime<FixedOffset>) {
        match event {
            ChangeEvent::Insert { new } => {
                self.hourly.record_created(&new.id, new.created_at, now);
            }
            ChangeEvent::Delete { id, .. } => {
                self.hourly.record_removed(id, now);
            }
            ChangeEvent::Update { .. } => {}
        }
        self.recent.apply(event);
    }
}

#[instrument(skip_all)]
pub async fn load_dashboard(
    backend: &dyn OrderBackend,
    clock: &dyn Clock,
    config: &TrackerConfig,
) -> Result<DashboardSummary, StoreError> {
    let now = clock.now();
    let active: Vec<OrderStatus> = OrderStatus::ALL.into_iter().filter(|s| s.is_active()).collect();

    let (pending_orders, completed_orders, today, recent) = tokio::try_join!(
        backend.count_by_status(&active),
        backend.count_by_status(&[OrderStatus::Completed]),
        backend.fetch_created_since(start_of_day(now)),
        backend.fetch_recent(Some(config.recent_limit)),
    )?;

    let todays_revenue = today.iter().map(|row| row.total_amount).sum();
    let hourly = HourlyActivity::rebuild(today.iter().map(|row| (row.id.clone(), row.created_at)), now);
    debug!(pending_orders, completed_orders, today = today.len(), "Dashboard loaded");

    Ok(DashboardSummary {
        pending_orders,
        completed_orders,
        todays_revenue,
        hourly,
        recent: RecentOrders::new(recent.iter().map(Order::row).collect(), config.recent_limit),
    })
}
