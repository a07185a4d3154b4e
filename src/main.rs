mod actor_framework;
mod actors;
mod app_system;
mod backend;
mod clients;
mod clock;
mod config;
mod domain;
mod error;
mod messages;
mod notifications;

#[cfg(test)]
mod mock_framework;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rust_decimal::Decimal;
use tracing::{info, warn, Instrument};

use crate::app_system::{load_dashboard, setup_tracing, OrderTrackingView};
use crate::backend::InMemoryBackend;
use crate::clock::SystemClock;
use crate::config::TrackerConfig;
use crate::domain::NewOrder;
use crate::notifications::NotificationLevel;

/// Kitchen order tracker running against an in-memory store.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML tracker configuration
    #[arg(short, long, env = "KITCHEN_ORDERS_CONFIG")]
    config: Option<PathBuf>,

    /// Customer orders to simulate
    #[arg(short, long, default_value_t = 5)]
    orders: usize,

    /// Seconds to keep the kitchen running
    #[arg(long, default_value_t = 3)]
    run_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    setup_tracing();

    let config = match &args.config {
        Some(path) => TrackerConfig::from_file(path).await?,
        None => TrackerConfig::default(),
    };
    info!(?config, "Starting kitchen order tracker");

    let backend = Arc::new(InMemoryBackend::new(config.channel_buffer));
    let clock = Arc::new(SystemClock);
    backend
        .place_order(NewOrder::new(Some("Walk-in"), Decimal::new(45000, 2)).with_item(1, "Thali", None))
        .await?;

    let (sink, mut feed) = notifications::channel();
    let toasts = tokio::spawn(async move {
        while let Some(toast) = feed.next().await {
            match toast.level {
                NotificationLevel::Error => warn!(title = %toast.title, "{}", toast.description),
                _ => info!(title = %toast.title, "{}", toast.description),
            }
        }
    });

    let view = OrderTrackingView::activate(backend.clone(), &config, clock.clone(), sink).await?;

    let customers = {
        let backend = backend.clone();
        let count = args.orders;
        tokio::spawn(
            async move {
                for n in 1..=count {
                    let placed = NewOrder::new(Some(format!("Customer {}", n).as_str()), Decimal::new(12000 + 1000 * n as i64, 2))
                        .with_table(format!("T{}", n))
                        .with_item(2, "Masala Dosa", Some("less spicy"));
                    if let Err(e) = backend.place_order(placed).await {
                        warn!(error = %e, "Placing order failed");
                    }
                    tokio::time::sleep(Duration::from_millis(250)).await;
                }
            }
            .instrument(tracing::info_span!("customers")),
        )
    };

    let kitchen_span = tracing::info_span!("kitchen");
    async {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(args.run_secs);
        while tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(400)).await;
            for order in view.client().snapshot().await? {
                let Some(action) = order.status.actions().into_iter().next() else {
                    continue;
                };
                info!(order_id = %order.short_id(8), action = action.label(), "Kitchen action");
                if let Err(e) = view.client().perform(order.id.clone(), action).await {
                    warn!(error = %e, "Kitchen action failed");
                }
            }
        }
        Ok::<_, Box<dyn std::error::Error>>(())
    }
    .instrument(kitchen_span)
    .await?;

    customers.await?;

    let summary = load_dashboard(backend.as_ref(), clock.as_ref(), &config).await?;
    info!(
        pending = summary.pending_orders,
        completed = summary.completed_orders,
        revenue = %summary.todays_revenue,
        "Dashboard summary"
    );
    for (hour, orders) in summary.hourly.non_zero() {
        info!(%hour, orders, "Hourly activity");
    }
    for row in summary.recent.rows() {
        info!(order_id = %row.id, status = %row.status, total = %row.total_amount, "Recent order");
    }

    view.deactivate().await?;
    toasts.abort();

    info!("Kitchen closed");
    Ok(())
}
