//! View lifecycle, dashboard summary and process setup.

pub mod dashboard;
pub mod recent_orders;
pub mod telemetry;
pub mod tracking_view;

pub use dashboard::*;
pub use recent_orders::*;
pub use telemetry::*;
pub use tracking_view::*;
