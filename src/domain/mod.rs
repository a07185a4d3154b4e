pub mod hourly;
pub mod order;
pub mod status;

pub use hourly::*;
pub use order::*;
pub use status::*;
