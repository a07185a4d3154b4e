pub mod collection;
pub mod order_store;

pub use collection::Ticket;
pub use order_store::OrderStoreService;
