pub mod events;
pub mod order;
pub mod repository;
pub mod state;

pub use events::{NotificationEvent, OrderCreationRequested, OrderTimeoutCheck};
pub use order::Order;
pub use repository::{InMemoryOrderRepository, OrderRepository};
pub use state::OrderState;
