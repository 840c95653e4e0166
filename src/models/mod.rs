// Lifecycle core
pub mod driver;
pub mod notification;
pub mod outbox_event;
pub mod shipment;
pub mod vehicle_location;

// Collaborator-owned tables read by the core
pub mod product;
pub mod store;
pub mod user_account;

// Re-export common types for convenience
pub use outbox_event::OutboxStatus;
pub use shipment::{ShipmentAction, ShipmentStatus, Transition, TransitionError};

pub use driver::Model as Driver;
pub use notification::Model as Notification;
pub use shipment::Model as Shipment;
pub use store::Model as Store;
pub use vehicle_location::Model as LocationFix;
