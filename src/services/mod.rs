// Shipment lifecycle
pub mod shipments;

// Location ledger
pub mod locations;

// Notification outbox
pub mod notifications;

// Distributor directory
pub mod drivers;
pub mod stores;
