pub mod drivers;
pub mod locations;
pub mod notifications;
pub mod shipments;
pub mod stores;

use crate::events::{outbox::OutboxDispatcher, EventSender};
use crate::db::DbPool;
use crate::services::{
    drivers::DriverService, locations::LocationService, notifications::NotificationService,
    shipments::ShipmentService, stores::StoreService,
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub shipments: Arc<ShipmentService>,
    pub locations: Arc<LocationService>,
    pub notifications: Arc<NotificationService>,
    pub drivers: Arc<DriverService>,
    pub stores: Arc<StoreService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        outbox: Arc<OutboxDispatcher>,
    ) -> Self {
        Self {
            shipments: Arc::new(ShipmentService::new(
                db_pool.clone(),
                event_sender.clone(),
                outbox.clone(),
            )),
            locations: Arc::new(LocationService::new(
                db_pool.clone(),
                event_sender.clone(),
                outbox,
            )),
            notifications: Arc::new(NotificationService::new(db_pool.clone())),
            drivers: Arc::new(DriverService::new(db_pool.clone(), event_sender.clone())),
            stores: Arc::new(StoreService::new(db_pool, event_sender)),
        }
    }
}
