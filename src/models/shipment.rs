use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use utoipa::ToSchema;

/// Shipment lifecycle status.
///
/// `Delivered` and `Rejected` are terminal. Stored as the display strings the
/// rest of the platform already uses (`"In Transit"` with a space).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum ShipmentStatus {
    #[sea_orm(string_value = "Pending")]
    Pending,
    #[sea_orm(string_value = "In Transit")]
    #[serde(rename = "In Transit")]
    InTransit,
    #[sea_orm(string_value = "Delivered")]
    Delivered,
    #[sea_orm(string_value = "Rejected")]
    Rejected,
}

impl fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShipmentStatus::Pending => write!(f, "Pending"),
            ShipmentStatus::InTransit => write!(f, "In Transit"),
            ShipmentStatus::Delivered => write!(f, "Delivered"),
            ShipmentStatus::Rejected => write!(f, "Rejected"),
        }
    }
}

/// Something a distributor or driver does to a shipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShipmentAction {
    Accept,
    Reject,
    AssignDriver,
    ConfirmDelivery,
    /// Distributor routes the shipment to a store address by hand
    RouteToStore,
    ReportLocation,
}

impl fmt::Display for ShipmentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShipmentAction::Accept => "accept",
            ShipmentAction::Reject => "reject",
            ShipmentAction::AssignDriver => "assign a driver to",
            ShipmentAction::ConfirmDelivery => "confirm delivery of",
            ShipmentAction::RouteToStore => "update the store location of",
            ShipmentAction::ReportLocation => "report the location of",
        };
        f.write_str(name)
    }
}

/// Status and acceptance after a permitted action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub status: ShipmentStatus,
    pub acceptance: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot {action} a shipment that is {from}")]
pub struct TransitionError {
    pub from: ShipmentStatus,
    pub action: ShipmentAction,
}

impl From<TransitionError> for crate::errors::ServiceError {
    fn from(err: TransitionError) -> Self {
        crate::errors::ServiceError::InvalidState(err.to_string())
    }
}

impl ShipmentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ShipmentStatus::Delivered | ShipmentStatus::Rejected)
    }

    /// The complete transition table. Anything not listed is rejected.
    pub fn apply(
        self,
        acceptance: Option<bool>,
        action: ShipmentAction,
    ) -> Result<Transition, TransitionError> {
        use ShipmentAction as A;
        use ShipmentStatus as S;

        let accepted = acceptance == Some(true);
        let next = |status: ShipmentStatus,
                    acceptance: Option<bool>|
         -> Result<Transition, TransitionError> { Ok(Transition { status, acceptance }) };

        match (self, action) {
            (S::Pending, A::Accept) => next(S::InTransit, Some(true)),
            (S::Pending, A::Reject) => next(S::Rejected, Some(false)),
            (S::InTransit, A::AssignDriver) if accepted => next(S::InTransit, acceptance),
            (S::InTransit, A::ConfirmDelivery) if accepted => next(S::Delivered, acceptance),
            // Routing a pending shipment to a store is an implicit acceptance
            (S::Pending, A::RouteToStore) => next(S::InTransit, Some(true)),
            (S::InTransit, A::RouteToStore) => next(S::InTransit, acceptance),
            (status, A::ReportLocation) => next(status, acceptance),
            (from, action) => Err(TransitionError { from, action }),
        }
    }
}

/// Shipment entity model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "shipments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub product_id: i32,
    pub destination: String,
    pub status: ShipmentStatus,
    pub company_id: String,
    pub distributor_id: Option<String>,
    pub store_id: Option<i32>,
    pub driver_id: Option<i32>,
    pub quantity: Option<i32>,
    pub is_accepted_by_distributor: Option<bool>,
    #[sea_orm(column_type = "Decimal(Some((16, 9)))", nullable)]
    pub destination_latitude: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((16, 9)))", nullable)]
    pub destination_longitude: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::driver::Entity",
        from = "Column::DriverId",
        to = "super::driver::Column::Id"
    )]
    Driver,
    #[sea_orm(
        belongs_to = "super::store::Entity",
        from = "Column::StoreId",
        to = "super::store::Column::Id"
    )]
    Store,
    #[sea_orm(has_many = "super::vehicle_location::Entity")]
    VehicleLocations,
}

impl Related<super::driver::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Driver.def()
    }
}

impl Related<super::store::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Store.def()
    }
}

impl Related<super::vehicle_location::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::VehicleLocations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
