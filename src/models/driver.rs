use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A driver employed by exactly one distributor. `user_id` links the driver's
/// own account, which is what the identity provider puts in `sub`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "drivers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub user_id: String,
    pub full_name: String,
    pub contact_number: Option<String>,
    #[sea_orm(unique)]
    pub license_number: String,
    #[sea_orm(unique)]
    pub national_id: String,
    pub distributor_id: String,
    pub date_hired: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::shipment::Entity")]
    Shipments,
}

impl Related<super::shipment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Shipments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
