use crate::auth::Role;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Directory of platform accounts, owned by the identity provider and mirrored
/// here so assignments can be checked against a real account and role.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user_accounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub role: Role,
    pub full_name: String,
    pub address: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
