//! Per-role query filters.
//!
//! Every shipment, driver, store and notification query starts from one of the
//! selects here, so a caller only ever sees rows tied to its own id.

use crate::auth::{RequestContext, Role};
use crate::errors::ServiceError;
use crate::models::{driver, notification, shipment, store, user_account};
use sea_orm::{
    sea_query::Query, ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter, Select,
};

/// Filter matching the shipments `ctx` owns or is assigned to.
pub fn shipment_condition(ctx: &RequestContext) -> Condition {
    match ctx.role {
        Role::Company => Condition::all().add(shipment::Column::CompanyId.eq(ctx.user_id.as_str())),
        Role::Distributor => {
            Condition::all().add(shipment::Column::DistributorId.eq(ctx.user_id.as_str()))
        }
        Role::Driver => Condition::all().add(
            shipment::Column::DriverId.in_subquery(
                Query::select()
                    .column(driver::Column::Id)
                    .from(driver::Entity)
                    .and_where(driver::Column::UserId.eq(ctx.user_id.as_str()))
                    .to_owned(),
            ),
        ),
    }
}

/// `ScopedShipments(role, userId)`: never a global listing.
pub fn scoped_shipments(ctx: &RequestContext) -> Select<shipment::Entity> {
    shipment::Entity::find().filter(shipment_condition(ctx))
}

/// Read path lookup. Out-of-scope shipments are reported as missing so their
/// existence does not leak.
pub async fn find_visible_shipment<C: ConnectionTrait>(
    db: &C,
    ctx: &RequestContext,
    shipment_id: i32,
) -> Result<shipment::Model, ServiceError> {
    scoped_shipments(ctx)
        .filter(shipment::Column::Id.eq(shipment_id))
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::shipment_not_found(shipment_id))
}

/// Mutation path lookup: missing is `NotFound`, somebody else's is `Forbidden`.
pub async fn find_for_distributor<C: ConnectionTrait>(
    db: &C,
    shipment_id: i32,
    distributor_id: &str,
) -> Result<shipment::Model, ServiceError> {
    let shipment = shipment::Entity::find_by_id(shipment_id)
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::shipment_not_found(shipment_id))?;

    if shipment.distributor_id.as_deref() != Some(distributor_id) {
        return Err(ServiceError::Forbidden(format!(
            "shipment {} is not assigned to this distributor",
            shipment_id
        )));
    }
    Ok(shipment)
}

/// Resolves the driver record behind a driver's user id.
pub async fn driver_for_user<C: ConnectionTrait>(
    db: &C,
    user_id: &str,
) -> Result<Option<driver::Model>, ServiceError> {
    Ok(driver::Entity::find()
        .filter(driver::Column::UserId.eq(user_id))
        .one(db)
        .await?)
}

/// Lookups keyed by a distributor id need an account holding that role.
pub async fn require_distributor<C: ConnectionTrait>(
    db: &C,
    distributor_id: &str,
) -> Result<(), ServiceError> {
    match user_account::Entity::find_by_id(distributor_id.to_string())
        .one(db)
        .await?
    {
        Some(account) if account.role == Role::Distributor => Ok(()),
        _ => Err(ServiceError::NotFound(format!(
            "Distributor {} not found",
            distributor_id
        ))),
    }
}

pub fn scoped_drivers(distributor_id: &str) -> Select<driver::Entity> {
    driver::Entity::find().filter(driver::Column::DistributorId.eq(distributor_id))
}

pub fn scoped_stores(distributor_id: &str) -> Select<store::Entity> {
    store::Entity::find().filter(store::Column::DistributorId.eq(distributor_id))
}

pub fn scoped_notifications(user_id: &str) -> Select<notification::Entity> {
    notification::Entity::find().filter(notification::Column::UserId.eq(user_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DbBackend, QueryTrait};

    fn sql(ctx: &RequestContext) -> String {
        scoped_shipments(ctx).build(DbBackend::Sqlite).to_string()
    }

    #[test]
    fn company_scope_filters_on_owner() {
        let sql = sql(&RequestContext::new("acme", Role::Company));
        assert!(sql.contains(r#""shipments"."company_id" = 'acme'"#), "{sql}");
    }

    #[test]
    fn distributor_scope_filters_on_assignment() {
        let sql = sql(&RequestContext::new("d1", Role::Distributor));
        assert!(sql.contains(r#""shipments"."distributor_id" = 'd1'"#), "{sql}");
    }

    #[test]
    fn driver_scope_goes_through_driver_records() {
        let sql = sql(&RequestContext::new("drv-user", Role::Driver));
        assert!(sql.contains("IN (SELECT"), "{sql}");
        assert!(sql.contains(r#""drivers"."user_id" = 'drv-user'"#), "{sql}");
    }
}
