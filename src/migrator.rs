use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_directory_tables::Migration),
            Box::new(m20240301_000002_create_stores_table::Migration),
            Box::new(m20240301_000003_create_drivers_table::Migration),
            Box::new(m20240301_000004_create_shipments_table::Migration),
            Box::new(m20240301_000005_create_vehicle_locations_table::Migration),
            Box::new(m20240301_000006_create_notifications_table::Migration),
            Box::new(m20240301_000007_create_outbox_events_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240301_000001_create_directory_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_directory_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Mirrors of identity and catalogue data, written by their owners
            manager
                .create_table(
                    Table::create()
                        .table(UserAccounts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(UserAccounts::Id)
                                .string()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(UserAccounts::Role).string().not_null())
                        .col(ColumnDef::new(UserAccounts::FullName).string().not_null())
                        .col(ColumnDef::new(UserAccounts::Address).string().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Products::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::CompanyId).string().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_company_id")
                        .table(Products::Table)
                        .col(Products::CompanyId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(UserAccounts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum UserAccounts {
        Table,
        Id,
        Role,
        FullName,
        Address,
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
        Name,
        CompanyId,
    }
}

mod m20240301_000002_create_stores_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_stores_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Stores::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Stores::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Stores::Name).string().not_null())
                        .col(ColumnDef::new(Stores::Address).string().not_null())
                        .col(ColumnDef::new(Stores::DistributorId).string().not_null())
                        .col(ColumnDef::new(Stores::Latitude).decimal_len(16, 9).null())
                        .col(ColumnDef::new(Stores::Longitude).decimal_len(16, 9).null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stores_distributor_name")
                        .table(Stores::Table)
                        .col(Stores::DistributorId)
                        .col(Stores::Name)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Stores::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Stores {
        Table,
        Id,
        Name,
        Address,
        DistributorId,
        Latitude,
        Longitude,
    }
}

mod m20240301_000003_create_drivers_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_drivers_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Drivers::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Drivers::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Drivers::UserId).string().not_null())
                        .col(ColumnDef::new(Drivers::FullName).string().not_null())
                        .col(ColumnDef::new(Drivers::ContactNumber).string().null())
                        .col(ColumnDef::new(Drivers::LicenseNumber).string().not_null())
                        .col(ColumnDef::new(Drivers::NationalId).string().not_null())
                        .col(ColumnDef::new(Drivers::DistributorId).string().not_null())
                        .col(
                            ColumnDef::new(Drivers::DateHired)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Uniqueness is enforced here as well as checked in the service
            for (name, col) in [
                ("uq_drivers_user_id", Drivers::UserId),
                ("uq_drivers_license_number", Drivers::LicenseNumber),
                ("uq_drivers_national_id", Drivers::NationalId),
            ] {
                manager
                    .create_index(
                        Index::create()
                            .if_not_exists()
                            .name(name)
                            .table(Drivers::Table)
                            .col(col)
                            .unique()
                            .to_owned(),
                    )
                    .await?;
            }

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_drivers_distributor_id")
                        .table(Drivers::Table)
                        .col(Drivers::DistributorId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Drivers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Drivers {
        Table,
        Id,
        UserId,
        FullName,
        ContactNumber,
        LicenseNumber,
        NationalId,
        DistributorId,
        DateHired,
    }
}

mod m20240301_000004_create_shipments_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_shipments_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Shipments::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Shipments::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Shipments::ProductId).integer().not_null())
                        .col(ColumnDef::new(Shipments::Destination).string().not_null())
                        .col(
                            ColumnDef::new(Shipments::Status)
                                .string()
                                .not_null()
                                .default("Pending"),
                        )
                        .col(ColumnDef::new(Shipments::CompanyId).string().not_null())
                        .col(ColumnDef::new(Shipments::DistributorId).string().null())
                        .col(ColumnDef::new(Shipments::StoreId).integer().null())
                        .col(ColumnDef::new(Shipments::DriverId).integer().null())
                        .col(ColumnDef::new(Shipments::Quantity).integer().null())
                        .col(
                            ColumnDef::new(Shipments::IsAcceptedByDistributor)
                                .boolean()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Shipments::DestinationLatitude)
                                .decimal_len(16, 9)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Shipments::DestinationLongitude)
                                .decimal_len(16, 9)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Shipments::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Shipments::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_shipments_driver")
                                .from(Shipments::Table, Shipments::DriverId)
                                .to(Drivers::Table, Drivers::Id)
                                .on_delete(ForeignKeyAction::SetNull),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_shipments_store")
                                .from(Shipments::Table, Shipments::StoreId)
                                .to(Stores::Table, Stores::Id)
                                .on_delete(ForeignKeyAction::SetNull),
                        )
                        .to_owned(),
                )
                .await?;

            for (name, col) in [
                ("idx_shipments_company_id", Shipments::CompanyId),
                ("idx_shipments_distributor_id", Shipments::DistributorId),
                ("idx_shipments_driver_id", Shipments::DriverId),
                ("idx_shipments_status", Shipments::Status),
            ] {
                manager
                    .create_index(
                        Index::create()
                            .if_not_exists()
                            .name(name)
                            .table(Shipments::Table)
                            .col(col)
                            .to_owned(),
                    )
                    .await?;
            }

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Shipments::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Shipments {
        Table,
        Id,
        ProductId,
        Destination,
        Status,
        CompanyId,
        DistributorId,
        StoreId,
        DriverId,
        Quantity,
        IsAcceptedByDistributor,
        DestinationLatitude,
        DestinationLongitude,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Drivers {
        Table,
        Id,
    }

    #[derive(DeriveIden)]
    enum Stores {
        Table,
        Id,
    }
}

mod m20240301_000005_create_vehicle_locations_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000005_create_vehicle_locations_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(VehicleLocations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(VehicleLocations::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(VehicleLocations::ShipmentId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(VehicleLocations::Latitude)
                                .decimal_len(16, 9)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(VehicleLocations::Longitude)
                                .decimal_len(16, 9)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(VehicleLocations::Timestamp)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_vehicle_locations_shipment")
                                .from(VehicleLocations::Table, VehicleLocations::ShipmentId)
                                .to(Shipments::Table, Shipments::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            // Serves both the latest-fix lookup and the ordered history scan
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_vehicle_locations_shipment_timestamp")
                        .table(VehicleLocations::Table)
                        .col(VehicleLocations::ShipmentId)
                        .col(VehicleLocations::Timestamp)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(VehicleLocations::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum VehicleLocations {
        Table,
        Id,
        ShipmentId,
        Latitude,
        Longitude,
        Timestamp,
    }

    #[derive(DeriveIden)]
    enum Shipments {
        Table,
        Id,
    }
}

mod m20240301_000006_create_notifications_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000006_create_notifications_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Notifications::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Notifications::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Notifications::UserId).string().not_null())
                        .col(ColumnDef::new(Notifications::ShipmentId).integer().null())
                        .col(ColumnDef::new(Notifications::Message).text().not_null())
                        .col(
                            ColumnDef::new(Notifications::IsRead)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(Notifications::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_notifications_user_unread")
                        .table(Notifications::Table)
                        .col(Notifications::UserId)
                        .col(Notifications::IsRead)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Notifications::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Notifications {
        Table,
        Id,
        UserId,
        ShipmentId,
        Message,
        IsRead,
        CreatedAt,
    }
}

mod m20240301_000007_create_outbox_events_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000007_create_outbox_events_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(OutboxEvents::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OutboxEvents::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(OutboxEvents::AggregateType).string().not_null())
                        .col(ColumnDef::new(OutboxEvents::AggregateId).string().null())
                        .col(ColumnDef::new(OutboxEvents::EventType).string().not_null())
                        .col(ColumnDef::new(OutboxEvents::Topic).string().not_null())
                        .col(ColumnDef::new(OutboxEvents::Payload).text().not_null())
                        .col(
                            ColumnDef::new(OutboxEvents::Status)
                                .string_len(16)
                                .not_null()
                                .default("pending"),
                        )
                        .col(
                            ColumnDef::new(OutboxEvents::Attempts)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(OutboxEvents::AvailableAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OutboxEvents::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OutboxEvents::ProcessedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(OutboxEvents::ErrorMessage).text().null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_outbox_events_status_available_at")
                        .table(OutboxEvents::Table)
                        .col(OutboxEvents::Status)
                        .col(OutboxEvents::AvailableAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OutboxEvents::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum OutboxEvents {
        Table,
        Id,
        AggregateType,
        AggregateId,
        EventType,
        Topic,
        Payload,
        Status,
        Attempts,
        AvailableAt,
        CreatedAt,
        ProcessedAt,
        ErrorMessage,
    }
}
