use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "PharmaFlow Tracking API",
        version = "1.0.0",
        description = r#"
# PharmaFlow Tracking API

Shipment lifecycle and live tracking for pharmaceutical distribution.

## Roles

- **company**: creates shipments and follows them
- **distributor**: accepts or rejects shipments, assigns drivers, routes to stores, confirms delivery
- **driver**: reports GPS fixes and trip start/end for assigned shipments

Every caller only sees the shipments tied to its own id.

## Authentication

All endpoints require a bearer JWT:

```
Authorization: Bearer <your-jwt-token>
```

The realtime websocket at `/api/v1/realtime` also accepts `?access_token=<token>`.

## Error Handling

```json
{
  "error": "Conflict",
  "message": "Invalid state: cannot accept a shipment that is In Transit",
  "request_id": "2c5e...",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "shipments", description = "Shipment lifecycle"),
        (name = "locations", description = "Location ledger"),
        (name = "notifications", description = "User notifications"),
        (name = "drivers", description = "Distributor driver roster"),
        (name = "stores", description = "Distributor stores")
    ),
    paths(
        // Shipments
        crate::handlers::shipments::create_shipment,
        crate::handlers::shipments::list_shipments,
        crate::handlers::shipments::shipment_summary,
        crate::handlers::shipments::get_shipment,
        crate::handlers::shipments::accept_shipment,
        crate::handlers::shipments::reject_shipment,
        crate::handlers::shipments::assign_driver,
        crate::handlers::shipments::confirm_delivery,
        crate::handlers::shipments::update_store_location,

        // Locations
        crate::handlers::locations::report_location,
        crate::handlers::locations::latest_location,
        crate::handlers::locations::location_history,

        // Notifications
        crate::handlers::notifications::list_unread,
        crate::handlers::notifications::mark_read,

        // Drivers and stores
        crate::handlers::drivers::list_drivers,
        crate::handlers::drivers::add_driver,
        crate::handlers::drivers::update_driver,
        crate::handlers::drivers::remove_driver,
        crate::handlers::drivers::distributor_drivers,
        crate::handlers::stores::list_stores,
        crate::handlers::stores::add_store,
        crate::handlers::stores::distributor_stores,
    ),
    components(
        schemas(
            crate::ApiResponse<serde_json::Value>,
            crate::models::ShipmentStatus,
            crate::auth::Role,
            crate::realtime::RealtimeEvent,

            crate::handlers::shipments::ShipmentResponse,
            crate::handlers::shipments::CreateShipmentRequest,
            crate::handlers::shipments::AssignDriverRequest,
            crate::handlers::shipments::StoreLocationRequest,
            crate::services::shipments::ShipmentSummary,

            crate::handlers::locations::LocationResponse,
            crate::handlers::locations::ReportLocationRequest,

            crate::handlers::notifications::NotificationResponse,
            crate::handlers::notifications::MarkReadRequest,
            crate::handlers::notifications::MarkReadResponse,

            crate::handlers::drivers::DriverResponse,
            crate::handlers::drivers::AddDriverRequest,
            crate::handlers::drivers::UpdateDriverRequest,
            crate::handlers::drivers::DriverSummary,
            crate::handlers::stores::StoreResponse,
            crate::handlers::stores::AddStoreRequest,

            crate::errors::ErrorResponse
        )
    ),
    modifiers(&BearerAuth),
    security(("bearer_auth" = []))
)]
pub struct ApiDocV1;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
