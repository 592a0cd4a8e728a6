//! OpenAPI document for the public surface.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "service_key",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "airank",
        description = "Token-usage leaderboard: OTLP ingestion and ranked reads"
    ),
    paths(
        crate::api::handlers::metrics::ingest_metrics,
        crate::api::handlers::leaderboard::get_leaderboard,
        crate::api::handlers::users::get_user,
        crate::api::handlers::auth::verify_api_key,
        crate::api::handlers::auth::sync_profile,
        crate::api::handlers::device::create_device_code,
        crate::api::handlers::device::poll_device_code,
        crate::api::handlers::device::approve_device_code,
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "ingestion", description = "OTLP usage ingestion"),
        (name = "leaderboard", description = "Ranked leaderboard reads"),
        (name = "auth", description = "Credential verification and login flows"),
    )
)]
pub struct ApiDoc;
