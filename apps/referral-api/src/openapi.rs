//! OpenAPI documentation configuration

use utoipa::OpenApi;

/// Combined OpenAPI documentation, served at `/api-docs/openapi.json`
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Referral API",
        version = "0.1.0",
        description = "User accounts with referral codes, referral listings and stats",
        license(name = "MIT")
    ),
    nest(
        (path = "/api", api = domain_referrals::ApiDoc)
    )
)]
pub struct ApiDoc;
