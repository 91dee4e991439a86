use axum::{
    Extension, Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use axum_helpers::{
    JwtAuth, JwtClaims, ValidatedJson,
    errors::responses::{
        BadRequestValidationResponse, InternalServerErrorResponse, NotFoundResponse,
        UnauthorizedResponse,
    },
    jwt_auth_middleware,
};
use std::sync::Arc;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::error::{AccountError, AccountResult};
use crate::models::{
    AuthResponse, ForgotPasswordRequest, ForgotPasswordResponse, LoginRequest, MessageResponse,
    ReferralEntry, ReferralStatus, RegisterRequest, ResetPasswordRequest, UserSummary,
};
use crate::repository::{ReferralRepository, UserRepository};
use crate::service::AccountService;
use crate::validation::FieldError;

pub const TAG: &str = "referrals";

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi
            .components
            .get_or_insert_with(utoipa::openapi::Components::default);

        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// OpenAPI documentation for the accounts and referrals API
#[derive(OpenApi)]
#[openapi(
    modifiers(&BearerAuth),
    paths(
        register,
        login,
        forgot_password,
        reset_password,
        list_referrals,
        referral_stats,
    ),
    components(
        schemas(
            RegisterRequest,
            LoginRequest,
            ForgotPasswordRequest,
            ResetPasswordRequest,
            AuthResponse,
            ForgotPasswordResponse,
            MessageResponse,
            ReferralEntry,
            ReferralStatus,
            UserSummary,
            FieldError,
        ),
        responses(
            BadRequestValidationResponse,
            NotFoundResponse,
            UnauthorizedResponse,
            InternalServerErrorResponse
        )
    ),
    tags(
        (name = TAG, description = "Registration, login, password reset and referral tracking")
    )
)]
pub struct ApiDoc;

/// Account and referral routes. `/referrals` and `/referral-stats` need a bearer token.
pub fn router<U, R>(service: AccountService<U, R>, tokens: JwtAuth) -> Router
where
    U: UserRepository + 'static,
    R: ReferralRepository + 'static,
{
    let shared_service = Arc::new(service);

    let protected = Router::new()
        .route("/referrals", get(list_referrals::<U, R>))
        .route("/referral-stats", get(referral_stats::<U, R>))
        .route_layer(middleware::from_fn_with_state(tokens, jwt_auth_middleware));

    Router::new()
        .route("/register", post(register::<U, R>))
        .route("/login", post(login::<U, R>))
        .route("/forgot-password", post(forgot_password::<U, R>))
        .route("/reset-password", post(reset_password::<U, R>))
        .merge(protected)
        .with_state(shared_service)
}

type SharedService<U, R> = State<Arc<AccountService<U, R>>>;

/// Register a new user, optionally with another user's referral code
#[utoipa::path(
    post,
    path = "/register",
    tag = TAG,
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = AuthResponse),
        (status = 400, response = BadRequestValidationResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn register<U: UserRepository, R: ReferralRepository>(
    State(service): SharedService<U, R>,
    ValidatedJson(input): ValidatedJson<RegisterRequest>,
) -> AccountResult<impl IntoResponse> {
    let response = service.register(input).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

#[utoipa::path(
    post,
    path = "/login",
    tag = TAG,
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 401, response = UnauthorizedResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn login<U: UserRepository, R: ReferralRepository>(
    State(service): SharedService<U, R>,
    Json(input): Json<LoginRequest>,
) -> AccountResult<Json<AuthResponse>> {
    Ok(Json(service.login(input).await?))
}

/// Issue a password reset token
///
/// The token is returned in the response body.
#[utoipa::path(
    post,
    path = "/forgot-password",
    tag = TAG,
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset token issued", body = ForgotPasswordResponse),
        (status = 404, response = NotFoundResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn forgot_password<U: UserRepository, R: ReferralRepository>(
    State(service): SharedService<U, R>,
    Json(input): Json<ForgotPasswordRequest>,
) -> AccountResult<Json<ForgotPasswordResponse>> {
    Ok(Json(service.request_password_reset(&input.email).await?))
}

/// Set a new password using a reset token
#[utoipa::path(
    post,
    path = "/reset-password",
    tag = TAG,
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, response = BadRequestValidationResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn reset_password<U: UserRepository, R: ReferralRepository>(
    State(service): SharedService<U, R>,
    ValidatedJson(input): ValidatedJson<ResetPasswordRequest>,
) -> AccountResult<Json<MessageResponse>> {
    Ok(Json(service.reset_password(input).await?))
}

/// Referrals made by the authenticated user, oldest first
#[utoipa::path(
    get,
    path = "/referrals",
    tag = TAG,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Referrals of the caller", body = Vec<ReferralEntry>),
        (status = 401, response = UnauthorizedResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn list_referrals<U: UserRepository, R: ReferralRepository>(
    State(service): SharedService<U, R>,
    Extension(claims): Extension<JwtClaims>,
) -> AccountResult<Json<Vec<ReferralEntry>>> {
    let requester = claims.user_id().map_err(AccountError::Unauthenticated)?;
    Ok(Json(service.list_referrals(requester).await?))
}

/// Referral counts of the authenticated user by status
#[utoipa::path(
    get,
    path = "/referral-stats",
    tag = TAG,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Count per status; absent statuses have no referrals",
            body = std::collections::BTreeMap<String, u64>, example = json!({"successful": 2})),
        (status = 401, response = UnauthorizedResponse),
        (status = 500, response = InternalServerErrorResponse)
    )
)]
async fn referral_stats<U: UserRepository, R: ReferralRepository>(
    State(service): SharedService<U, R>,
    Extension(claims): Extension<JwtClaims>,
) -> AccountResult<impl IntoResponse> {
    let requester = claims.user_id().map_err(AccountError::Unauthenticated)?;
    Ok(Json(service.referral_stats(requester).await?))
}
