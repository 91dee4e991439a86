use super::shutdown::ShutdownCoordinator;
use crate::errors::handlers::not_found;
use crate::http::{
    cors::create_cors_layer,
    rate_limit::{RateLimitConfig, rate_limit},
    security::security_headers,
};
use axum::{Router, http::HeaderValue, middleware};
use core_config::{FromEnv, server::ServerConfig};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::compression::CompressionLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{Level, info};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Parse the comma-separated `CORS_ALLOWED_ORIGIN` list.
fn cors_origins_from_env() -> io::Result<Vec<HeaderValue>> {
    let raw = std::env::var("CORS_ALLOWED_ORIGIN").map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "CORS_ALLOWED_ORIGIN environment variable is required. Example: CORS_ALLOWED_ORIGIN=http://localhost:3000",
        )
    })?;

    let origins = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(HeaderValue::from_str)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Invalid CORS_ALLOWED_ORIGIN value: {e}"),
            )
        })?;

    if origins.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "CORS_ALLOWED_ORIGIN cannot be empty",
        ));
    }

    info!(origins = %raw, "CORS configured");
    Ok(origins)
}

/// Wrap domain routes with docs and cross-cutting layers.
///
/// - Swagger UI at `/swagger-ui`, OpenAPI document at `/api-docs/openapi.json`
/// - `apis` nested under `/api`
/// - JSON 404 fallback
/// - per-IP rate limiting from `RATE_LIMIT_MAX_REQUESTS` / `RATE_LIMIT_WINDOW_SECS`
/// - request tracing, security headers, CORS from `CORS_ALLOWED_ORIGIN`, compression
///
/// `apis` must already have its state applied.
///
/// # Errors
/// Fails when `CORS_ALLOWED_ORIGIN` is unset, empty or not a valid header value,
/// or when the rate limit variables do not parse.
pub fn create_router<T>(apis: Router) -> io::Result<Router>
where
    T: OpenApi + 'static,
{
    let cors_layer = create_cors_layer(cors_origins_from_env()?);
    let rate_limit_config = RateLimitConfig::from_env()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

    let router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", T::openapi()))
        .nest("/api", apis)
        .fallback(not_found);

    let router = rate_limit(router, &rate_limit_config)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(middleware::from_fn(security_headers))
        .layer(cors_layer)
        .layer(CompressionLayer::new());

    Ok(router)
}

/// Serve `router` until SIGINT/SIGTERM, then run `cleanup` within `shutdown_timeout`.
///
/// In-flight requests finish before `cleanup` starts. Peer addresses are
/// attached to every request for the rate limiter.
pub async fn create_production_app<F>(
    router: Router,
    server_config: &ServerConfig,
    shutdown_timeout: Duration,
    cleanup: F,
) -> io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let (coordinator, mut shutdown_rx) = ShutdownCoordinator::new();

    let listener = tokio::net::TcpListener::bind(server_config.address()).await?;
    info!("Server starting on {}", listener.local_addr()?);

    let signal_handle = coordinator.clone();
    tokio::spawn(async move { signal_handle.wait_for_signal().await });

    let serve_result = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await
        .inspect_err(|e| tracing::error!("Server encountered an error: {:?}", e));

    info!(timeout = ?shutdown_timeout, "Running cleanup");
    if tokio::time::timeout(shutdown_timeout, cleanup).await.is_err() {
        tracing::warn!(timeout = ?shutdown_timeout, "Cleanup timed out, forcing shutdown");
    } else {
        info!("Cleanup completed");
    }

    serve_result
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, extract::ConnectInfo, http::Request, http::StatusCode, routing::get};
    use tower::ServiceExt;

    #[derive(OpenApi)]
    #[openapi(info(title = "test"))]
    struct TestDoc;

    const ORIGINS: &str = "http://localhost:3000,https://app.example.com";

    fn get_from_peer(uri: &str) -> Request<Body> {
        let mut request = Request::get(uri).body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 50000))));
        request
    }

    fn ping_router(limit: Option<&str>) -> Router {
        temp_env::with_vars(
            [
                ("CORS_ALLOWED_ORIGIN", Some(ORIGINS)),
                ("RATE_LIMIT_MAX_REQUESTS", limit),
                ("RATE_LIMIT_WINDOW_SECS", None),
            ],
            || create_router::<TestDoc>(Router::new().route("/ping", get(|| async { "pong" }))),
        )
        .unwrap()
    }

    #[test]
    fn test_cors_origin_required() {
        temp_env::with_var_unset("CORS_ALLOWED_ORIGIN", || {
            assert!(create_router::<TestDoc>(Router::new()).is_err());
        });
        temp_env::with_var("CORS_ALLOWED_ORIGIN", Some(" , "), || {
            assert!(create_router::<TestDoc>(Router::new()).is_err());
        });
    }

    #[test]
    fn test_bad_rate_limit_rejected() {
        temp_env::with_vars(
            [
                ("CORS_ALLOWED_ORIGIN", Some(ORIGINS)),
                ("RATE_LIMIT_MAX_REQUESTS", Some("0")),
            ],
            || {
                assert!(create_router::<TestDoc>(Router::new()).is_err());
            },
        );
    }

    #[tokio::test]
    async fn test_routes_nested_under_api() {
        let router = ping_router(None);

        let ok = router
            .clone()
            .oneshot(get_from_peer("/api/ping"))
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);

        let missing = router.oneshot(get_from_peer("/ping")).await.unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_api_is_rate_limited() {
        let router = ping_router(Some("3"));

        for _ in 0..3 {
            let response = router
                .clone()
                .oneshot(get_from_peer("/api/ping"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let limited = router.oneshot(get_from_peer("/api/ping")).await.unwrap();
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
