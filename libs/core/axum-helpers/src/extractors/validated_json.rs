//! JSON extractor that runs `validator` checks before the handler.

use crate::errors::AppError;
use axum::extract::{FromRequest, Json, Request};
use serde::de::DeserializeOwned;
use validator::Validate;

/// `Json<T>` followed by `T::validate()`.
///
/// Malformed bodies reject with [`AppError::JsonExtractorRejection`] and failed
/// checks with [`AppError::ValidationError`], both rendered as 400 JSON errors.
///
/// ```ignore
/// async fn register(ValidatedJson(payload): ValidatedJson<RegisterRequest>) -> impl IntoResponse {
///     // payload passed its #[validate] rules
/// }
/// ```
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(data) = Json::<T>::from_request(req, state).await?;
        data.validate()?;
        Ok(ValidatedJson(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Router,
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        routing::post,
    };
    use http_body_util::BodyExt;
    use serde::Deserialize;
    use tower::ServiceExt;

    #[derive(Deserialize, Validate)]
    struct Signup {
        #[validate(email(message = "Invalid email"))]
        email: String,
        #[validate(length(min = 3, message = "Too short"))]
        username: String,
    }

    async fn signup(ValidatedJson(payload): ValidatedJson<Signup>) -> String {
        payload.username
    }

    fn app() -> Router {
        Router::new().route("/signup", post(signup))
    }

    fn json_request(body: &str) -> HttpRequest<Body> {
        HttpRequest::builder()
            .method("POST")
            .uri("/signup")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_valid_payload_reaches_handler() {
        let response = app()
            .oneshot(json_request(r#"{"email":"a@example.com","username":"alice"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_invalid_payload_lists_fields() {
        let response = app()
            .oneshot(json_request(r#"{"email":"nope","username":"al"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "VALIDATION_ERROR");
        assert_eq!(body["details"][0]["field"], "email");
        assert_eq!(body["details"][0]["message"], "Invalid email");
        assert_eq!(body["details"][1]["field"], "username");
    }

    #[tokio::test]
    async fn test_malformed_json_is_rejected() {
        let response = app().oneshot(json_request("{not json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
