//! Wrappers around axum's JSON and path extractors that reject requests with
//! [Error] so that every client error has the same `{"detail": ...}` body.

use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Path, Request},
    http::request::Parts,
};
use serde::de::DeserializeOwned;

use crate::Error;

/// A JSON request body deserialized as `T`.
///
/// Malformed JSON is a 400 response, well-formed JSON of the wrong shape is a 422 response.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(request, state).await?;

        Ok(Self(value))
    }
}

/// A path parameter deserialized as `T`, e.g. the ID in `/pagamentos/{payment_id}`.
#[derive(Debug)]
pub struct PathParam<T>(pub T);

impl<S, T> FromRequestParts<S> for PathParam<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;

        Ok(Self(value))
    }
}

#[cfg(test)]
mod extractor_tests {
    use axum::{Router, http::StatusCode, routing::post};
    use axum_test::TestServer;
    use serde::Deserialize;
    use serde_json::{Value, json};

    use crate::extract::{JsonBody, PathParam};

    #[derive(Deserialize)]
    struct Greeting {
        name: String,
    }

    fn test_server() -> TestServer {
        let app = Router::new().route(
            "/greet/{id}",
            post(
                |PathParam(id): PathParam<i64>, JsonBody(greeting): JsonBody<Greeting>| async move {
                    format!("{id} {}", greeting.name)
                },
            ),
        );

        TestServer::try_new(app).expect("Could not create test server.")
    }

    #[tokio::test]
    async fn valid_request_is_extracted() {
        let response = test_server()
            .post("/greet/7")
            .json(&json!({"name": "Ana"}))
            .await;

        response.assert_status_ok();
        response.assert_text("7 Ana");
    }

    #[tokio::test]
    async fn non_numeric_id_is_bad_request_with_detail() {
        let response = test_server()
            .post("/greet/seven")
            .json(&json!({"name": "Ana"}))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(response.json::<Value>()["detail"].is_string());
    }

    #[tokio::test]
    async fn malformed_json_is_bad_request_with_detail() {
        let response = test_server()
            .post("/greet/7")
            .content_type("application/json")
            .text("{\"name\": ")
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(response.json::<Value>()["detail"].is_string());
    }

    #[tokio::test]
    async fn wrong_json_type_is_unprocessable_with_detail() {
        let response = test_server()
            .post("/greet/7")
            .json(&json!({"name": 42}))
            .await;

        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        assert!(response.json::<Value>()["detail"].is_string());
    }
}
