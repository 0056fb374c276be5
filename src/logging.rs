//! Middleware for logging requests and responses.

use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{
        HeaderMap, HeaderValue,
        header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE},
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body_util::LengthLimitError;
use serde_json::Value;

use crate::Error;

/// Bodies longer than this many characters are truncated in `info` logs.
pub const LOG_BODY_LENGTH_LIMIT: usize = 64;

const REDACTED: &str = "********";
/// Form and JSON fields whose values never appear in the logs.
const SECRET_FIELDS: [&str; 2] = ["password", "access_token"];

/// Log the request and response for each request.
///
/// Both the request and response are logged at the `info` level.
/// If a body is longer than [LOG_BODY_LENGTH_LIMIT] characters, it is
/// truncated and the full body is logged at the `debug` level.
/// Passwords, tokens and credentials are redacted, and multipart bodies are
/// only logged by size.
///
/// Request bodies over `body_limit` bytes are rejected with a 413 response
/// before they reach a handler.
pub async fn logging_middleware(
    State(body_limit): State<usize>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let body_bytes = match axum::body::to_bytes(body, body_limit).await {
        Ok(bytes) => bytes,
        Err(error) => return request_body_error(error).into_response(),
    };

    let display_text = body_for_display(&parts.headers, &body_bytes);
    log_request(&parts, &display_text);

    let request = Request::from_parts(parts, body_bytes.into());
    let response = next.run(request).await;

    let (parts, body) = response.into_parts();
    let body_bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::error!("could not read response body: {error}");
            return Response::from_parts(parts, axum::body::Body::empty());
        }
    };

    let display_text = body_for_display(&parts.headers, &body_bytes);
    log_response(&parts, &display_text);

    Response::from_parts(parts, body_bytes.into())
}

fn request_body_error(error: axum::Error) -> Error {
    let error = error.into_inner();

    if error.downcast_ref::<LengthLimitError>().is_some() {
        Error::PayloadTooLarge
    } else {
        Error::BadRequest(format!("could not read request body: {error}"))
    }
}

fn body_for_display(headers: &HeaderMap, body: &Bytes) -> String {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if content_type.starts_with("multipart/form-data") {
        return format!("<multipart form, {} bytes>", body.len());
    }

    let body_text = String::from_utf8_lossy(body);

    if content_type.starts_with("application/x-www-form-urlencoded") {
        SECRET_FIELDS
            .iter()
            .fold(body_text.to_string(), |text, field_name| {
                redact_form_field(&text, field_name)
            })
    } else if content_type.starts_with("application/json") {
        redact_json(&body_text)
    } else {
        body_text.to_string()
    }
}

fn redact_form_field(form_text: &str, field_name: &str) -> String {
    form_text
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((name, _)) if name == field_name => format!("{name}={REDACTED}"),
            _ => pair.to_owned(),
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn redact_json(json_text: &str) -> String {
    let Ok(mut value) = serde_json::from_str::<Value>(json_text) else {
        return json_text.to_owned();
    };

    if let Value::Object(map) = &mut value {
        for field_name in SECRET_FIELDS {
            if let Some(secret) = map.get_mut(field_name) {
                *secret = Value::String(REDACTED.to_owned());
            }
        }
    }

    value.to_string()
}

/// A copy of `headers` with credentials masked.
fn redact_headers(headers: &HeaderMap) -> HeaderMap {
    let mut headers = headers.clone();

    for name in [AUTHORIZATION, COOKIE, SET_COOKIE] {
        if headers.contains_key(&name) {
            headers.insert(name, HeaderValue::from_static(REDACTED));
        }
    }

    // Google logins hand the token to the frontend in the redirect URL.
    let location_has_token = headers
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|location| location.contains("token="));
    if location_has_token {
        headers.insert(LOCATION, HeaderValue::from_static(REDACTED));
    }

    headers
}

fn truncate(body: &str) -> Option<&str> {
    body.char_indices()
        .nth(LOG_BODY_LENGTH_LIMIT)
        .map(|(end, _)| &body[..end])
}

fn log_request(parts: &axum::http::request::Parts, body: &str) {
    let headers = redact_headers(&parts.headers);
    let (method, uri) = (&parts.method, &parts.uri);

    match truncate(body) {
        Some(truncated) => {
            tracing::info!("Received request: {method} {uri} {headers:#?}\nbody: {truncated}...");
            tracing::debug!("Full request body: {body:?}");
        }
        None => tracing::info!("Received request: {method} {uri} {headers:#?}\nbody: {body:?}"),
    }
}

fn log_response(parts: &axum::http::response::Parts, body: &str) {
    let headers = redact_headers(&parts.headers);
    let status = parts.status;

    match truncate(body) {
        Some(truncated) => {
            tracing::info!("Sending response: {status} {headers:#?}\nbody: {truncated}...");
            tracing::debug!("Full response body: {body:?}");
        }
        None => tracing::info!("Sending response: {status} {headers:#?}\nbody: {body:?}"),
    }
}


#[cfg(test)]
mod body_limit_tests {
    use axum::{Router, http::StatusCode, middleware, routing::post};
    use axum_test::TestServer;
    use serde_json::Value;

    use crate::logging::logging_middleware;

    fn echo_server(body_limit: usize) -> TestServer {
        let app = Router::new()
            .route("/echo", post(|body: String| async move { body }))
            .layer(middleware::from_fn_with_state(body_limit, logging_middleware));

        TestServer::try_new(app).expect("Could not create test server.")
    }

    #[tokio::test]
    async fn body_within_limit_reaches_handler() {
        let server = echo_server(16);

        let response = server.post("/echo").text("0123456789abcdef").await;

        response.assert_status_ok();
        response.assert_text("0123456789abcdef");
    }

    #[tokio::test]
    async fn body_over_limit_is_payload_too_large() {
        let server = echo_server(16);

        let response = server.post("/echo").text("0123456789abcdefg").await;

        response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
        let body = response.json::<Value>();
        assert!(body["detail"].is_string(), "got {body}");
    }
}
