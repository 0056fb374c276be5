//! Application router configuration with protected and unprotected route definitions.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{
        HeaderValue, Method,
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    },
    middleware,
    routing::{MethodRouter, delete, get, post, put},
};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::{
    AppState,
    auth::{auth_guard, google_callback, login_google, post_log_in, register_user},
    category::{create_category_endpoint, delete_category_endpoint, list_categories_endpoint},
    document::{create_document_endpoint, delete_document_endpoint, list_documents_endpoint},
    endpoints,
    payment::{
        create_payment_endpoint, delete_payment_endpoint, edit_payment_endpoint,
        list_payments_endpoint,
    },
    profile::{get_current_user, update_avatar, update_current_user},
    receivable::{
        create_receivable_endpoint, delete_receivable_endpoint, list_receivables_endpoint,
    },
    summary::analyze_finances,
    supplier::{create_supplier_endpoint, delete_supplier_endpoint, list_suppliers_endpoint},
    system::reset_database,
};

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    let unprotected_routes = Router::new()
        .route(endpoints::TOKEN, post(post_log_in))
        .route(endpoints::REGISTER, post(register_user))
        .route(endpoints::GOOGLE_LOGIN, get(login_google))
        .route(endpoints::GOOGLE_CALLBACK, get(google_callback))
        .route(endpoints::RESET_DATABASE, get(reset_database));

    let protected_routes = Router::new()
        .route(
            endpoints::CURRENT_USER,
            get(get_current_user).put(update_current_user),
        )
        .route(endpoints::CURRENT_USER_AVATAR, put(update_avatar))
        .route(endpoints::CATEGORY, delete(delete_category_endpoint))
        .route(
            endpoints::PAYMENT,
            put(edit_payment_endpoint).delete(delete_payment_endpoint),
        )
        .route(endpoints::RECEIVABLE, delete(delete_receivable_endpoint))
        .route(endpoints::SUPPLIER, delete(delete_supplier_endpoint))
        .route(endpoints::DOCUMENT, delete(delete_document_endpoint))
        .route(endpoints::ANALYZE_FINANCES, post(analyze_finances));

    let protected_routes = [
        (
            endpoints::CATEGORIES,
            get(list_categories_endpoint).post(create_category_endpoint),
        ),
        (
            endpoints::PAYMENTS,
            get(list_payments_endpoint).post(create_payment_endpoint),
        ),
        (
            endpoints::RECEIVABLES,
            get(list_receivables_endpoint).post(create_receivable_endpoint),
        ),
        (
            endpoints::SUPPLIERS,
            get(list_suppliers_endpoint).post(create_supplier_endpoint),
        ),
        (
            endpoints::DOCUMENTS,
            get(list_documents_endpoint).post(create_document_endpoint),
        ),
    ]
    .into_iter()
    .fold(protected_routes, |router, (path, method_router)| {
        collection_route(router, path, method_router)
    })
    .layer(middleware::from_fn_with_state(state.clone(), auth_guard));

    let body_limit = state.body_limit;

    protected_routes
        .merge(unprotected_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Serve `method_router` at `path` both with and without a trailing slash.
fn collection_route(
    router: Router<AppState>,
    path: &str,
    method_router: MethodRouter<AppState>,
) -> Router<AppState> {
    router
        .route(path, method_router.clone())
        .route(&format!("{path}/"), method_router)
}

/// A CORS layer that lets browsers on `allowed_origins` call the API with credentials.
///
/// Origins that are not valid header values are skipped with a warning.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| {
            HeaderValue::from_str(origin)
                .inspect_err(|error| tracing::warn!("ignoring CORS origin {origin:?}: {error}"))
                .ok()
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT])
}

#[cfg(test)]
mod protected_route_tests {
    use axum::http::StatusCode;
    use serde_json::Value;

    use crate::{
        endpoints::{self, resource_endpoint},
        test_utils::{authorized_user, get_test_app_state, get_test_server},
    };

    #[tokio::test]
    async fn protected_routes_require_token() {
        let server = get_test_server(get_test_app_state());

        for path in [
            endpoints::CURRENT_USER.to_owned(),
            endpoints::CATEGORIES.to_owned(),
            format!("{}/", endpoints::PAYMENTS),
            endpoints::RECEIVABLES.to_owned(),
            endpoints::SUPPLIERS.to_owned(),
            endpoints::DOCUMENTS.to_owned(),
        ] {
            server
                .get(&path)
                .await
                .assert_status(StatusCode::UNAUTHORIZED);
        }

        server
            .delete(&resource_endpoint(endpoints::PAYMENT, 1))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
        server
            .post(endpoints::ANALYZE_FINANCES)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn non_numeric_id_is_bad_request() {
        let state = get_test_app_state();
        let (_, token) = authorized_user(&state, "foo@bar.baz");
        let server = get_test_server(state);

        for collection in [
            endpoints::PAYMENTS,
            endpoints::CATEGORIES,
            endpoints::RECEIVABLES,
            endpoints::SUPPLIERS,
            endpoints::DOCUMENTS,
        ] {
            let response = server
                .delete(&format!("{collection}/abc"))
                .authorization_bearer(&token)
                .await;

            response.assert_status(StatusCode::BAD_REQUEST);
            let body = response.json::<Value>();
            assert!(body["detail"].is_string(), "{collection}: got {body}");
        }
    }
}
