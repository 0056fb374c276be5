//! The API endpoints URIs.
//!
//! Endpoints that act on a single resource take its id as a path parameter,
//! e.g. '/pagamentos/{payment_id}'.
//! Collection routes are also served with a trailing slash, see [crate::build_router].

/// The route for exchanging an email and password for a bearer token.
pub const TOKEN: &str = "/token";
/// The route for registering a new user.
pub const REGISTER: &str = "/auth/register";
/// The route that starts a Google login.
pub const GOOGLE_LOGIN: &str = "/auth/login/google";
/// The route Google redirects back to after a login.
pub const GOOGLE_CALLBACK: &str = "/auth/google/callback";

/// The route for reading and updating the current user's profile.
pub const CURRENT_USER: &str = "/users/me";
/// The route for replacing the current user's profile picture.
pub const CURRENT_USER_AVATAR: &str = "/users/me/avatar";

/// The route to create and list categories.
pub const CATEGORIES: &str = "/categories";
/// The route to delete a category.
pub const CATEGORY: &str = "/categories/{category_id}";
/// The route to create and list payments.
pub const PAYMENTS: &str = "/pagamentos";
/// The route to edit or delete a payment.
pub const PAYMENT: &str = "/pagamentos/{payment_id}";
/// The route to create and list receivables.
pub const RECEIVABLES: &str = "/recebimentos";
/// The route to delete a receivable.
pub const RECEIVABLE: &str = "/recebimentos/{receivable_id}";
/// The route to create and list suppliers.
pub const SUPPLIERS: &str = "/fornecedores";
/// The route to delete a supplier.
pub const SUPPLIER: &str = "/fornecedores/{supplier_id}";
/// The route to upload and list documents.
pub const DOCUMENTS: &str = "/documentos";
/// The route to delete a document.
pub const DOCUMENT: &str = "/documentos/{document_id}";

/// The route for the generated summary of the user's spending.
pub const ANALYZE_FINANCES: &str = "/system/analyze-finances";
/// The route that empties the database.
pub const RESET_DATABASE: &str = "/system/reset-db-force";

/// `endpoint` with its `{...}` parameter replaced by `id`.
///
/// Endpoints without a parameter are returned unchanged.
#[cfg(test)]
pub fn resource_endpoint(endpoint: &str, id: i64) -> String {
    match endpoint.split_once('{') {
        Some((prefix, rest)) => {
            let suffix = rest.split_once('}').map_or("", |(_, suffix)| suffix);
            format!("{prefix}{id}{suffix}")
        }
        None => endpoint.to_owned(),
    }
}

// These tests are here so that we know when we call `Uri::from_shared` it will not panic.
#[cfg(test)]
mod endpoints_tests {
    use axum::http::Uri;

    use crate::endpoints;

    use super::resource_endpoint;

    fn assert_endpoint_is_valid_uri(uri: &str) {
        assert!(uri.parse::<Uri>().is_ok());
    }

    #[test]
    fn endpoints_are_valid_uris() {
        assert_endpoint_is_valid_uri(endpoints::TOKEN);
        assert_endpoint_is_valid_uri(endpoints::REGISTER);
        assert_endpoint_is_valid_uri(endpoints::GOOGLE_LOGIN);
        assert_endpoint_is_valid_uri(endpoints::GOOGLE_CALLBACK);
        assert_endpoint_is_valid_uri(endpoints::CURRENT_USER);
        assert_endpoint_is_valid_uri(endpoints::CURRENT_USER_AVATAR);
        assert_endpoint_is_valid_uri(endpoints::CATEGORIES);
        assert_endpoint_is_valid_uri(endpoints::CATEGORY);
        assert_endpoint_is_valid_uri(endpoints::PAYMENTS);
        assert_endpoint_is_valid_uri(endpoints::PAYMENT);
        assert_endpoint_is_valid_uri(endpoints::RECEIVABLES);
        assert_endpoint_is_valid_uri(endpoints::RECEIVABLE);
        assert_endpoint_is_valid_uri(endpoints::SUPPLIERS);
        assert_endpoint_is_valid_uri(endpoints::SUPPLIER);
        assert_endpoint_is_valid_uri(endpoints::DOCUMENTS);
        assert_endpoint_is_valid_uri(endpoints::DOCUMENT);
        assert_endpoint_is_valid_uri(endpoints::ANALYZE_FINANCES);
        assert_endpoint_is_valid_uri(endpoints::RESET_DATABASE);
    }

    #[test]
    fn formatted_resource_endpoints_are_valid_uris() {
        assert_eq!(resource_endpoint(endpoints::PAYMENT, 7), "/pagamentos/7");
        assert_endpoint_is_valid_uri(&resource_endpoint(endpoints::CATEGORY, 1));
        assert_endpoint_is_valid_uri(&resource_endpoint(endpoints::RECEIVABLE, 2));
        assert_endpoint_is_valid_uri(&resource_endpoint(endpoints::SUPPLIER, 3));
        assert_endpoint_is_valid_uri(&resource_endpoint(endpoints::DOCUMENT, 4));
    }

    #[test]
    fn replaces_parameter_in_middle_of_path() {
        assert_eq!(resource_endpoint("/users/{user_id}/avatar", 12), "/users/12/avatar");
    }

    #[test]
    fn path_without_parameter_is_unchanged() {
        assert_eq!(resource_endpoint(endpoints::PAYMENTS, 1), endpoints::PAYMENTS);
    }
}
