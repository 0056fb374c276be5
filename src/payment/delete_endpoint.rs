use axum::{Extension, Json, extract::State};
use serde_json::{Value, json};

use crate::{
    Error,
    db::{DatabaseState, with_connection},
    extract::PathParam,
    payment::{PaymentId, delete_payment},
    user::User,
};

/// Delete one of the current user's payments.
///
/// Succeeds even if the payment does not exist or belongs to someone else,
/// in which case nothing is deleted.
pub async fn delete_payment_endpoint(
    State(state): State<DatabaseState>,
    Extension(user): Extension<User>,
    PathParam(payment_id): PathParam<PaymentId>,
) -> Result<Json<Value>, Error> {
    let deleted = with_connection(&state.db_connection, |connection| {
        delete_payment(payment_id, user.id, connection)
    })?;

    if !deleted {
        tracing::debug!("user {} has no payment {payment_id} to delete", user.id);
    }

    Ok(Json(json!({ "ok": true })))
}
