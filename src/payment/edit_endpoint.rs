use axum::{Extension, Json, extract::State};

use crate::{
    Error,
    db::{DatabaseState, with_connection},
    extract::PathParam,
    form::FormData,
    payment::{Payment, PaymentForm, PaymentId, get_payment, update_payment},
    user::User,
};

/// Replace the title, amount and category of one of the current user's payments.
///
/// The payment date and receipt are left as they are.
///
/// # Errors
///
/// Returns [Error::NotFound] if the payment does not exist or belongs to
/// someone else.
pub async fn edit_payment_endpoint(
    State(state): State<DatabaseState>,
    Extension(user): Extension<User>,
    PathParam(payment_id): PathParam<PaymentId>,
    FormData { fields, .. }: FormData<PaymentForm>,
) -> Result<Json<Payment>, Error> {
    with_connection(&state.db_connection, |connection| {
        update_payment(payment_id, user.id, &fields, connection)?;
        get_payment(payment_id, user.id, connection)
    })
    .map(Json)
}
