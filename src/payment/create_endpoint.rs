//! Endpoints for recording payments and listing them.

use axum::{Extension, Json, extract::State};
use time::OffsetDateTime;

use crate::{
    Error,
    db::{DatabaseState, with_connection},
    form::FormData,
    payment::{NewPayment, Payment, PaymentForm, create_payment, get_payments},
    storage::{FileUploadState, upload_file},
    user::User,
};

/// The form field an optional receipt is sent in.
const RECEIPT_FIELD: &str = "comprovante";

/// Record a payment for the current user, uploading the receipt if one was attached.
///
/// # Errors
///
/// Fails with [Error::FileHostUnavailable] or [Error::UploadFailed] if a
/// receipt was attached but could not be stored. Nothing is saved in that case.
pub async fn create_payment_endpoint(
    State(state): State<FileUploadState>,
    Extension(user): Extension<User>,
    mut form: FormData<PaymentForm>,
) -> Result<Json<Payment>, Error> {
    let receipt_url = match form.take_file(RECEIPT_FIELD) {
        Some(receipt) => Some(upload_file(state.file_host.as_deref(), receipt).await?),
        None => None,
    };

    let PaymentForm {
        title,
        amount,
        category,
    } = form.fields;
    let new_payment = NewPayment {
        title,
        amount,
        category,
        paid_at: OffsetDateTime::now_utc(),
        receipt_url,
    };

    with_connection(&state.db_connection, |connection| {
        create_payment(new_payment, user.id, connection)
    })
    .map(Json)
}

/// List the current user's payments.
pub async fn list_payments_endpoint(
    State(state): State<DatabaseState>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<Payment>>, Error> {
    with_connection(&state.db_connection, |connection| {
        get_payments(user.id, connection)
    })
    .map(Json)
}
