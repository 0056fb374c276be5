//! Payments, the user's expenses.
//!
//! This module contains:
//! - The `Payment` model and the database functions for storing and querying payments
//! - Handlers to create, list, edit and delete the current user's payments

mod core;
mod create_endpoint;
mod delete_endpoint;
mod edit_endpoint;

pub use core::{
    NewPayment, Payment, PaymentForm, PaymentId, create_payment, create_payment_table,
    delete_payment, get_payment, get_payments, get_recent_payments, update_payment,
};
pub use create_endpoint::{create_payment_endpoint, list_payments_endpoint};
pub use delete_endpoint::delete_payment_endpoint;
pub use edit_endpoint::edit_payment_endpoint;
