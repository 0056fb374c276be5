//! Password and delegated logins, bearer token issuance and the middleware
//! that authenticates API requests.

mod google;
mod log_in;
mod middleware;
mod password;
mod register_user;
mod token;

pub use google::{
    AuthorizationRequest, GoogleOAuth, IdentityProvider, ProviderProfile, google_callback,
    login_google,
};
pub use log_in::{LogInData, TokenResponse, post_log_in};
pub use middleware::{AuthState, auth_guard};
pub use password::{MIN_PASSWORD_LENGTH, PasswordHash, ValidatedPassword};
pub use register_user::register_user;
pub use token::{Claims, DEFAULT_TOKEN_DURATION, JwtKeys, decode_jwt, encode_jwt};
