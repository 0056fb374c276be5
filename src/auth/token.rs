//! Issues and verifies the signed bearer tokens used to authenticate API requests.

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::Error;

/// How long a freshly issued token stays valid.
pub const DEFAULT_TOKEN_DURATION: Duration = Duration::days(30);

/// The contents of a JSON Web Token.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// Email of the user the token was issued to.
    pub sub: String,
    /// The expiry time of the token as a unix timestamp.
    pub exp: i64,
    /// The time the token was issued as a unix timestamp.
    pub iat: i64,
}

/// The keys used to sign and verify tokens, derived from a single secret.
#[derive(Clone)]
pub struct JwtKeys {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtKeys {
    /// Create HS256 keys from `secret`.
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Sign a token for `email` that expires `duration` from now.
///
/// # Errors
///
/// Returns [Error::TokenCreation] if the token could not be signed.
pub fn encode_jwt(email: &str, duration: Duration, keys: &JwtKeys) -> Result<String, Error> {
    let now = OffsetDateTime::now_utc();
    let claims = Claims {
        sub: email.to_owned(),
        exp: (now + duration).unix_timestamp(),
        iat: now.unix_timestamp(),
    };

    encode(&Header::default(), &claims, &keys.encoding_key)
        .map_err(|error| Error::TokenCreation(error.to_string()))
}

/// Verify the signature and expiry of `token` and return its claims.
///
/// # Errors
///
/// Returns [Error::InvalidToken] if the token is malformed, tampered with or expired.
pub fn decode_jwt(token: &str, keys: &JwtKeys) -> Result<Claims, Error> {
    decode::<Claims>(token, &keys.decoding_key, &Validation::default())
        .map(|token_data| token_data.claims)
        .map_err(|error| {
            tracing::debug!("rejected bearer token: {error}");
            Error::InvalidToken
        })
}
