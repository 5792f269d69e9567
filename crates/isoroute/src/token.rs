// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Compact signed tokens (HS256 JWT).
//!
//! A token carries a JSON object payload plus `iat` and `exp` claims.
//! Verification fails on a bad signature, a malformed token or an expired
//! `exp`.
//!
//! ```rust
//! use isoroute::token::TokenCodec;
//!
//! let codec = TokenCodec::new("secret");
//! let token = codec.sign(&serde_json::json!({ "sub": "42", "role": "admin" })).unwrap();
//! let claims: serde_json::Value = codec.verify(&token).unwrap();
//! assert_eq!(claims["role"], "admin");
//! ```

use jsonwebtoken::{
    decode, encode, get_current_timestamp, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default token lifetime: two hours.
pub const DEFAULT_TTL: Duration = Duration::from_secs(2 * 60 * 60);

/// Anything able to turn a token string into its decoded claims.
///
/// The auth middleware depends on this trait rather than on [`TokenCodec`]
/// directly so that verification can be observed or replaced.
pub trait TokenVerifier: Send + Sync + 'static {
    /// Verifies `token` and returns its claims as a JSON object.
    fn verify_claims(&self, token: &str) -> Result<JsonValue>;
}

/// Signs and verifies HS256 tokens with a shared secret.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenCodec {
    /// Creates a codec for the given secret.
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let secret = secret.as_ref();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Sets the clock skew tolerated when checking `exp`, in seconds.
    pub fn with_leeway(mut self, seconds: u64) -> Self {
        self.validation.leeway = seconds;
        self
    }

    /// Signs `payload` with the default two hour lifetime.
    pub fn sign<T: Serialize>(&self, payload: &T) -> Result<String> {
        self.sign_for(payload, DEFAULT_TTL)
    }

    /// Signs `payload`, expiring `ttl` from now.
    pub fn sign_for<T: Serialize>(&self, payload: &T, ttl: Duration) -> Result<String> {
        self.sign_until(payload, get_current_timestamp() + ttl.as_secs())
    }

    /// Signs `payload` with an absolute `exp` (seconds since the epoch).
    pub fn sign_until<T: Serialize>(&self, payload: &T, exp: u64) -> Result<String> {
        let JsonValue::Object(mut claims) = serde_json::to_value(payload)? else {
            return Err(Error::Json(<serde_json::Error as serde::ser::Error>::custom(
                "token payload must be a JSON object",
            )));
        };
        claims.insert("iat".to_string(), get_current_timestamp().into());
        claims.insert("exp".to_string(), exp.into());

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Verifies `token` and deserializes its claims (payload, `iat`, `exp`).
    pub fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<T> {
        let data = decode::<JsonValue>(token, &self.decoding, &self.validation)?;
        Ok(serde_json::from_value(data.claims)?)
    }
}

impl TokenVerifier for TokenCodec {
    fn verify_claims(&self, token: &str) -> Result<JsonValue> {
        self.verify(token)
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("leeway", &self.validation.leeway)
            .finish_non_exhaustive()
    }
}
