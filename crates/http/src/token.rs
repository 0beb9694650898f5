//! Offline inspection of JWT-shaped tokens
//!
//! Nothing here verifies signatures. The backend does that; the client only
//! needs the expiry claim to decide whether a refresh is due.

use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::{Engine, alphabet};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

/// JWT payloads are base64url; some issuers keep the padding, most drop it
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Reasons a token payload could not be read
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token is not made of three dot-separated segments")]
    Malformed,

    #[error("token payload is not valid base64url: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("token payload is not a valid claims object: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Claims read from a token payload
#[derive(Debug, Clone, Deserialize)]
pub struct TokenClaims {
    /// Expiry, seconds since the epoch
    pub exp: f64,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl TokenClaims {
    /// Expiry as a timestamp, if it fits in the calendar
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        if !self.exp.is_finite() {
            return None;
        }
        Utc.timestamp_millis_opt((self.exp * 1000.0) as i64).single()
    }
}

/// Decode the payload segment of a token without verifying it
///
/// # Errors
///
/// Returns an error if the token is not JWT-shaped or its payload lacks a numeric `exp`
pub fn decode_claims(token: &str) -> Result<TokenClaims, TokenError> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(TokenError::Malformed);
    };

    let bytes = PAYLOAD_ENGINE.decode(payload)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Whether the token's expiry has passed. Unreadable tokens count as expired.
pub fn is_expired(token: &str) -> bool {
    is_expired_at(token, Utc::now())
}

/// [`is_expired`] against an explicit clock reading
pub fn is_expired_at(token: &str, now: DateTime<Utc>) -> bool {
    match decode_claims(token) {
        Ok(claims) if claims.exp.is_finite() => now.timestamp_millis() as f64 >= claims.exp * 1000.0,
        Ok(_) => true,
        Err(e) => {
            tracing::debug!("Treating unreadable token as expired: {e}");
            true
        }
    }
}
