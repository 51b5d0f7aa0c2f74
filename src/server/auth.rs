//! Bearer token authentication for Snap Vault.
//!
//! Callers identify themselves with an HMAC-SHA256 signed token:
//!
//! ```text
//! Authorization: Bearer {user_id}.{expiry}.{signature}
//! signature = hex(HMAC-SHA256(secret_key, "{user_id}.{expiry}"))
//! ```
//!
//! A request without an `Authorization` header is anonymous. Anonymous callers
//! can use the public routes; the owner routes answer 401. A header that is
//! present but malformed, expired or badly signed is rejected with 401 on
//! every route.
//!
//! Token issuance is out of scope for the service; [`TokenAuth::sign`] exists
//! for operators and tests.
//!
//! # Example
//!
//! ```rust
//! use snap_vault::server::auth::TokenAuth;
//! use std::time::Duration;
//!
//! let auth = TokenAuth::new("my-secret-key");
//! let token = auth.sign(42, Duration::from_secs(3600));
//!
//! let caller = auth.verify(&token).unwrap();
//! assert_eq!(caller.user_id(), 42);
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::store::AuthData;

use super::context::context_from_extensions;
use super::response::{send_json_error, ErrorResponse};

// =============================================================================
// Types
// =============================================================================

/// HMAC-SHA256 type alias
type HmacSha256 = Hmac<Sha256>;

/// Authentication error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The header is not `Bearer <token>`
    InvalidScheme,

    /// Token does not have three dot-separated parts
    MalformedToken,

    /// Token has expired
    Expired {
        /// When the token expired
        expired_at: u64,
        /// Current time
        current_time: u64,
    },

    /// Signature does not match
    InvalidSignature,

    /// Signature is not valid hex
    InvalidSignatureFormat,

    /// Route requires a caller but none was identified
    AuthenticationRequired,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::InvalidScheme => write!(f, "invalid authentication scheme"),
            AuthError::MalformedToken => write!(f, "invalid or missing authentication token"),
            AuthError::Expired {
                expired_at,
                current_time,
            } => write!(
                f,
                "authentication token expired at {} (current time: {})",
                expired_at, current_time
            ),
            AuthError::InvalidSignature => write!(f, "invalid authentication token"),
            AuthError::InvalidSignatureFormat => write!(f, "invalid authentication token format"),
            AuthError::AuthenticationRequired => {
                write!(f, "you must be authenticated to access this resource")
            }
        }
    }
}

impl std::error::Error for AuthError {}

impl From<AuthError> for ErrorResponse {
    fn from(err: AuthError) -> Self {
        // Bad signatures may be probing; the rest are routine.
        match &err {
            AuthError::InvalidSignature => warn!("Authentication failed: {}", err),
            _ => debug!("Authentication failed: {}", err),
        }

        let message = match &err {
            AuthError::AuthenticationRequired => err.to_string(),
            _ => "invalid or missing authentication token".to_string(),
        };
        ErrorResponse::unauthorized(message).with_err(err)
    }
}

// =============================================================================
// Token Authentication
// =============================================================================

/// Bearer token authenticator using HMAC-SHA256.
#[derive(Clone)]
pub struct TokenAuth {
    /// Secret key for HMAC computation
    secret_key: Vec<u8>,
}

impl TokenAuth {
    /// Create a new authenticator with the given secret key.
    ///
    /// The key should be at least 32 bytes.
    pub fn new(secret_key: impl AsRef<[u8]>) -> Self {
        Self {
            secret_key: secret_key.as_ref().to_vec(),
        }
    }

    /// Issue a token for `user_id` valid for `ttl`.
    pub fn sign(&self, user_id: i64, ttl: Duration) -> String {
        self.sign_with_expiry(user_id, now_secs().saturating_add(ttl.as_secs()))
    }

    /// Issue a token for `user_id` expiring at a Unix timestamp.
    pub fn sign_with_expiry(&self, user_id: i64, expiry: u64) -> String {
        format!(
            "{}.{}.{}",
            user_id,
            expiry,
            self.compute_signature(user_id, expiry)
        )
    }

    /// Verify a token and return the caller it identifies.
    pub fn verify(&self, token: &str) -> Result<AuthData, AuthError> {
        let mut parts = token.splitn(3, '.');
        let (Some(user_id), Some(expiry), Some(signature)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::MalformedToken);
        };
        let user_id: i64 = user_id.parse().map_err(|_| AuthError::MalformedToken)?;
        let expiry: u64 = expiry.parse().map_err(|_| AuthError::MalformedToken)?;

        // Check expiry first
        let current_time = now_secs();
        if current_time > expiry {
            return Err(AuthError::Expired {
                expired_at: expiry,
                current_time,
            });
        }

        let provided_sig = hex::decode(signature).map_err(|_| AuthError::InvalidSignatureFormat)?;
        let expected_sig = self.mac(user_id, expiry);

        // Constant-time comparison
        if provided_sig.ct_eq(&expected_sig).into() {
            Ok(AuthData::new(user_id))
        } else {
            Err(AuthError::InvalidSignature)
        }
    }

    /// Verify an `Authorization` header value.
    pub fn verify_header(&self, value: &str) -> Result<AuthData, AuthError> {
        let token = value
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidScheme)?
            .trim();
        self.verify(token)
    }

    fn mac(&self, user_id: i64, expiry: u64) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret_key).expect("HMAC can take key of any size");
        mac.update(format!("{}.{}", user_id, expiry).as_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    fn compute_signature(&self, user_id: i64, expiry: u64) -> String {
        hex::encode(self.mac(user_id, expiry))
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// =============================================================================
// Axum Middleware
// =============================================================================

/// Identify the caller from the `Authorization` header.
///
/// On success the [`AuthData`] is stored in the request extensions. Requests
/// without the header pass through anonymously.
pub async fn authenticate(
    State(auth): State<TokenAuth>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(value) = request.headers().get(header::AUTHORIZATION) else {
        return next.run(request).await;
    };

    let verified = value
        .to_str()
        .map_err(|_| AuthError::MalformedToken)
        .and_then(|value| auth.verify_header(value));

    match verified {
        Ok(caller) => {
            request.extensions_mut().insert(caller);
            next.run(request).await
        }
        Err(err) => {
            let ctx = context_from_extensions(request.extensions());
            send_json_error(&ctx, err.into())
        }
    }
}

/// Reject anonymous callers on owner-only routes.
pub async fn require_auth(request: Request, next: Next) -> Response {
    if request.extensions().get::<AuthData>().is_some() {
        return next.run(request).await;
    }
    let ctx = context_from_extensions(request.extensions());
    send_json_error(&ctx, AuthError::AuthenticationRequired.into())
}

// =============================================================================
// Tests
// =============================================================================
