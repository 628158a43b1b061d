//! Authentication & identity
//!
//! Identity is an opaque subject string (plus an optional entity ID)
//! derived from a bearer credential. A development fallback accepts the
//! `X-Entity-ID` header when no bearer token is present; that path is
//! disabled in production. Services use the identity for attribution
//! (`createdBy`, `answeredBy`) only — there is no authorization layer.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use shared::error::{AppError, AppResult, ErrorCode};

use crate::state::AppState;

/// JWT claims carried by a bearer token
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (client/user identifier)
    pub sub: String,
    /// Optional entity the subject acts as
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    /// Expiration (Unix timestamp seconds)
    pub exp: usize,
    /// Issued at (Unix timestamp seconds)
    pub iat: usize,
}

/// Authenticated caller identity, attached to the request context
#[derive(Debug, Clone)]
pub struct Identity {
    pub subject: String,
    pub entity_id: Option<String>,
}

impl Identity {
    /// The identity used when no credential is supplied
    pub fn anonymous() -> Self {
        Self {
            subject: "anonymous".to_string(),
            entity_id: None,
        }
    }
}

const TOKEN_EXPIRY_HOURS: i64 = 24;

/// Bearer-token verifier with the development header fallback
#[derive(Clone)]
pub struct AuthVerifier {
    secret: String,
    /// Outside production the `X-Entity-ID` header may supply an entity
    dev_fallback: bool,
}

impl AuthVerifier {
    pub fn new(secret: impl Into<String>, dev_fallback: bool) -> Self {
        Self {
            secret: secret.into(),
            dev_fallback,
        }
    }

    /// Mint a token (client tooling and tests)
    pub fn create_token(
        &self,
        subject: &str,
        entity_id: Option<&str>,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = chrono::Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            entity_id: entity_id.map(str::to_string),
            exp: (now + chrono::Duration::hours(TOKEN_EXPIRY_HOURS)).timestamp() as usize,
            iat: now.timestamp() as usize,
        };
        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
    }

    /// Verify a bearer token into an identity
    pub fn verify(&self, token: &str) -> AppResult<Identity> {
        let data = jsonwebtoken::decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| {
            tracing::debug!("JWT validation failed: {e}");
            AppError::new(ErrorCode::TokenInvalid)
        })?;

        Ok(Identity {
            subject: data.claims.sub,
            entity_id: data.claims.entity_id,
        })
    }

    /// Resolve the caller identity from request headers.
    ///
    /// Priority: bearer token, then (dev only) `X-Entity-ID`, then
    /// anonymous. A present-but-invalid token always fails.
    pub fn identify(&self, headers: &http::HeaderMap) -> AppResult<Identity> {
        if let Some(auth_header) = headers.get("Authorization").and_then(|v| v.to_str().ok()) {
            let token = auth_header
                .strip_prefix("Bearer ")
                .ok_or_else(|| AppError::new(ErrorCode::TokenInvalid))?;
            return self.verify(token);
        }

        if self.dev_fallback {
            if let Some(entity_id) = headers.get("X-Entity-ID").and_then(|v| v.to_str().ok()) {
                return Ok(Identity {
                    subject: entity_id.to_string(),
                    entity_id: Some(entity_id.to_string()),
                });
            }
        }

        Ok(Identity::anonymous())
    }
}

/// Middleware: resolve the identity and attach it as a request extension
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = state.auth.identify(request.headers())?;
    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier(dev: bool) -> AuthVerifier {
        AuthVerifier::new("test-secret", dev)
    }

    #[test]
    fn token_roundtrip() {
        let auth = verifier(false);
        let token = auth.create_token("client-1", Some("ent-1")).unwrap();
        let identity = auth.verify(&token).unwrap();
        assert_eq!(identity.subject, "client-1");
        assert_eq!(identity.entity_id.as_deref(), Some("ent-1"));
    }

    #[test]
    fn wrong_secret_rejected() {
        let token = verifier(false).create_token("client-1", None).unwrap();
        let other = AuthVerifier::new("different-secret", false);
        let err = other.verify(&token).unwrap_err();
        assert_eq!(err.code, ErrorCode::TokenInvalid);
    }

    #[test]
    fn identify_bearer_wins_over_header() {
        let auth = verifier(true);
        let token = auth.create_token("client-1", None).unwrap();
        let mut headers = http::HeaderMap::new();
        headers.insert(
            "Authorization",
            format!("Bearer {token}").parse().unwrap(),
        );
        headers.insert("X-Entity-ID", "ent-9".parse().unwrap());

        let identity = auth.identify(&headers).unwrap();
        assert_eq!(identity.subject, "client-1");
        assert!(identity.entity_id.is_none());
    }

    #[test]
    fn dev_fallback_header() {
        let auth = verifier(true);
        let mut headers = http::HeaderMap::new();
        headers.insert("X-Entity-ID", "ent-9".parse().unwrap());

        let identity = auth.identify(&headers).unwrap();
        assert_eq!(identity.entity_id.as_deref(), Some("ent-9"));
    }

    #[test]
    fn fallback_disabled_in_production() {
        let auth = verifier(false);
        let mut headers = http::HeaderMap::new();
        headers.insert("X-Entity-ID", "ent-9".parse().unwrap());

        let identity = auth.identify(&headers).unwrap();
        assert_eq!(identity.subject, "anonymous");
        assert!(identity.entity_id.is_none());
    }

    #[test]
    fn malformed_authorization_rejected() {
        let auth = verifier(true);
        let mut headers = http::HeaderMap::new();
        headers.insert("Authorization", "Token abc".parse().unwrap());
        assert!(auth.identify(&headers).is_err());
    }
}
