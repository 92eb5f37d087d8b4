//! Connection authentication and session token verification

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::util::time::unix_secs;
use crate::ws::registry::Identity;

type HmacSha256 = Hmac<Sha256>;

/// User id as issued by the login service (numeric or string)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserId::Number(n) => write!(f, "{}", n),
            UserId::Text(s) => f.write_str(s),
        }
    }
}

/// User data carried in the token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenData {
    #[serde(rename = "userId")]
    pub user_id: UserId,
    pub username: String,
}

/// Session token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: u64,
    pub data: TokenData,
}

/// Decides whether a connection may join, before the core sees it
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, token: Option<&str>) -> Result<Identity, AuthError>;
}

/// Verifies HS256 session tokens issued by the login service
pub struct TokenAuthenticator {
    secret: String,
}

impl TokenAuthenticator {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl Authenticator for TokenAuthenticator {
    fn authenticate(&self, token: Option<&str>) -> Result<Identity, AuthError> {
        let token = token.ok_or(AuthError::MissingToken)?;
        let claims = verify_token(token, &self.secret)?;
        Ok(Identity {
            user_id: claims.data.user_id.to_string(),
            display_name: claims.data.username,
        })
    }
}

/// Verify a token and extract claims
pub fn verify_token(token: &str, secret: &str) -> Result<TokenClaims, AuthError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(AuthError::InvalidToken);
    }

    let header_b64 = parts[0];
    let payload_b64 = parts[1];
    let signature_b64 = parts[2];

    let provided_signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AuthError::InvalidToken)?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::InvalidToken)?;
    mac.update(header_b64.as_bytes());
    mac.update(b".");
    mac.update(payload_b64.as_bytes());
    mac.verify_slice(&provided_signature)
        .map_err(|_| AuthError::InvalidToken)?;

    let payload_json = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| AuthError::InvalidToken)?;

    let claims: TokenClaims =
        serde_json::from_slice(&payload_json).map_err(|_| AuthError::InvalidToken)?;

    if claims.exp < unix_secs() {
        return Err(AuthError::TokenExpired);
    }

    Ok(claims)
}

/// Authentication error types
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authentication failed: No token provided.")]
    MissingToken,

    #[error("Authentication failed: Invalid token.")]
    InvalidToken,

    #[error("Authentication failed: Token expired.")]
    TokenExpired,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, self.to_string()).into_response()
    }
}

#[cfg(test)]
pub(crate) fn sign_token(claims: &TokenClaims, secret: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap());
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{}.{}", header, payload).as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    format!("{}.{}.{}", header, payload, signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(exp: u64) -> TokenClaims {
        TokenClaims {
            exp,
            iat: 0,
            data: TokenData {
                user_id: UserId::Number(42),
                username: "alice".to_string(),
            },
        }
    }

    #[test]
    fn valid_token_yields_identity() {
        let auth = TokenAuthenticator::new("secret");
        let token = sign_token(&claims(unix_secs() + 60), "secret");
        let identity = auth.authenticate(Some(&token)).unwrap();
        assert_eq!(identity.user_id, "42");
        assert_eq!(identity.display_name, "alice");
    }

    #[test]
    fn rejects_missing_forged_and_expired_tokens() {
        let auth = TokenAuthenticator::new("secret");
        assert_eq!(auth.authenticate(None), Err(AuthError::MissingToken));

        let forged = sign_token(&claims(unix_secs() + 60), "other");
        assert_eq!(auth.authenticate(Some(&forged)), Err(AuthError::InvalidToken));

        let expired = sign_token(&claims(1), "secret");
        assert_eq!(auth.authenticate(Some(&expired)), Err(AuthError::TokenExpired));

        assert_eq!(auth.authenticate(Some("nonsense")), Err(AuthError::InvalidToken));
    }
}
