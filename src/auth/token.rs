//! HS256 bearer tokens.
//!
//! Tokens carry the user's id, username and role so that request guards can
//! authorize without a database round trip.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::Role;
use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

/// Token lifetime: 24 hours.
pub const TOKEN_TTL_SECS: i64 = 24 * 3600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub id: i64,
    pub username: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Signing key, kept in Rocket managed state.
pub struct TokenKeys {
    secret: Vec<u8>,
}

impl TokenKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    pub fn issue(&self, id: i64, username: &str, role: Role, now_unix: i64) -> Result<String, AppError> {
        let claims = Claims {
            id,
            username: username.to_string(),
            role,
            iat: now_unix,
            exp: now_unix + TOKEN_TTL_SECS,
        };
        self.sign(&claims)
    }

    pub fn sign(&self, claims: &Claims) -> Result<String, AppError> {
        let payload = serde_json::to_vec(claims)
            .map_err(|e| AppError::Internal(format!("Failed to encode claims: {}", e)))?;

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(TOKEN_HEADER.as_bytes()),
            URL_SAFE_NO_PAD.encode(payload)
        );
        let signature = self.mac(signing_input.as_bytes())?.finalize().into_bytes();

        Ok(format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(signature)))
    }

    pub fn verify(&self, token: &str, now_unix: i64) -> Result<Claims, AppError> {
        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AppError::Authentication("Malformed token".to_string()));
        };

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| AppError::Authentication("Malformed token signature".to_string()))?;

        let signing_input = format!("{}.{}", header, payload);
        self.mac(signing_input.as_bytes())?
            .verify_slice(&signature)
            .map_err(|_| AppError::Authentication("Invalid token signature".to_string()))?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| AppError::Authentication("Malformed token payload".to_string()))?;
        let claims: Claims = serde_json::from_slice(&payload)
            .map_err(|_| AppError::Authentication("Malformed token claims".to_string()))?;

        if now_unix >= claims.exp {
            return Err(AppError::Authentication("Token expired".to_string()));
        }

        Ok(claims)
    }

    fn mac(&self, data: &[u8]) -> Result<HmacSha256, AppError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| AppError::Internal(format!("Invalid signing key: {}", e)))?;
        mac.update(data);
        Ok(mac)
    }
}
