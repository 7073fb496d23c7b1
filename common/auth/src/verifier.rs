use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::Value;
use tracing::debug;

use crate::claims::Claims;
use crate::config::JwtConfig;
use crate::error::AuthResult;

/// Verifies bearer tokens signed with the process-wide shared secret.
///
/// Verification is pure computation: signature plus expiry, no I/O.
#[derive(Clone)]
pub struct TokenVerifier {
    config: JwtConfig,
    decoding_key: DecodingKey,
}

impl TokenVerifier {
    pub fn new(config: JwtConfig) -> Self {
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());
        Self {
            config,
            decoding_key,
        }
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    pub fn verify(&self, token: &str) -> AuthResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = self.config.leeway_seconds.into();

        let token_data = decode::<Value>(token, &self.decoding_key, &validation)?;
        let claims = Claims::try_from(token_data.claims)?;
        debug!(subject = %claims.subject, "verified token successfully");
        Ok(claims)
    }
}
