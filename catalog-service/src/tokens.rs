use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use common_auth::Role;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use uuid::Uuid;

/// Access tokens are valid for a fixed two days from issuance.
pub const TOKEN_TTL_SECONDS: i64 = 2 * 24 * 60 * 60;

pub struct TokenSubject {
    pub user_id: Uuid,
    pub group_id: i64,
    pub role: Role,
    pub username: String,
}

pub struct IssuedToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Signs access tokens with the process-wide shared secret.
pub struct TokenSigner {
    encoding_key: EncodingKey,
}

impl TokenSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn issue(&self, subject: &TokenSubject) -> Result<IssuedToken> {
        let now = Utc::now();
        let expires_at = now + Duration::seconds(TOKEN_TTL_SECONDS);

        let claims = AccessClaims {
            sub: subject.user_id.to_string(),
            group_id: subject.group_id,
            role: subject.role.as_str(),
            username: &subject.username,
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
        };

        let access_token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|err| anyhow!("Failed to sign access token: {err}"))?;

        Ok(IssuedToken {
            access_token,
            expires_at,
        })
    }
}

#[derive(Serialize)]
struct AccessClaims<'a> {
    sub: String,
    #[serde(rename = "groupId")]
    group_id: i64,
    role: &'a str,
    username: &'a str,
    exp: i64,
    iat: i64,
}
