use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};
use crate::roles::Role;

/// Application-focused representation of verified token claims.
#[derive(Debug, Clone, Serialize)]
pub struct Claims {
    pub subject: Uuid,
    pub group_id: i64,
    pub role: Role,
    pub username: String,
    pub expires_at: DateTime<Utc>,
    pub issued_at: Option<DateTime<Utc>>,
}

impl Claims {
    /// Convenience helper for role checks.
    pub fn has_role(&self, role: Role) -> bool {
        self.role == role
    }
}

#[derive(Debug, Deserialize)]
struct ClaimsRepr {
    sub: String,
    #[serde(rename = "groupId")]
    group_id: i64,
    role: String,
    username: String,
    exp: i64,
    #[serde(default)]
    iat: Option<i64>,
}

impl TryFrom<ClaimsRepr> for Claims {
    type Error = AuthError;

    fn try_from(value: ClaimsRepr) -> AuthResult<Self> {
        let subject = Uuid::parse_str(&value.sub)
            .map_err(|_| AuthError::InvalidClaim("sub", value.sub.clone()))?;
        let role = value
            .role
            .parse::<Role>()
            .map_err(|_| AuthError::InvalidClaim("role", value.role.clone()))?;

        let expires_at = Utc
            .timestamp_opt(value.exp, 0)
            .single()
            .ok_or_else(|| AuthError::InvalidClaim("exp", value.exp.to_string()))?;

        let issued_at = match value.iat {
            Some(iat) => Some(
                Utc.timestamp_opt(iat, 0)
                    .single()
                    .ok_or_else(|| AuthError::InvalidClaim("iat", iat.to_string()))?,
            ),
            None => None,
        };

        Ok(Self {
            subject,
            group_id: value.group_id,
            role,
            username: value.username,
            expires_at,
            issued_at,
        })
    }
}

impl TryFrom<serde_json::Value> for Claims {
    type Error = AuthError;

    fn try_from(value: serde_json::Value) -> AuthResult<Self> {
        let repr: ClaimsRepr = serde_json::from_value(value)
            .map_err(|err| AuthError::InvalidJson(err.to_string()))?;
        Claims::try_from(repr)
    }
}
