use axum::http::StatusCode;

use crate::extractors::AuthContext;
use crate::roles::Role;

#[derive(Debug, Clone)]
pub enum GuardError {
    Forbidden { required: Vec<Role> },
}

impl GuardError {
    pub fn into_response(self) -> (StatusCode, String) {
        match self {
            GuardError::Forbidden { required } => (
                StatusCode::FORBIDDEN,
                if required.is_empty() {
                    "Insufficient role".to_string()
                } else {
                    format!(
                        "Insufficient role. Required one of: {}",
                        required
                            .iter()
                            .map(Role::as_str)
                            .collect::<Vec<_>>()
                            .join(", ")
                    )
                },
            ),
        }
    }
}

impl From<GuardError> for (StatusCode, String) {
    fn from(value: GuardError) -> Self {
        value.into_response()
    }
}

/// Admit the caller when its role is in the allowed set.
///
/// An empty allowed set admits every authenticated caller. Authorization runs
/// strictly after authentication: callers reach this with verified claims only.
pub fn ensure_role(auth: &AuthContext, allowed: &[Role]) -> Result<(), GuardError> {
    if allowed.is_empty() {
        return Ok(());
    }

    if allowed.contains(&auth.claims.role) {
        Ok(())
    } else {
        Err(GuardError::Forbidden {
            required: allowed.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::Claims;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn context_with_role(role: Role) -> AuthContext {
        AuthContext {
            claims: Claims {
                subject: Uuid::new_v4(),
                group_id: 1000,
                role,
                username: "budi_admin".to_string(),
                expires_at: Utc::now() + Duration::days(2),
                issued_at: Some(Utc::now()),
            },
            token: "test-token".to_string(),
        }
    }

    #[test]
    fn empty_allowed_set_admits_any_role() {
        let auth = context_with_role(Role::User);
        assert!(ensure_role(&auth, &[]).is_ok());
    }

    #[test]
    fn admits_matching_role() {
        let auth = context_with_role(Role::Admin);
        assert!(ensure_role(&auth, &[Role::Admin]).is_ok());
    }

    #[test]
    fn denies_missing_role() {
        let auth = context_with_role(Role::User);
        let err = ensure_role(&auth, &[Role::Admin]).expect_err("should deny");
        let GuardError::Forbidden { required } = err;
        assert_eq!(required, vec![Role::Admin]);
    }
}
