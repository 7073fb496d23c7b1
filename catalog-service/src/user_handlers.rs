use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{extract::State, Json};
use common_auth::{AuthContext, Role};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::api_error::ApiError;
use crate::seed;
use crate::tokens::TokenSubject;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub username: String,
    pub password: String,
    /// 1 registers an ADMIN, anything else a USER.
    pub role: u8,
    pub group_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: String,
}

#[derive(Debug, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub name: String,
    pub role: String,
    pub username: String,
    pub group_id: i64,
}

#[derive(FromRow)]
struct CredentialRow {
    id: Uuid,
    group_id: i64,
    username: String,
    role: String,
    password_hash: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let RegisterRequest {
        name,
        username,
        password,
        role,
        group_id,
    } = request;

    let username = username.to_lowercase();
    let role = if role == 1 { Role::Admin } else { Role::User };
    let password_hash = hash_password(password).await?;

    let mut tx = state.db.begin().await.map_err(ApiError::internal)?;

    // Tenancy is connect-or-create: first reference of a group id creates it.
    sqlx::query("INSERT INTO groups (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
        .bind(group_id)
        .execute(&mut *tx)
        .await
        .map_err(ApiError::internal)?;

    let insert = sqlx::query(
        "INSERT INTO users (id, group_id, name, username, password_hash, role)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(Uuid::new_v4())
    .bind(group_id)
    .bind(&name)
    .bind(&username)
    .bind(&password_hash)
    .bind(role.as_str())
    .execute(&mut *tx)
    .await;

    if let Err(err) = insert {
        if is_unique_violation(&err) {
            return Err(ApiError::DuplicateCredential);
        }
        return Err(ApiError::internal(err));
    }

    if role == Role::Admin {
        let group_users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE group_id = $1")
            .bind(group_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        if group_users == 1 {
            seed::seed_group_if_empty(&mut tx, group_id)
                .await
                .map_err(ApiError::internal)?;
        }
    }

    tx.commit().await.map_err(ApiError::internal)?;

    Ok(Json(MessageResponse {
        message: "Account created successfully",
    }))
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let LoginRequest { username, password } = request;
    let username = username.to_lowercase();

    let row = sqlx::query_as::<_, CredentialRow>(
        "SELECT id, group_id, username, role, password_hash FROM users WHERE username = $1",
    )
    .bind(&username)
    .fetch_optional(&state.db)
    .await
    .map_err(|err| {
        state.metrics.login_attempt("error");
        ApiError::internal(err)
    })?;

    // Unknown usernames fall through the same path as a password mismatch so
    // the response never reveals whether the account exists.
    let Some(row) = row else {
        state.metrics.login_attempt("invalid_credentials");
        return Err(ApiError::InvalidCredentials);
    };

    if !verify_password(password, row.password_hash.clone()).await? {
        state.metrics.login_attempt("invalid_credentials");
        return Err(ApiError::InvalidCredentials);
    }

    let role = row
        .role
        .parse::<Role>()
        .map_err(|_| ApiError::internal(format!("unknown role '{}' on user {}", row.role, row.id)))?;

    let subject = TokenSubject {
        user_id: row.id,
        group_id: row.group_id,
        role,
        username: row.username,
    };

    let issued = state.signer.issue(&subject).map_err(|err| {
        state.metrics.login_attempt("error");
        ApiError::internal(err)
    })?;

    state.metrics.login_attempt("success");

    Ok(Json(TokenResponse {
        access_token: issued.access_token,
    }))
}

pub async fn get_me(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Profile>, ApiError> {
    let profile = sqlx::query_as::<_, Profile>(
        "SELECT name, role, username, group_id FROM users WHERE id = $1",
    )
    .bind(auth.claims.subject)
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::internal)?;

    // The token can outlive the account; a missing subject is not authenticated.
    profile.map(Json).ok_or(ApiError::Unauthorized)
}

pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<Profile>, ApiError> {
    let profile = sqlx::query_as::<_, Profile>(
        "UPDATE users SET name = $1 WHERE id = $2 AND group_id = $3
         RETURNING name, role, username, group_id",
    )
    .bind(&request.name)
    .bind(auth.claims.subject)
    .bind(auth.group_id())
    .fetch_optional(&state.db)
    .await
    .map_err(ApiError::internal)?;

    profile.map(Json).ok_or(ApiError::Unauthorized)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

/// Argon2 hashing is deliberately expensive; run it on the blocking pool so
/// it never stalls the async workers handling unrelated requests.
async fn hash_password(password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
    })
    .await
    .map_err(ApiError::internal)?
    .map_err(ApiError::internal)
}

async fn verify_password(password: String, stored_hash: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&stored_hash)?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    })
    .await
    .map_err(ApiError::internal)?
    .map_err(|err: argon2::password_hash::Error| ApiError::internal(err))
}
