//! # Accounts
//!
//! Registration, login, and the bearer-token extractors the protected routes
//! hang off.
//!
//! Hashing and signing are delegated: argon2 for password hashes,
//! HS256 JWTs for sessions. Tokens carry the user id, an admin flag, and an
//! expiry; there is no refresh or revocation machinery.
use std::sync::Arc;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    Json,
    extract::{FromRequestParts, State},
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
    error::{AppError, Payload},
    models::{LoginPayload, RegisterPayload, User},
    state::AppState,
};

const TOKEN_DAYS: i64 = 30;
const MIN_PASSWORD_LEN: usize = 8;

#[derive(Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub admin: bool,
    pub exp: i64,
}

pub struct AuthUser {
    pub id: Uuid,
    pub is_admin: bool,
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(AppError::Unauthorized)?;

        let token = header.strip_prefix("Bearer ").ok_or(AppError::Unauthorized)?;
        let claims = decode_token(&state.config.jwt_secret, token)?;

        Ok(Self {
            id: claims.sub,
            is_admin: claims.admin,
        })
    }
}

pub struct AdminUser(pub AuthUser);

impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;

        if !user.is_admin {
            return Err(AppError::Forbidden);
        }

        Ok(Self(user))
    }
}

#[derive(Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub is_admin: bool,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            is_admin: user.is_admin,
        }
    }
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: PublicUser,
}

pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    Payload(payload): Payload<RegisterPayload>,
) -> Result<impl IntoResponse, AppError> {
    if !valid_email(&payload.email) {
        return Err(AppError::MalformedPayload("Invalid email".to_string()));
    }

    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::MalformedPayload(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    if payload.name.trim().is_empty() {
        return Err(AppError::MalformedPayload("Name is required".to_string()));
    }

    let password_hash = hash_password(&payload.password)?;

    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (email, password_hash, name) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(payload.email.to_lowercase())
    .bind(password_hash)
    .bind(payload.name.trim())
    .fetch_one(&state.db)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::EmailTaken,
        other => AppError::Database(other),
    })?;

    info!("Registered {}", user.id);

    let token = issue_token(&state.config.jwt_secret, user.id, user.is_admin)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: user.into(),
        }),
    ))
}

pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Payload(payload): Payload<LoginPayload>,
) -> Result<Json<AuthResponse>, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(payload.email.to_lowercase())
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !verify_password(&user.password_hash, &payload.password) {
        return Err(AppError::Unauthorized);
    }

    let token = issue_token(&state.config.jwt_secret, user.id, user.is_admin)?;

    Ok(Json(AuthResponse {
        token,
        user: user.into(),
    }))
}

pub fn issue_token(secret: &str, user_id: Uuid, admin: bool) -> Result<String, AppError> {
    let claims = Claims {
        sub: user_id,
        admin,
        exp: (Utc::now() + Duration::days(TOKEN_DAYS)).timestamp(),
    };

    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(Box::new(e)))
}

pub fn decode_token(secret: &str, token: &str) -> Result<Claims, AppError> {
    jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthorized)
}

fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(Box::new(e)))
}

fn verify_password(hash: &str, password: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

pub fn valid_email(input: &str) -> bool {
    let re = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();

    re.is_match(input)
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::{decode_token, hash_password, issue_token, valid_email, verify_password};

    #[test]
    fn test_valid_email() {
        assert!(valid_email("shopper@example.com"));
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("two@at@signs.com"));
        assert!(!valid_email("spaces in@example.com"));
    }

    #[test]
    fn test_password_roundtrip() {
        let hash = hash_password("hunter2hunter2").unwrap();

        assert!(verify_password(&hash, "hunter2hunter2"));
        assert!(!verify_password(&hash, "wrong-password"));
    }

    #[test]
    fn test_verify_rejects_garbage_hash() {
        assert!(!verify_password("not-a-phc-string", "anything"));
    }

    #[test]
    fn test_token_roundtrip() {
        let user_id = Uuid::from_u128(42);

        let token = issue_token("secret", user_id, true).unwrap();
        let claims = decode_token("secret", &token).unwrap();

        assert_eq!(claims.sub, user_id);
        assert!(claims.admin);
    }

    #[test]
    fn test_token_rejects_wrong_secret() {
        let token = issue_token("secret", Uuid::from_u128(1), false).unwrap();

        assert!(decode_token("other-secret", &token).is_err());
    }
}
