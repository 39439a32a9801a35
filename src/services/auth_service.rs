use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use password_hash::rand_core::OsRng;
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit::log_audit,
    db::DbPool,
    dto::auth::{
        Claims, LoginRequest, RefreshRequest, RefreshResponse, RegisterRequest, RegisterResponse,
        TokenKind, TokenPair,
    },
    error::{AppError, AppResult},
    models::{Role, User},
    response::{ApiResponse, Meta},
};

pub async fn register_user(
    pool: &DbPool,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<RegisterResponse>> {
    payload.validate()?;
    let RegisterRequest {
        username,
        email,
        password,
        role,
        contact,
        image,
    } = payload;

    let exist: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM users WHERE email = $1 OR username = $2")
            .bind(email.as_str())
            .bind(username.as_str())
            .fetch_optional(pool)
            .await?;

    if exist.is_some() {
        return Err(AppError::BadRequest(
            "Username or email is already taken".to_string(),
        ));
    }

    let password_hash = hash_password(&password)?;
    let id = Uuid::new_v4();

    let user: User = sqlx::query_as(
        r#"
        INSERT INTO users (id, username, email, password_hash, role, contact, image)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(username.as_str())
    .bind(email.as_str())
    .bind(password_hash)
    .bind(role.as_str())
    .bind(contact)
    .bind(image)
    .fetch_one(pool)
    .await?;

    let tokens = issue_token_pair(user.id, user.role)?;

    if let Err(err) = log_audit(
        pool,
        Some(user.id),
        "user_register",
        Some("users"),
        Some(serde_json::json!({ "user_id": user.id, "role": user.role })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "User created",
        RegisterResponse { user, tokens },
        None,
    ))
}

pub async fn login_user(pool: &DbPool, payload: LoginRequest) -> AppResult<ApiResponse<TokenPair>> {
    let LoginRequest { email, password } = payload;
    let user: Option<User> = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(email.as_str())
        .fetch_optional(pool)
        .await?;

    let user = match user {
        Some(u) => u,
        None => return Err(AppError::Unauthorized("User does not exist".into())),
    };

    if !verify_password(&password, &user.password_hash)? {
        return Err(AppError::Unauthorized("Invalid email or password".into()));
    }

    let tokens = issue_token_pair(user.id, user.role)?;

    if let Err(err) = log_audit(
        pool,
        Some(user.id),
        "user_login",
        Some("users"),
        Some(serde_json::json!({ "user_id": user.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success("Logged in", tokens, Some(Meta::empty())))
}

/// Exchange a valid refresh token for a fresh access token. The claims are
/// trusted as issued; no database round trip.
pub fn refresh_access_token(payload: RefreshRequest) -> AppResult<ApiResponse<RefreshResponse>> {
    let secret = jwt_secret()?;
    let decoded = decode::<Claims>(
        &payload.refresh_token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthorized("Invalid or expired refresh token".into()))?;

    if decoded.claims.kind != TokenKind::Refresh {
        return Err(AppError::Unauthorized(
            "Access token cannot be used to refresh".into(),
        ));
    }

    let user_id = Uuid::parse_str(&decoded.claims.sub)
        .map_err(|_| AppError::Unauthorized("Invalid user id in token".into()))?;

    let access_token = sign_token(user_id, decoded.claims.role, TokenKind::Access)?;

    Ok(ApiResponse::success(
        "Token refreshed",
        RefreshResponse { access_token },
        Some(Meta::empty()),
    ))
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub fn issue_token_pair(user_id: Uuid, role: Role) -> AppResult<TokenPair> {
    Ok(TokenPair {
        access_token: sign_token(user_id, role, TokenKind::Access)?,
        refresh_token: sign_token(user_id, role, TokenKind::Refresh)?,
    })
}

fn sign_token(user_id: Uuid, role: Role, kind: TokenKind) -> AppResult<String> {
    let secret = jwt_secret()?;
    let ttl = match kind {
        TokenKind::Access => Duration::hours(24),
        TokenKind::Refresh => Duration::days(30),
    };
    let expiration = Utc::now()
        .checked_add_signed(ttl)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: user_id.to_string(),
        role,
        kind,
        exp: expiration.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

fn jwt_secret() -> AppResult<String> {
    std::env::var("JWT_SECRET")
        .map_err(|_| AppError::Internal(anyhow::anyhow!("JWT_SECRET is not set")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_hash_never_equals_plaintext() {
        let hash = hash_password("Str0ng!pass").unwrap();
        assert_ne!(hash, "Str0ng!pass");
        assert!(verify_password("Str0ng!pass", &hash).unwrap());
        assert!(!verify_password("WrongPass1!", &hash).unwrap());
    }

    #[test]
    fn refresh_rejects_access_tokens() {
        // SAFETY: test-local env var, tests in this module do not race on it.
        unsafe { std::env::set_var("JWT_SECRET", "test-secret") };
        let pair = issue_token_pair(Uuid::new_v4(), Role::Buyer).unwrap();
        let err = refresh_access_token(RefreshRequest {
            refresh_token: pair.access_token,
        });
        assert!(err.is_err());

        let ok = refresh_access_token(RefreshRequest {
            refresh_token: pair.refresh_token,
        });
        assert!(ok.is_ok());
    }
}
