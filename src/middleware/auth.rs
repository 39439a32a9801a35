use axum::{extract::FromRequestParts, http::header};
use jsonwebtoken::{DecodingKey, Validation, decode};
use uuid::Uuid;

use crate::{
    dto::auth::{Claims, TokenKind},
    error::AppError,
    models::Role,
};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
}

pub fn ensure_role(user: &AuthUser, role: Role, message: &str) -> Result<(), AppError> {
    if user.role == role {
        Ok(())
    } else {
        Err(AppError::Forbidden(message.to_string()))
    }
}

pub fn ensure_admin(user: &AuthUser) -> Result<(), AppError> {
    ensure_role(user, Role::Admin, "Admins only")
}

pub fn ensure_buyer(user: &AuthUser, message: &str) -> Result<(), AppError> {
    ensure_role(user, Role::Buyer, message)
}

pub fn ensure_seller(user: &AuthUser, message: &str) -> Result<(), AppError> {
    ensure_role(user, Role::Seller, message)
}

pub fn ensure_deliverer(user: &AuthUser, message: &str) -> Result<(), AppError> {
    ensure_role(user, Role::Deliverer, message)
}

/// Admin or a specific owner id; everything ownership-scoped goes through here.
pub fn ensure_self_or_admin(user: &AuthUser, owner_id: Uuid) -> Result<(), AppError> {
    match user.role {
        Role::Admin => Ok(()),
        Role::Seller | Role::Buyer | Role::Deliverer => {
            if user.user_id == owner_id {
                Ok(())
            } else {
                Err(AppError::Forbidden("Not allowed".to_string()))
            }
        }
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;
    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;

        let auth_str = auth_header
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid Authorization header".into()))?;

        if !auth_str.starts_with("Bearer ") {
            return Err(AppError::Unauthorized("Invalid Authorization scheme".into()));
        }
        let token = auth_str.trim_start_matches("Bearer ").trim();

        let secret = std::env::var("JWT_SECRET")
            .map_err(|_| AppError::Internal(anyhow::anyhow!("JWT_SECRET is not set")))?;

        let decoded = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))?;

        if decoded.claims.kind != TokenKind::Access {
            return Err(AppError::Unauthorized(
                "Refresh token cannot be used for access".into(),
            ));
        }

        let user_id = Uuid::parse_str(&decoded.claims.sub)
            .map_err(|_| AppError::Unauthorized("Invalid user id in token".into()))?;

        Ok(AuthUser {
            user_id,
            role: decoded.claims.role,
        })
    }
}
