use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use chrono::Utc;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use skillswap_core::{validate_user_id, Role};
use sqlx::SqlitePool;

use crate::{
    error::{AppError, Result},
    AppState,
};

/// Claims carried by tokens issued by the external identity service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub email: String,
    pub name: String,
    pub role: Role,
    pub exp: usize,
}

#[derive(Clone, Debug)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
}

impl AuthUser {
    pub fn require_role(&self, role: Role, message: &str) -> Result<()> {
        if self.role == role {
            Ok(())
        } else {
            Err(AppError::Forbidden(message.to_string()))
        }
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            email: claims.email,
            name: claims.name,
            role: claims.role,
        }
    }
}

pub fn verify_token(token: &str, secret: &str) -> Result<AuthUser> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|err| {
        tracing::debug!(error = %err, "rejected bearer token");
        AppError::Unauthorized
    })?;

    // The subject becomes a path segment and a foreign key everywhere.
    if let Err(err) = validate_user_id("User", &token_data.claims.sub) {
        tracing::debug!(error = %err, "rejected token subject");
        return Err(AppError::Unauthorized);
    }

    Ok(token_data.claims.into())
}

/// Mirrors the authenticated identity into `users` so profile, review and
/// earnings queries can join against it.
pub async fn sync_user(pool: &SqlitePool, user: &AuthUser) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO users (id, email, name, role, created_at) VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET email = excluded.email, name = excluded.name, role = excluded.role
        WHERE users.email != excluded.email OR users.name != excluded.name OR users.role != excluded.role
        "#,
    )
    .bind(&user.id)
    .bind(&user.email)
    .bind(&user.name)
    .bind(user.role)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let bearer = request
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or(AppError::Unauthorized)?;

    let user = verify_token(bearer.token(), &state.config.jwt_secret)?;
    sync_user(&state.db.pool, &user).await?;

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

// Extractor for getting the authenticated user from request extensions
#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}
