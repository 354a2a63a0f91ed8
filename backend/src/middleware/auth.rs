//! Authentication middleware
//!
//! JWT authentication and role-based capabilities

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use shared::ledger::authorize_mutation;
use shared::models::{Capabilities, Role};
use uuid::Uuid;

use crate::error::{AppError, AppResult, ErrorDetail, ErrorResponse};
use crate::AppState;

/// Authenticated user information extracted from JWT
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
    pub capabilities: Capabilities,
}

impl AuthUser {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self {
            user_id,
            role,
            capabilities: role.capabilities(),
        }
    }

    /// Acting user id for a stock mutation, or PermissionDenied
    pub fn require_mutate(&self) -> AppResult<Uuid> {
        Ok(authorize_mutation(&self.capabilities, Some(self.user_id))?)
    }

    pub fn can_view_cost(&self) -> bool {
        self.capabilities.can_view_cost
    }
}

/// JWT claims structure
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

/// Authentication middleware that validates JWT tokens
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
    {
        Some(token) => token.to_string(),
        None => return unauthorized_response("Missing or invalid Authorization header"),
    };

    let auth_user = match decode_user(&token, &state.config.jwt.secret) {
        Ok(user) => user,
        Err(AppError::InvalidToken(msg)) => return unauthorized_response(&msg),
        Err(other) => return other.into_response(),
    };

    tracing::debug!(user_id = %auth_user.user_id, role = auth_user.role.as_str(), "authenticated");
    request.extensions_mut().insert(auth_user);

    next.run(request).await
}

/// Decode and validate a token into the acting user
pub fn decode_user(token: &str, secret: &str) -> AppResult<AuthUser> {
    use jsonwebtoken::{decode, DecodingKey, Validation};

    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| AppError::InvalidToken(format!("Invalid token: {}", e)))?;

    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::InvalidToken("Invalid user ID in token".to_string()))?;
    // An unknown role gets no capabilities rather than an error
    let role = Role::from_str(&claims.role).unwrap_or(Role::User);

    Ok(AuthUser::new(user_id, role))
}

fn unauthorized_response(message: &str) -> Response {
    let error = ErrorResponse {
        error: ErrorDetail::new("UNAUTHORIZED", message, "Non autorizzato"),
    };

    (StatusCode::UNAUTHORIZED, Json(error)).into_response()
}

/// Extractor for authenticated user
#[derive(Clone, Debug)]
pub struct CurrentUser(pub AuthUser);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .map(CurrentUser)
            .ok_or(AppError::NotAuthenticated)
    }
}
