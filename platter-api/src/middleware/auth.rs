use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use platter_core::{require_role, Authenticator, CoreError, CoreResult, Identity, Role};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

/// HS256 tokens issued by the account service
pub struct JwtAuthenticator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }
}

impl Authenticator for JwtAuthenticator {
    fn authenticate(&self, bearer_token: &str) -> CoreResult<Identity> {
        let token_data = decode::<Claims>(bearer_token, &self.key, &self.validation)
            .map_err(|e| CoreError::IdentityError(e.to_string()))?;

        let id = Uuid::parse_str(&token_data.claims.sub)
            .map_err(|_| CoreError::IdentityError("subject is not a valid id".into()))?;
        let role = token_data.claims.role.parse::<Role>()?;
        Ok(Identity::new(id, role))
    }
}

// ============================================================================
// Middleware
// ============================================================================

async fn authorize(
    state: &AppState,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    required: Option<Role>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let TypedHeader(Authorization(bearer)) =
        bearer.ok_or_else(|| AppError::AuthenticationError("Missing bearer token".into()))?;

    let identity = state.auth.authenticate(bearer.token()).map_err(|e| {
        tracing::debug!("Rejected token: {}", e);
        AppError::AuthenticationError("Invalid or expired token".into())
    })?;

    if let Some(role) = required {
        require_role(&identity, role)
            .map_err(|e| AppError::AuthorizationError(e.to_string()))?;
    }

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Any authenticated caller; handlers check ownership themselves
pub async fn identity_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    authorize(&state, bearer, None, req, next).await
}

pub async fn customer_auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    authorize(&state, bearer, Some(Role::Customer), req, next).await
}

pub async fn vendor_auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    authorize(&state, bearer, Some(Role::Vendor), req, next).await
}

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    authorize(&state, bearer, Some(Role::Admin), req, next).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(secret: &str, sub: &str, role: &str, exp: usize) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            role: role.to_string(),
            exp,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    fn in_an_hour() -> usize {
        (chrono::Utc::now().timestamp() + 3600) as usize
    }

    #[test]
    fn test_valid_token_yields_identity() {
        let auth = JwtAuthenticator::new("secret");
        let id = Uuid::new_v4();
        let identity = auth
            .authenticate(&token("secret", &id.to_string(), "VENDOR", in_an_hour()))
            .unwrap();
        assert_eq!(identity, Identity::new(id, Role::Vendor));
    }

    #[test]
    fn test_rejects_bad_tokens() {
        let auth = JwtAuthenticator::new("secret");
        let id = Uuid::new_v4().to_string();

        let wrong_key = token("other", &id, "CUSTOMER", in_an_hour());
        assert!(auth.authenticate(&wrong_key).is_err());

        let expired = token("secret", &id, "CUSTOMER", 1_000);
        assert!(auth.authenticate(&expired).is_err());

        let bad_subject = token("secret", "not-a-uuid", "CUSTOMER", in_an_hour());
        assert!(auth.authenticate(&bad_subject).is_err());

        let bad_role = token("secret", &id, "RIDER", in_an_hour());
        assert!(auth.authenticate(&bad_role).is_err());
    }
}
