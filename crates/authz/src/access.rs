//! Request-level authentication and role checks.
//!
//! `require_token` runs as middleware in front of protected routes and puts
//! the caller's [`Identity`] into the request extensions. Handlers pick it up
//! with the `Identity` extractor and call [`authorize`] when the operation is
//! role-gated.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use shelf_http::AppError;

use crate::role::{Identity, Role};
use crate::token::{TokenError, TokenService};

const BEARER_PREFIX: &str = "Bearer ";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthzError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("invalid bearer token: {0}")]
    InvalidToken(#[from] TokenError),
    #[error("role '{actual}' may not perform this action, '{required}' is required")]
    Forbidden { required: Role, actual: Role },
}

impl From<AuthzError> for AppError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::MissingToken => AppError::unauthorized("missing bearer token"),
            AuthzError::InvalidToken(reason) => {
                // The precise reason stays server side.
                tracing::info!(%reason, "rejected bearer token");
                AppError::unauthorized("invalid or expired token")
            }
            AuthzError::Forbidden { required, actual } => {
                tracing::info!(%required, %actual, "role check failed");
                AppError::forbidden("access denied")
            }
        }
    }
}

/// Shared handle used by the authentication middleware.
#[derive(Debug, Clone)]
pub struct AccessControl {
    tokens: Arc<TokenService>,
}

impl AccessControl {
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self { tokens }
    }

    pub fn tokens(&self) -> &Arc<TokenService> {
        &self.tokens
    }

    /// Resolve the caller from the `Authorization: Bearer` header.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Identity, AuthzError> {
        let value = headers
            .get(AUTHORIZATION)
            .ok_or(AuthzError::MissingToken)?
            .to_str()
            .map_err(|_| AuthzError::InvalidToken(TokenError::Malformed))?;

        let raw = value
            .strip_prefix(BEARER_PREFIX)
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AuthzError::MissingToken)?;

        let claims = self.tokens.verify(raw)?;
        Ok(Identity {
            user_id: claims.sub,
            role: claims.role,
        })
    }
}

/// Strict role check: the caller's role must equal `required`.
pub fn authorize(identity: &Identity, required: Role) -> Result<(), AuthzError> {
    if identity.role == required {
        Ok(())
    } else {
        Err(AuthzError::Forbidden {
            required,
            actual: identity.role,
        })
    }
}

/// Middleware rejecting requests without a valid bearer token.
pub async fn require_token(
    State(access): State<AccessControl>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = access.authenticate(request.headers())?;
    tracing::debug!(user_id = %identity.user_id, role = %identity.role, "request authenticated");

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or_else(|| AppError::unauthorized("missing bearer token"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Clock;
    use axum::{
        body::Body,
        http::{HeaderValue, Request as HttpRequest, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use std::time::Duration;
    use tower::ServiceExt;

    struct FixedClock(u64);

    impl Clock for FixedClock {
        fn now_epoch_seconds(&self) -> u64 {
            self.0
        }
    }

    fn access_at(now: u64) -> AccessControl {
        let tokens = TokenService::new("access-secret", Duration::from_secs(60))
            .unwrap()
            .with_clock(Arc::new(FixedClock(now)));
        AccessControl::new(Arc::new(tokens))
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    #[test]
    fn when_header_is_missing_then_authenticate_fails() {
        let result = access_at(0).authenticate(&HeaderMap::new());
        assert_eq!(result, Err(AuthzError::MissingToken));
    }

    #[test]
    fn when_scheme_is_not_bearer_then_authenticate_fails() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic YWRtaW46c2VuaGE="));
        assert_eq!(
            access_at(0).authenticate(&headers),
            Err(AuthzError::MissingToken)
        );
    }

    #[test]
    fn when_token_is_valid_then_identity_is_resolved() {
        let access = access_at(100);
        let issued = access.tokens().issue("admin", Role::Admin).unwrap();

        let identity = access.authenticate(&bearer(&issued.token)).unwrap();
        assert_eq!(identity.user_id, "admin");
        assert_eq!(identity.role, Role::Admin);
    }

    #[test]
    fn when_token_is_expired_then_authenticate_reports_it() {
        let issued = access_at(100).tokens().issue("user1", Role::User).unwrap();
        let result = access_at(160).authenticate(&bearer(&issued.token));
        assert_eq!(result, Err(AuthzError::InvalidToken(TokenError::Expired)));
    }

    #[test]
    fn authorize_is_strict_equality() {
        let admin = Identity {
            user_id: "admin".to_string(),
            role: Role::Admin,
        };
        let user = Identity {
            user_id: "user1".to_string(),
            role: Role::User,
        };

        assert!(authorize(&admin, Role::Admin).is_ok());
        assert!(authorize(&user, Role::User).is_ok());
        assert_eq!(
            authorize(&user, Role::Admin),
            Err(AuthzError::Forbidden {
                required: Role::Admin,
                actual: Role::User
            })
        );
        assert!(authorize(&admin, Role::User).is_err());
    }

    fn protected_app(access: AccessControl) -> Router {
        Router::new()
            .route(
                "/whoami",
                get(|identity: Identity| async move { identity.user_id }),
            )
            .layer(middleware::from_fn_with_state(access, require_token))
    }

    #[tokio::test]
    async fn when_request_has_no_token_then_middleware_returns_401() {
        let response = protected_app(access_at(0))
            .oneshot(HttpRequest::builder().uri("/whoami").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn when_request_has_valid_token_then_handler_sees_identity() {
        let access = access_at(0);
        let issued = access.tokens().issue("user1", Role::User).unwrap();

        let response = protected_app(access)
            .oneshot(
                HttpRequest::builder()
                    .uri("/whoami")
                    .header("authorization", format!("Bearer {}", issued.token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"user1");
    }

    #[tokio::test]
    async fn when_identity_extractor_runs_without_middleware_then_it_rejects() {
        let app = Router::new().route(
            "/whoami",
            get(|identity: Identity| async move { identity.user_id }),
        );

        let response = app
            .oneshot(HttpRequest::builder().uri("/whoami").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
