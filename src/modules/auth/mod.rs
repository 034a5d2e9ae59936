//! Login endpoint issuing signed tokens, plus a "who am I" probe.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{rejection::JsonRejection, State},
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shelf_authz::{require_token, AuthContext, Identity, IssuedToken};
use shelf_http::AppError;
use shelf_kernel::{InitCtx, Module};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub user_id: String,
    pub secret: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    /// Expiry as seconds since the Unix epoch.
    pub expires_at: u64,
    pub role: String,
}

pub struct AuthModule {
    auth: AuthContext,
}

impl AuthModule {
    pub fn new(auth: AuthContext) -> Self {
        Self { auth }
    }
}

#[async_trait]
impl Module for AuthModule {
    fn name(&self) -> &'static str {
        "auth"
    }

    async fn init(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            token_ttl_secs = self.auth.tokens().ttl().as_secs(),
            "auth module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        let me: Router = Router::new()
            .route("/me", get(me))
            .route_layer(middleware::from_fn_with_state(
                self.auth.access.clone(),
                require_token,
            ));

        Router::new()
            .route("/login", post(login))
            .with_state(self.auth.clone())
            .merge(me)
    }

    fn openapi(&self) -> Option<Value> {
        Some(json!({
            "paths": {
                "/login": {
                    "post": {
                        "summary": "Exchange credentials for a bearer token",
                        "tags": ["Auth"],
                        "requestBody": {
                            "required": true,
                            "content": {"application/json": {"schema": {"$ref": "#/components/schemas/LoginRequest"}}}
                        },
                        "responses": {
                            "200": {
                                "description": "Signed token",
                                "content": {"application/json": {"schema": {"$ref": "#/components/schemas/LoginResponse"}}}
                            },
                            "401": {
                                "description": "Invalid credentials",
                                "content": {"application/json": {"schema": {"$ref": "#/components/schemas/ErrorResponse"}}}
                            }
                        }
                    }
                },
                "/me": {
                    "get": {
                        "summary": "Identity carried by the bearer token",
                        "tags": ["Auth"],
                        "security": [{"bearerAuth": []}],
                        "responses": {
                            "200": {"description": "Caller identity"},
                            "401": {
                                "description": "Missing or invalid token",
                                "content": {"application/json": {"schema": {"$ref": "#/components/schemas/ErrorResponse"}}}
                            }
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "LoginRequest": {
                        "type": "object",
                        "properties": {
                            "user_id": {"type": "string"},
                            "secret": {"type": "string"}
                        },
                        "required": ["user_id", "secret"]
                    },
                    "LoginResponse": {
                        "type": "object",
                        "properties": {
                            "token": {"type": "string"},
                            "expires_at": {"type": "integer", "format": "int64"},
                            "role": {"type": "string", "enum": ["admin", "user"]}
                        },
                        "required": ["token", "expires_at", "role"]
                    }
                }
            }
        }))
    }
}

async fn login(
    State(auth): State<AuthContext>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AppError> {
    let Json(request) = payload.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;

    let Some(identity) = auth.credentials.verify(&request.user_id, &request.secret) else {
        tracing::info!(user_id = %request.user_id, "login rejected");
        return Err(AppError::unauthorized("invalid credentials"));
    };

    let IssuedToken { token, expires_at } = auth
        .tokens()
        .issue(&identity.user_id, identity.role)
        .map_err(|err| AppError::Internal(anyhow::Error::new(err).context("failed to sign token")))?;

    tracing::info!(user_id = %identity.user_id, role = %identity.role, "login succeeded");
    Ok(Json(LoginResponse {
        token,
        expires_at,
        role: identity.role.to_string(),
    }))
}

async fn me(identity: Identity) -> Json<Identity> {
    Json(identity)
}

pub fn create_module(auth: AuthContext) -> Arc<dyn Module> {
    Arc::new(AuthModule::new(auth))
}
