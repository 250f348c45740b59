use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::{Role, User};
use crate::state::AppState;

use super::{authenticate, bearer_token};

// POST /api/auth/session
#[derive(Deserialize)]
pub struct SessionRequest {
    pub user_id: String,
}

#[derive(Serialize)]
pub struct SessionResponse {
    token: String,
    expires_at: DateTime<Utc>,
    user: User,
}

/// Signs in as any existing user. Refused unless dev mode is on.
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SessionRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    if !state.config.dev_mode {
        return Err(AppError::Forbidden(
            "direct sign-in is only available in dev mode".to_string(),
        ));
    }

    let session = state.auth.sign_in(body.user_id.trim()).await?;
    let user = state.auth.me(&session.id).await?;

    Ok(Json(SessionResponse {
        token: session.id,
        expires_at: session.expires_at,
        user,
    }))
}

// GET /api/auth/me
#[derive(Serialize)]
pub struct MeResponse {
    user: User,
    role: Role,
    provider_id: Option<String>,
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<MeResponse>, AppError> {
    let actor = authenticate(&state, &headers).await?;
    Ok(Json(MeResponse {
        role: actor.role,
        provider_id: actor.provider_id,
        user: actor.user,
    }))
}

// POST /api/auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let token = bearer_token(&headers).ok_or(AppError::Unauthorized)?;
    state.auth.logout(token).await?;
    Ok(Json(serde_json::json!({"ok": true})))
}
