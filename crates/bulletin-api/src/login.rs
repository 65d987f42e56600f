use axum::{Extension, Json, extract::State, http::HeaderMap};
use tracing::debug;

use bulletin_types::api::{AccessTokenResponse, LoginRequest, MeResponse, TokenPair};

use crate::auth::AccessGrant;
use crate::error::ApiError;
use crate::middleware::bearer_token;
use crate::state::AppState;

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    if req.user_id.is_empty() || req.password.is_empty() {
        return Err(ApiError::validation("user_id and password are required"));
    }

    // Argon2 verification is CPU-bound.
    let pair = tokio::task::spawn_blocking(move || state.auth.authenticate(&req.user_id, &req.password))
        .await??;
    Ok(Json(pair))
}

/// Exchange the bearer refresh token for a new access token.
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<AccessTokenResponse>, ApiError> {
    let token = bearer_token(&headers)?;
    Ok(Json(state.auth.refresh(token)?))
}

pub async fn me(Extension(grant): Extension<AccessGrant>) -> Json<MeResponse> {
    debug!("Identity lookup by '{}'", grant.identity.user_id);
    Json(MeResponse {
        current_user: grant.identity.into(),
        claims: grant.claims,
    })
}
