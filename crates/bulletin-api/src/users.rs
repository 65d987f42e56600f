use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use tracing::info;

use bulletin_db::models::UserRow;
use bulletin_types::api::{DeleteResponse, ListQuery, UserListResponse, UserResponse, UserSaveRequest, UserSaveResponse};
use bulletin_types::models::Role;

use crate::auth::{AccessGrant, hash_password};
use crate::convert::identity_from_row;
use crate::error::ApiError;
use crate::params::{check_len, parse_seq_list};
use crate::state::AppState;

fn user_responses(rows: &[UserRow]) -> Result<Vec<UserResponse>, ApiError> {
    rows.iter()
        .map(|row| identity_from_row(row).map(UserResponse::from))
        .collect()
}

fn validate(req: &UserSaveRequest) -> Result<(), ApiError> {
    check_len("user_id", &req.user_id, 5, 20)?;
    check_len("password", &req.password, 5, 15)?;
    check_len("user_name", &req.user_name, 2, 50)?;
    Ok(())
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(grant): Extension<AccessGrant>,
    Query(q): Query<ListQuery>,
) -> Result<Json<UserListResponse>, ApiError> {
    grant.require_role(Role::Admin)?;

    let (rows, total) = state.db.list_users(None, q.start_row, q.row_per_page)?;
    Ok(Json(UserListResponse {
        totalcount: total,
        user_list: user_responses(&rows)?,
    }))
}

pub async fn list_users_by_role(
    State(state): State<AppState>,
    Extension(grant): Extension<AccessGrant>,
    Path(role): Path<String>,
    Query(q): Query<ListQuery>,
) -> Result<Json<UserListResponse>, ApiError> {
    grant.require_role(Role::Admin)?;
    let role: Role = role.parse().map_err(|e| ApiError::validation(format!("{e}")))?;

    let (rows, total) = state.db.list_users(Some(role.as_str()), q.start_row, q.row_per_page)?;
    Ok(Json(UserListResponse {
        totalcount: total,
        user_list: user_responses(&rows)?,
    }))
}

pub async fn get_users_by_seqs(
    State(state): State<AppState>,
    Extension(grant): Extension<AccessGrant>,
    Path(seqs): Path<String>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    grant.require_role(Role::Admin)?;
    let seqs = parse_seq_list(&seqs)?;

    let rows = state.db.get_users_by_seqs(&seqs)?;
    Ok(Json(user_responses(&rows)?))
}

/// A USER may read only itself; ADMIN may read anyone.
pub async fn get_user(
    State(state): State<AppState>,
    Extension(grant): Extension<AccessGrant>,
    Path(seq): Path<i64>,
) -> Result<Json<UserResponse>, ApiError> {
    if grant.identity.seq != seq {
        grant.require_role(Role::Admin)?;
    }

    let row = state.db.get_user_by_seq(seq)?.ok_or(ApiError::NotFound("user"))?;
    Ok(Json(identity_from_row(&row)?.into()))
}

pub async fn create_user(
    State(state): State<AppState>,
    Extension(grant): Extension<AccessGrant>,
    Json(req): Json<UserSaveRequest>,
) -> Result<(StatusCode, Json<UserSaveResponse>), ApiError> {
    grant.require_role(Role::Admin)?;
    validate(&req)?;

    if state.db.get_user_by_user_id(&req.user_id)?.is_some() {
        return Err(ApiError::validation(format!("user id '{}' is already taken", req.user_id)));
    }

    let password_hash = hash_password(&req.password)?;
    let user_seq = state
        .db
        .insert_user(&req.user_id, &password_hash, &req.user_name, req.role.as_str())?;

    info!("User '{}' ({}) registered by '{}'", req.user_id, req.role, grant.identity.user_id);
    Ok((
        StatusCode::CREATED,
        Json(UserSaveResponse {
            result: "success".into(),
            user_seq,
        }),
    ))
}

/// Role is immutable here; the submitted role must match the stored one.
pub async fn update_user(
    State(state): State<AppState>,
    Extension(grant): Extension<AccessGrant>,
    Path(seq): Path<i64>,
    Json(req): Json<UserSaveRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    if grant.identity.seq != seq {
        grant.require_role(Role::Admin)?;
    }

    let current = state.db.get_user_by_seq(seq)?.ok_or(ApiError::NotFound("user"))?;
    let current = identity_from_row(&current)?;
    if req.role != current.role {
        return Err(ApiError::Forbidden("role cannot be changed".into()));
    }
    validate(&req)?;

    if req.user_id != current.user_id && state.db.get_user_by_user_id(&req.user_id)?.is_some() {
        return Err(ApiError::validation(format!("user id '{}' is already taken", req.user_id)));
    }

    let password_hash = hash_password(&req.password)?;
    state
        .db
        .update_user(seq, &req.user_id, &password_hash, &req.user_name)?;

    let row = state.db.get_user_by_seq(seq)?.ok_or(ApiError::NotFound("user"))?;
    info!("User {} updated by '{}'", seq, grant.identity.user_id);
    Ok(Json(identity_from_row(&row)?.into()))
}

/// Bulk delete. Refused outright if any selected identity is an ADMIN.
pub async fn delete_users(
    State(state): State<AppState>,
    Extension(grant): Extension<AccessGrant>,
    Path(seqs): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    grant.require_role(Role::Admin)?;
    let seqs = parse_seq_list(&seqs)?;

    if state.db.count_users_with_role(Role::Admin.as_str(), &seqs)? > 0 {
        return Err(ApiError::validation("ADMIN users cannot be deleted"));
    }

    let deleted_count = state.db.delete_users(&seqs)?;
    info!("Deleted {} user(s) by '{}'", deleted_count, grant.identity.user_id);
    Ok(Json(DeleteResponse {
        result: "success".into(),
        deleted_count,
    }))
}
