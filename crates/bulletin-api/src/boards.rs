use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use tracing::{debug, info};

use bulletin_types::api::{
    BoardListResponse, BoardResponse, BoardSaveRequest, BoardSaveResponse, DeleteResponse, ListQuery,
};
use bulletin_types::models::BoardsCode;

use crate::auth::AccessGrant;
use crate::convert::board_response;
use crate::error::ApiError;
use crate::params::{check_len, parse_seq_list};
use crate::state::AppState;

fn validate(req: &BoardSaveRequest) -> Result<String, ApiError> {
    check_len("title", &req.title, 1, 200)?;
    if req.contents.is_empty() {
        return Err(ApiError::validation("contents must not be empty"));
    }
    if !req.add_fields.is_object() {
        return Err(ApiError::validation("add_fields must be a JSON object"));
    }
    Ok(req.add_fields.to_string())
}

/// Paginated list. Anonymous access is allowed; a valid access token only
/// adds the caller to the log.
pub async fn list_boards(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    Query(q): Query<ListQuery>,
) -> Result<Json<BoardListResponse>, ApiError> {
    if let Some(TypedHeader(Authorization(bearer))) = auth {
        match state.auth.verify_access(bearer.token()) {
            Ok(identity) => debug!("Board list accessed by '{}'", identity.user_id),
            Err(e) => debug!("Board list accessed with unusable token: {}", e),
        }
    }

    list(&state, None, q)
}

pub async fn list_boards_by_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(q): Query<ListQuery>,
) -> Result<Json<BoardListResponse>, ApiError> {
    let code: BoardsCode = code.parse().map_err(|e| ApiError::validation(format!("{e}")))?;
    list(&state, Some(code), q)
}

fn list(state: &AppState, code: Option<BoardsCode>, q: ListQuery) -> Result<Json<BoardListResponse>, ApiError> {
    let (rows, total) = state
        .db
        .list_boards(code.map(|c| c.as_str()), q.start_row, q.row_per_page)?;
    let board_list = rows
        .into_iter()
        .map(|row| board_response(row, false))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(BoardListResponse {
        totalcount: total,
        board_list,
    }))
}

pub async fn get_boards_by_seqs(
    State(state): State<AppState>,
    Path(seqs): Path<String>,
) -> Result<Json<Vec<BoardResponse>>, ApiError> {
    let seqs = parse_seq_list(&seqs)?;
    let boards = state
        .db
        .get_boards_by_seqs(&seqs)?
        .into_iter()
        .map(|row| board_response(row, false))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(boards))
}

pub async fn get_board(
    State(state): State<AppState>,
    Path(seq): Path<i64>,
) -> Result<Json<BoardResponse>, ApiError> {
    let row = state.db.get_board(seq)?.ok_or(ApiError::BoardNotFound(seq))?;
    Ok(Json(board_response(row, true)?))
}

pub async fn create_board(
    State(state): State<AppState>,
    Extension(grant): Extension<AccessGrant>,
    Json(req): Json<BoardSaveRequest>,
) -> Result<(StatusCode, Json<BoardSaveResponse>), ApiError> {
    let add_fields = validate(&req)?;

    let board_seq = state.db.insert_board(
        req.boards_code.as_str(),
        &req.title,
        &req.contents,
        &add_fields,
        &grant.identity.user_id,
    )?;

    info!("Board {} ({}) created by '{}'", board_seq, req.boards_code, grant.identity.user_id);
    Ok((
        StatusCode::CREATED,
        Json(BoardSaveResponse {
            result: "success".into(),
            board_seq,
        }),
    ))
}

pub async fn update_board(
    State(state): State<AppState>,
    Extension(grant): Extension<AccessGrant>,
    Path(seq): Path<i64>,
    Json(req): Json<BoardSaveRequest>,
) -> Result<Json<BoardResponse>, ApiError> {
    let add_fields = validate(&req)?;

    let updated = state.db.update_board(
        seq,
        req.boards_code.as_str(),
        &req.title,
        &req.contents,
        &add_fields,
        &grant.identity.user_id,
    )?;
    if updated == 0 {
        return Err(ApiError::BoardNotFound(seq));
    }

    let row = state.db.get_board(seq)?.ok_or(ApiError::BoardNotFound(seq))?;
    debug!("Board {} updated by '{}'", seq, grant.identity.user_id);
    Ok(Json(board_response(row, true)?))
}

pub async fn delete_board(
    State(state): State<AppState>,
    Extension(grant): Extension<AccessGrant>,
    Path(seq): Path<i64>,
) -> Result<Json<DeleteResponse>, ApiError> {
    delete_with_files(state, grant, vec![seq]).await
}

pub async fn delete_boards(
    State(state): State<AppState>,
    Extension(grant): Extension<AccessGrant>,
    Path(seqs): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let seqs = parse_seq_list(&seqs)?;
    delete_with_files(state, grant, seqs).await
}

/// Each board loses its attachments first, then its row, under the board lock.
async fn delete_with_files(
    state: AppState,
    grant: AccessGrant,
    seqs: Vec<i64>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let Some(&first) = seqs.first() else {
        return Err(ApiError::validation("at least one seq is required"));
    };
    let task_seqs = seqs.clone();
    let deleted_count = tokio::task::spawn_blocking(move || -> Result<usize, ApiError> {
        let mut deleted = 0;
        for &seq in &task_seqs {
            if state.files.delete_board(seq)? {
                deleted += 1;
            }
        }
        Ok(deleted)
    })
    .await??;

    if deleted_count == 0 {
        return Err(ApiError::BoardNotFound(first));
    }

    info!("Deleted {} board(s) {:?} by '{}'", deleted_count, seqs, grant.identity.user_id);
    Ok(Json(DeleteResponse {
        result: "success".into(),
        deleted_count,
    }))
}
