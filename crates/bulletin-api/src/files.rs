use std::path::Path as FsPath;

use axum::{
    Extension, Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
};
use tracing::{debug, info};
use uuid::Uuid;

use bulletin_types::api::{FileListResponse, FileSaveRequest, FileUploadResponse, UploadedFile};

use crate::auth::AccessGrant;
use crate::convert::file_response;
use crate::error::ApiError;
use crate::reconcile::parse_descriptors;
use crate::state::AppState;

/// The final path component of a client-supplied file name.
fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or_default()
}

/// `<uuid-hex>.<ext>`, or just the hex when the original has no extension.
fn holding_name(original: &str) -> String {
    let stem = Uuid::new_v4().simple().to_string();
    match FsPath::new(original).extension().and_then(|e| e.to_str()) {
        Some(ext) if !ext.is_empty() => format!("{stem}.{ext}"),
        _ => stem,
    }
}

/// POST /boards/upload: store every `file` part in the holding directory.
pub async fn upload(
    State(state): State<AppState>,
    Extension(grant): Extension<AccessGrant>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<FileUploadResponse>), ApiError> {
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let org_name = base_name(field.file_name().unwrap_or_default()).to_string();
        if org_name.is_empty() || org_name == "." || org_name == ".." {
            return Err(ApiError::validation("file part has no file name"));
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::validation(format!("failed to read upload: {e}")))?;

        let tmp_name = holding_name(&org_name);
        state
            .storage
            .save_temp(&state.upload.tmp_dir, &tmp_name, &bytes)
            .await?;
        debug!("Stored upload '{}' as {} ({} bytes)", org_name, tmp_name, bytes.len());

        files.push(UploadedFile {
            file_org_name: org_name,
            file_tmp_dir: state.upload.tmp_dir.clone(),
            file_tmp_name: tmp_name,
        });
    }

    if files.is_empty() {
        return Err(ApiError::validation("no file part in request"));
    }

    info!("User '{}' uploaded {} file(s)", grant.identity.user_id, files.len());
    Ok((
        StatusCode::CREATED,
        Json(FileUploadResponse {
            result: "success".into(),
            files,
        }),
    ))
}

pub async fn list_files(
    State(state): State<AppState>,
    Path(board_seq): Path<i64>,
) -> Result<Json<FileListResponse>, ApiError> {
    if state.db.get_board(board_seq)?.is_none() {
        return Err(ApiError::BoardNotFound(board_seq));
    }

    let file_list = state
        .db
        .list_files(board_seq)?
        .into_iter()
        .map(file_response)
        .collect();
    Ok(Json(FileListResponse { board_seq, file_list }))
}

/// POST /boards/{seq}/files: make the board's attachments match the list.
pub async fn save_files(
    State(state): State<AppState>,
    Extension(grant): Extension<AccessGrant>,
    Path(board_seq): Path<i64>,
    Json(req): Json<FileSaveRequest>,
) -> Result<Json<FileListResponse>, ApiError> {
    if state.db.get_board(board_seq)?.is_none() {
        return Err(ApiError::BoardNotFound(board_seq));
    }
    let descriptors = parse_descriptors(&req.file_list)?;

    let author = grant.identity.user_id;
    let rows = tokio::task::spawn_blocking(move || state.files.reconcile(board_seq, &descriptors, &author))
        .await??;

    Ok(Json(FileListResponse {
        board_seq,
        file_list: rows.into_iter().map(file_response).collect(),
    }))
}
