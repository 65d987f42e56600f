//! Row-to-API conversions. Enum columns are validated here; an unknown role
//! or boards code in the database is reported, never defaulted.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

use bulletin_db::models::{BoardRow, FileRow, UserRow};
use bulletin_types::api::{BoardResponse, FileResponse};
use bulletin_types::models::{BoardsCode, Identity, Role};

use crate::error::ApiError;

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
/// Parse as naive UTC and convert.
pub fn parse_timestamp(value: &str) -> DateTime<Utc> {
    value
        .parse::<DateTime<Utc>>()
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc()))
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", value, e);
            DateTime::default()
        })
}

pub fn identity_from_row(row: &UserRow) -> Result<Identity, ApiError> {
    let role: Role = row
        .role
        .parse()
        .map_err(|e| ApiError::validation(format!("user {}: {}", row.seq, e)))?;

    Ok(Identity {
        seq: row.seq,
        user_id: row.user_id.clone(),
        user_name: row.user_name.clone(),
        role,
        created_at: parse_timestamp(&row.created_at),
        modified_at: parse_timestamp(&row.modified_at),
    })
}

/// `detail` includes contents and extra fields; list views leave them out.
pub fn board_response(row: BoardRow, detail: bool) -> Result<BoardResponse, ApiError> {
    let boards_code: BoardsCode = row
        .boards_code
        .parse()
        .map_err(|e| ApiError::validation(format!("board {}: {}", row.seq, e)))?;

    let (contents, add_fields) = if detail {
        let add_fields = serde_json::from_str(&row.add_fields).unwrap_or_else(|e| {
            warn!("Corrupt add_fields on board {}: {}", row.seq, e);
            serde_json::Value::Object(serde_json::Map::new())
        });
        (Some(row.contents), Some(add_fields))
    } else {
        (None, None)
    };

    Ok(BoardResponse {
        board_seq: row.seq,
        boards_code,
        title: row.title,
        contents,
        add_fields,
        created_at: parse_timestamp(&row.created_at),
        created_by: row.created_by,
        modified_at: parse_timestamp(&row.modified_at),
        modified_by: row.modified_by,
    })
}

pub fn file_response(row: FileRow) -> FileResponse {
    FileResponse {
        file_seq: row.seq,
        board_seq: row.board_seq,
        file_dir: row.dir,
        file_name: row.name,
        file_org_name: row.org_name,
        created_at: parse_timestamp(&row.created_at),
        created_by: row.created_by,
    }
}
