use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{BoardsCode, Identity, Role, UnknownVariant};

// -- JWT Claims --

/// Distinguishes access tokens from refresh tokens. Checked on every decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Access => f.write_str("access"),
            TokenKind::Refresh => f.write_str("refresh"),
        }
    }
}

/// Claims carried by both token kinds.
///
/// `sub` is the user seq, `aud` the role name. Access tokens also carry the
/// identity as it was at issuance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
    pub kind: TokenKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
}

impl Claims {
    /// The role named by the audience claim. Unknown names are an error, never
    /// a silent downgrade.
    pub fn role(&self) -> Result<Role, UnknownVariant> {
        self.aud.parse()
    }
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub user_id: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub current_user: UserResponse,
    pub claims: Claims,
}

// -- Paging --

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub start_row: u32,
    #[serde(default = "default_row_per_page")]
    pub row_per_page: u32,
}

fn default_row_per_page() -> u32 {
    10
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub result: String,
    pub deleted_count: usize,
}

// -- Users --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserSaveRequest {
    pub user_id: String,
    pub password: String,
    pub user_name: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub user_seq: i64,
    pub user_id: String,
    pub user_name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl From<Identity> for UserResponse {
    fn from(identity: Identity) -> Self {
        Self {
            user_seq: identity.seq,
            user_id: identity.user_id,
            user_name: identity.user_name,
            role: identity.role,
            created_at: identity.created_at,
            modified_at: identity.modified_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub totalcount: i64,
    pub user_list: Vec<UserResponse>,
}

#[derive(Debug, Serialize)]
pub struct UserSaveResponse {
    pub result: String,
    pub user_seq: i64,
}

// -- Boards --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoardSaveRequest {
    pub boards_code: BoardsCode,
    pub title: String,
    pub contents: String,
    #[serde(default = "empty_object")]
    pub add_fields: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardResponse {
    pub board_seq: i64,
    pub boards_code: BoardsCode,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contents: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub add_fields: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub modified_at: DateTime<Utc>,
    pub modified_by: String,
}

#[derive(Debug, Serialize)]
pub struct BoardListResponse {
    pub totalcount: i64,
    pub board_list: Vec<BoardResponse>,
}

#[derive(Debug, Serialize)]
pub struct BoardSaveResponse {
    pub result: String,
    pub board_seq: i64,
}

// -- Board files --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedFile {
    pub file_org_name: String,
    pub file_tmp_dir: String,
    pub file_tmp_name: String,
}

#[derive(Debug, Serialize)]
pub struct FileUploadResponse {
    pub result: String,
    pub files: Vec<UploadedFile>,
}

/// One entry of the submitted attachment list. `file_seq` is empty for a
/// file that has not been persisted yet.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileDescriptor {
    #[serde(default)]
    pub file_seq: String,
    #[serde(default)]
    pub file_org_name: String,
    pub file_tmp_name: String,
    pub file_tmp_dir: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSaveRequest {
    #[serde(default)]
    pub file_list: Vec<FileDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileResponse {
    pub file_seq: i64,
    pub board_seq: i64,
    pub file_dir: String,
    pub file_name: String,
    pub file_org_name: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

#[derive(Debug, Serialize)]
pub struct FileListResponse {
    pub board_seq: i64,
    pub file_list: Vec<FileResponse>,
}

// -- Errors --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub timestamp: DateTime<Utc>,
    pub status: u16,
    pub error: String,
    pub message: String,
    pub path: String,
}
