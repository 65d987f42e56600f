/// Database row types. These map directly to SQLite rows and stay
/// independent of the API types; enums are stored as their text names.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub seq: i64,
    pub user_id: String,
    pub password_hash: String,
    pub user_name: String,
    pub role: String,
    pub created_at: String,
    pub modified_at: String,
}

#[derive(Debug, Clone)]
pub struct BoardRow {
    pub seq: i64,
    pub boards_code: String,
    pub title: String,
    pub contents: String,
    pub add_fields: String,
    pub created_at: String,
    pub created_by: String,
    pub modified_at: String,
    pub modified_by: String,
}

/// An attachment owned by exactly one board. The file lives at
/// `{upload_home}/{dir}/{name}`; `org_name` is the name the client uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRow {
    pub seq: i64,
    pub board_seq: i64,
    pub dir: String,
    pub name: String,
    pub org_name: String,
    pub created_at: String,
    pub created_by: String,
}
