use crate::models::{BoardRow, FileRow, UserRow};
use crate::Database;
use anyhow::Result;
use rusqlite::{Row, params, params_from_iter};

const USER_COLUMNS: &str = "seq, user_id, password_hash, user_name, role, created_at, modified_at";
const BOARD_COLUMNS: &str =
    "seq, boards_code, title, contents, add_fields, created_at, created_by, modified_at, modified_by";
const FILE_COLUMNS: &str = "seq, board_seq, dir, name, org_name, created_at, created_by";

impl Database {
    // -- Users --

    pub fn get_user_by_user_id(&self, user_id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?1");
            conn.query_row(&sql, [user_id], user_from_row).optional()
        })
    }

    pub fn get_user_by_seq(&self, seq: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE seq = ?1");
            conn.query_row(&sql, [seq], user_from_row).optional()
        })
    }

    /// Page of users, newest first, plus the total matching `role`.
    pub fn list_users(
        &self,
        role: Option<&str>,
        start_row: u32,
        row_per_page: u32,
    ) -> Result<(Vec<UserRow>, i64)> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE (?1 IS NULL OR role = ?1)
                 ORDER BY created_at DESC, seq DESC
                 LIMIT ?2 OFFSET ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![role, row_per_page, start_row], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM users WHERE (?1 IS NULL OR role = ?1)",
                [role],
                |r| r.get(0),
            )?;

            Ok((rows, total))
        })
    }

    pub fn get_users_by_seqs(&self, seqs: &[i64]) -> Result<Vec<UserRow>> {
        if seqs.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users WHERE seq IN ({}) ORDER BY created_at DESC, seq DESC",
                placeholders(seqs.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(seqs.iter()), user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Number of users with `role`, restricted to `seqs` when non-empty.
    pub fn count_users_with_role(&self, role: &str, seqs: &[i64]) -> Result<i64> {
        self.with_conn(|conn| {
            if seqs.is_empty() {
                let count = conn.query_row("SELECT COUNT(*) FROM users WHERE role = ?1", [role], |r| {
                    r.get(0)
                })?;
                return Ok(count);
            }

            // ?1 is the role, seqs follow from ?2
            let sql = format!(
                "SELECT COUNT(*) FROM users WHERE role = ?1 AND seq IN ({})",
                (2..=seqs.len() + 1).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ")
            );
            let mut values: Vec<rusqlite::types::Value> = Vec::with_capacity(seqs.len() + 1);
            values.push(role.to_string().into());
            values.extend(seqs.iter().map(|s| rusqlite::types::Value::from(*s)));

            let count = conn.query_row(&sql, params_from_iter(values.iter()), |r| r.get(0))?;
            Ok(count)
        })
    }

    pub fn insert_user(
        &self,
        user_id: &str,
        password_hash: &str,
        user_name: &str,
        role: &str,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (user_id, password_hash, user_name, role) VALUES (?1, ?2, ?3, ?4)",
                (user_id, password_hash, user_name, role),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Updates the mutable profile fields. The role column is never touched.
    pub fn update_user(
        &self,
        seq: i64,
        user_id: &str,
        password_hash: &str,
        user_name: &str,
    ) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE users SET user_id = ?1, password_hash = ?2, user_name = ?3, modified_at = datetime('now')
                 WHERE seq = ?4",
                params![user_id, password_hash, user_name, seq],
            )?;
            Ok(n)
        })
    }

    /// Stamps `modified_at`, used as the last-login time.
    pub fn touch_user(&self, seq: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute("UPDATE users SET modified_at = datetime('now') WHERE seq = ?1", [seq])?;
            Ok(n)
        })
    }

    pub fn delete_users(&self, seqs: &[i64]) -> Result<usize> {
        if seqs.is_empty() {
            return Ok(0);
        }

        self.with_conn(|conn| {
            let sql = format!("DELETE FROM users WHERE seq IN ({})", placeholders(seqs.len()));
            let n = conn.execute(&sql, params_from_iter(seqs.iter()))?;
            Ok(n)
        })
    }

    /// Inserts the administrator unless a user with `role` already exists.
    /// Returns whether a row was inserted.
    pub fn seed_user_if_role_missing(
        &self,
        user_id: &str,
        password_hash: &str,
        user_name: &str,
        role: &str,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let existing: i64 =
                tx.query_row("SELECT COUNT(*) FROM users WHERE role = ?1", [role], |r| r.get(0))?;
            if existing > 0 {
                return Ok(false);
            }
            tx.execute(
                "INSERT INTO users (user_id, password_hash, user_name, role) VALUES (?1, ?2, ?3, ?4)",
                (user_id, password_hash, user_name, role),
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    // -- Boards --

    /// Page of boards, newest first, plus the total matching `boards_code`.
    pub fn list_boards(
        &self,
        boards_code: Option<&str>,
        start_row: u32,
        row_per_page: u32,
    ) -> Result<(Vec<BoardRow>, i64)> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {BOARD_COLUMNS} FROM boards
                 WHERE (?1 IS NULL OR boards_code = ?1)
                 ORDER BY created_at DESC, seq DESC
                 LIMIT ?2 OFFSET ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![boards_code, row_per_page, start_row], board_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM boards WHERE (?1 IS NULL OR boards_code = ?1)",
                [boards_code],
                |r| r.get(0),
            )?;

            Ok((rows, total))
        })
    }

    pub fn get_boards_by_seqs(&self, seqs: &[i64]) -> Result<Vec<BoardRow>> {
        if seqs.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {BOARD_COLUMNS} FROM boards WHERE seq IN ({}) ORDER BY created_at DESC, seq DESC",
                placeholders(seqs.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(seqs.iter()), board_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_board(&self, seq: i64) -> Result<Option<BoardRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {BOARD_COLUMNS} FROM boards WHERE seq = ?1");
            conn.query_row(&sql, [seq], board_from_row).optional()
        })
    }

    pub fn insert_board(
        &self,
        boards_code: &str,
        title: &str,
        contents: &str,
        add_fields: &str,
        user_id: &str,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO boards (boards_code, title, contents, add_fields, created_by, modified_by)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                (boards_code, title, contents, add_fields, user_id),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn update_board(
        &self,
        seq: i64,
        boards_code: &str,
        title: &str,
        contents: &str,
        add_fields: &str,
        user_id: &str,
    ) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE boards SET boards_code = ?1, title = ?2, contents = ?3, add_fields = ?4,
                        modified_by = ?5, modified_at = datetime('now')
                 WHERE seq = ?6",
                params![boards_code, title, contents, add_fields, user_id, seq],
            )?;
            Ok(n)
        })
    }

    pub fn delete_boards(&self, seqs: &[i64]) -> Result<usize> {
        if seqs.is_empty() {
            return Ok(0);
        }

        self.with_conn(|conn| {
            let sql = format!("DELETE FROM boards WHERE seq IN ({})", placeholders(seqs.len()));
            let n = conn.execute(&sql, params_from_iter(seqs.iter()))?;
            Ok(n)
        })
    }

    // -- Files --

    pub fn list_files(&self, board_seq: i64) -> Result<Vec<FileRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {FILE_COLUMNS} FROM files WHERE board_seq = ?1 ORDER BY seq");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([board_seq], file_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_file(&self, seq: i64) -> Result<Option<FileRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {FILE_COLUMNS} FROM files WHERE seq = ?1");
            conn.query_row(&sql, [seq], file_from_row).optional()
        })
    }

    pub fn insert_file(
        &self,
        board_seq: i64,
        dir: &str,
        name: &str,
        org_name: &str,
        user_id: &str,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO files (board_seq, dir, name, org_name, created_by) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![board_seq, dir, name, org_name, user_id],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Points an attachment at a replacement file and re-stamps it.
    pub fn update_file(
        &self,
        seq: i64,
        dir: &str,
        name: &str,
        org_name: &str,
        user_id: &str,
    ) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE files SET dir = ?1, name = ?2, org_name = ?3, created_by = ?4, created_at = datetime('now')
                 WHERE seq = ?5",
                params![dir, name, org_name, user_id, seq],
            )?;
            Ok(n)
        })
    }

    pub fn delete_file(&self, seq: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM files WHERE seq = ?1", [seq])?;
            Ok(n)
        })
    }
}

fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ")
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        seq: row.get(0)?,
        user_id: row.get(1)?,
        password_hash: row.get(2)?,
        user_name: row.get(3)?,
        role: row.get(4)?,
        created_at: row.get(5)?,
        modified_at: row.get(6)?,
    })
}

fn board_from_row(row: &Row<'_>) -> rusqlite::Result<BoardRow> {
    Ok(BoardRow {
        seq: row.get(0)?,
        boards_code: row.get(1)?,
        title: row.get(2)?,
        contents: row.get(3)?,
        add_fields: row.get(4)?,
        created_at: row.get(5)?,
        created_by: row.get(6)?,
        modified_at: row.get(7)?,
        modified_by: row.get(8)?,
    })
}

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<FileRow> {
    Ok(FileRow {
        seq: row.get(0)?,
        board_seq: row.get(1)?,
        dir: row.get(2)?,
        name: row.get(3)?,
        org_name: row.get(4)?,
        created_at: row.get(5)?,
        created_by: row.get(6)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_with_board() -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        let board = db.insert_board("NOTICE", "hello", "body", "{}", "admin").unwrap();
        (db, board)
    }

    #[test]
    fn user_crud() {
        let db = Database::open_in_memory().unwrap();
        let seq = db.insert_user("alice", "hash", "Alice", "USER").unwrap();

        let row = db.get_user_by_user_id("alice").unwrap().unwrap();
        assert_eq!(row.seq, seq);
        assert_eq!(row.role, "USER");
        assert!(db.get_user_by_user_id("nobody").unwrap().is_none());

        assert_eq!(db.update_user(seq, "alice2", "hash2", "Alice B").unwrap(), 1);
        let row = db.get_user_by_seq(seq).unwrap().unwrap();
        assert_eq!(row.user_id, "alice2");
        assert_eq!(row.password_hash, "hash2");
        assert_eq!(row.role, "USER");

        assert_eq!(db.touch_user(seq).unwrap(), 1);
        assert_eq!(db.delete_users(&[seq]).unwrap(), 1);
        assert!(db.get_user_by_seq(seq).unwrap().is_none());
    }

    #[test]
    fn duplicate_user_id_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.insert_user("alice", "hash", "Alice", "USER").unwrap();
        assert!(db.insert_user("alice", "hash", "Other", "USER").is_err());
    }

    #[test]
    fn list_users_pages_and_filters() {
        let db = Database::open_in_memory().unwrap();
        for i in 0..5 {
            db.insert_user(&format!("user{i}"), "h", "U", "USER").unwrap();
        }
        db.insert_user("root1", "h", "R", "ADMIN").unwrap();

        let (page, total) = db.list_users(None, 0, 4).unwrap();
        assert_eq!(page.len(), 4);
        assert_eq!(total, 6);

        let (page, total) = db.list_users(None, 4, 4).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(total, 6);

        let (admins, total) = db.list_users(Some("ADMIN"), 0, 10).unwrap();
        assert_eq!(admins.len(), 1);
        assert_eq!(total, 1);
        assert_eq!(admins[0].user_id, "root1");
    }

    #[test]
    fn count_users_with_role_respects_seq_filter() {
        let db = Database::open_in_memory().unwrap();
        let admin = db.insert_user("root1", "h", "R", "ADMIN").unwrap();
        let user = db.insert_user("alice", "h", "A", "USER").unwrap();

        assert_eq!(db.count_users_with_role("ADMIN", &[]).unwrap(), 1);
        assert_eq!(db.count_users_with_role("ADMIN", &[user]).unwrap(), 0);
        assert_eq!(db.count_users_with_role("ADMIN", &[user, admin]).unwrap(), 1);
        assert_eq!(db.get_users_by_seqs(&[user, admin]).unwrap().len(), 2);
    }

    #[test]
    fn seeding_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.seed_user_if_role_missing("admin", "h", "Admin", "ADMIN").unwrap());
        assert!(!db.seed_user_if_role_missing("admin2", "h", "Admin", "ADMIN").unwrap());
        assert_eq!(db.count_users_with_role("ADMIN", &[]).unwrap(), 1);
    }

    #[test]
    fn board_crud_and_filters() {
        let (db, first) = db_with_board();
        let second = db.insert_board("FAQ", "q", "a", r#"{"k":1}"#, "bob").unwrap();

        let (rows, total) = db.list_boards(None, 0, 10).unwrap();
        assert_eq!(total, 2);
        assert_eq!(rows.len(), 2);

        let (rows, total) = db.list_boards(Some("FAQ"), 0, 10).unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].seq, second);
        assert_eq!(rows[0].add_fields, r#"{"k":1}"#);

        assert_eq!(db.update_board(first, "POST", "t2", "c2", "{}", "carol").unwrap(), 1);
        let row = db.get_board(first).unwrap().unwrap();
        assert_eq!(row.title, "t2");
        assert_eq!(row.created_by, "admin");
        assert_eq!(row.modified_by, "carol");

        assert_eq!(db.get_boards_by_seqs(&[first, second, 999]).unwrap().len(), 2);
        assert_eq!(db.delete_boards(&[first, second]).unwrap(), 2);
        assert!(db.get_board(first).unwrap().is_none());
    }

    #[test]
    fn file_crud() {
        let (db, board) = db_with_board();
        let a = db.insert_file(board, "upload", "a1.txt", "a.txt", "alice").unwrap();
        let b = db.insert_file(board, "upload", "b1.txt", "b.txt", "alice").unwrap();

        let rows = db.list_files(board).unwrap();
        assert_eq!(rows.iter().map(|r| r.seq).collect::<Vec<_>>(), vec![a, b]);

        assert_eq!(db.update_file(a, "upload", "a2.txt", "a-v2.txt", "bob").unwrap(), 1);
        let row = db.get_file(a).unwrap().unwrap();
        assert_eq!(row.name, "a2.txt");
        assert_eq!(row.org_name, "a-v2.txt");
        assert_eq!(row.created_by, "bob");

        assert_eq!(db.delete_file(b).unwrap(), 1);
        assert_eq!(db.delete_file(b).unwrap(), 0);
        assert_eq!(db.list_files(board).unwrap().len(), 1);
    }

    #[test]
    fn files_require_an_existing_board() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.insert_file(42, "upload", "x", "x", "alice").is_err());
    }
}
