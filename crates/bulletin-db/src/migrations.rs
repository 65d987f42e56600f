use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (users, boards, files)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                seq             INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id         TEXT NOT NULL UNIQUE,
                password_hash   TEXT NOT NULL,
                user_name       TEXT NOT NULL,
                role            TEXT NOT NULL,
                created_at      TEXT NOT NULL DEFAULT (datetime('now')),
                modified_at     TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE boards (
                seq             INTEGER PRIMARY KEY AUTOINCREMENT,
                boards_code     TEXT NOT NULL,
                title           TEXT NOT NULL,
                contents        TEXT NOT NULL,
                add_fields      TEXT NOT NULL DEFAULT '{}',
                created_at      TEXT NOT NULL DEFAULT (datetime('now')),
                created_by      TEXT NOT NULL,
                modified_at     TEXT NOT NULL DEFAULT (datetime('now')),
                modified_by     TEXT NOT NULL
            );

            CREATE INDEX idx_boards_code
                ON boards(boards_code, created_at);

            CREATE TABLE files (
                seq             INTEGER PRIMARY KEY AUTOINCREMENT,
                board_seq       INTEGER NOT NULL REFERENCES boards(seq),
                dir             TEXT NOT NULL,
                name            TEXT NOT NULL,
                org_name        TEXT NOT NULL,
                created_at      TEXT NOT NULL DEFAULT (datetime('now')),
                created_by      TEXT NOT NULL
            );

            CREATE INDEX idx_files_board
                ON files(board_seq);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
