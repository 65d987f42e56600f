use std::fs;
use std::sync::Arc;

use bulletin_api::ApiError;
use bulletin_api::config::UploadConfig;
use bulletin_api::reconcile::{AttachmentDescriptor, FileReconciler};
use bulletin_api::storage::Storage;
use bulletin_db::Database;
use bulletin_db::models::FileRow;

struct Fixture {
    _root: tempfile::TempDir,
    db: Arc<Database>,
    storage: Arc<Storage>,
    files: FileReconciler,
    board: i64,
}

fn fixture() -> Fixture {
    let root = tempfile::tempdir().unwrap();
    let upload = UploadConfig {
        home: root.path().join("static"),
        tmp_dir: "tmp".into(),
        file_dir: "upload".into(),
        max_upload_bytes: 1024 * 1024,
    };

    let db = Arc::new(Database::open_in_memory().unwrap());
    let storage = Arc::new(Storage::new(upload.home.clone()).unwrap());
    storage.ensure_dir("tmp").unwrap();
    let files = FileReconciler::new(db.clone(), storage.clone(), &upload);
    let board = db.insert_board("POST", "title", "contents", "{}", "alice01").unwrap();

    Fixture {
        _root: root,
        db,
        storage,
        files,
        board,
    }
}

impl Fixture {
    /// Put a file into the holding directory as an upload would.
    fn stage(&self, name: &str, body: &str) -> AttachmentDescriptor {
        fs::write(self.storage.path("tmp", name), body).unwrap();
        AttachmentDescriptor::new_upload(&format!("orig-{name}"), "tmp", name)
    }

    fn attach(&self, names: &[&str]) -> Vec<FileRow> {
        let submitted: Vec<_> = names.iter().map(|n| self.stage(n, n)).collect();
        self.files.reconcile(self.board, &submitted, "alice01").unwrap()
    }

    fn kept(row: &FileRow) -> AttachmentDescriptor {
        AttachmentDescriptor::existing(row.seq, &row.org_name, &row.dir, &row.name)
    }

    fn permanent_files(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.storage.path("upload", ""))
            .map(|entries| {
                entries
                    .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}

#[test]
fn new_uploads_are_moved_and_recorded() {
    let f = fixture();
    let rows = f.attach(&["a1.txt", "b2.txt"]);

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].dir, "upload");
    assert_eq!(rows[0].name, "a1.txt");
    assert_eq!(rows[0].org_name, "orig-a1.txt");
    assert_eq!(rows[0].created_by, "alice01");
    assert_eq!(f.permanent_files(), vec!["a1.txt", "b2.txt"]);
    assert!(!f.storage.exists("tmp", "a1.txt"));
}

#[test]
fn empty_submission_clears_board_and_is_idempotent() {
    let f = fixture();
    f.attach(&["a1.txt", "b2.txt", "c3.txt"]);

    assert!(f.files.reconcile(f.board, &[], "alice01").unwrap().is_empty());
    assert!(f.db.list_files(f.board).unwrap().is_empty());
    assert!(f.permanent_files().is_empty());

    assert!(f.files.reconcile(f.board, &[], "alice01").unwrap().is_empty());
    f.files.clear(f.board).unwrap();
}

#[test]
fn same_directory_is_retained_untouched() {
    let f = fixture();
    let before = f.attach(&["a1.txt"]);

    let after = f.files.reconcile(f.board, &[Fixture::kept(&before[0])], "bob0001").unwrap();
    assert_eq!(after, before);
    assert_eq!(f.permanent_files(), vec!["a1.txt"]);
}

#[test]
fn new_only_submission_replaces_existing_set() {
    let f = fixture();
    let before = f.attach(&["old1.txt", "old2.txt"]);

    let fresh = f.stage("a.txt", "hello");
    let after = f.files.reconcile(f.board, &[fresh], "alice01").unwrap();

    assert_eq!(after.len(), 1);
    assert_eq!(after[0].org_name, "orig-a.txt");
    assert!(before.iter().all(|old| old.seq != after[0].seq));
    assert_eq!(f.permanent_files(), vec!["a.txt"]);
    assert_eq!(fs::read_to_string(f.storage.path("upload", "a.txt")).unwrap(), "hello");
}

#[test]
fn replacement_updates_row_in_place() {
    let f = fixture();
    let before = f.attach(&["old.txt", "keep.txt"]);

    fs::write(f.storage.path("tmp", "new.txt"), "v2").unwrap();
    let replacement = AttachmentDescriptor::existing(before[0].seq, "report-v2.txt", "tmp", "new.txt");
    let after = f
        .files
        .reconcile(f.board, &[replacement, Fixture::kept(&before[1])], "bob0001")
        .unwrap();

    assert_eq!(after.len(), 2);
    assert_eq!(after[0].seq, before[0].seq);
    assert_eq!(after[0].dir, "upload");
    assert_eq!(after[0].name, "new.txt");
    assert_eq!(after[0].org_name, "report-v2.txt");
    assert_eq!(after[0].created_by, "bob0001");
    assert_eq!(after[1], before[1]);
    assert_eq!(f.permanent_files(), vec!["keep.txt", "new.txt"]);
}

#[test]
fn unlisted_rows_are_deleted() {
    let f = fixture();
    let before = f.attach(&["a1.txt", "b2.txt", "c3.txt"]);

    let after = f.files.reconcile(f.board, &[Fixture::kept(&before[1])], "alice01").unwrap();
    assert_eq!(after, vec![before[1].clone()]);
    assert_eq!(f.permanent_files(), vec!["b2.txt"]);
}

#[test]
fn missing_source_fails_before_any_change() {
    let f = fixture();
    let before = f.attach(&["a1.txt"]);

    let ghost = AttachmentDescriptor::new_upload("ghost.txt", "tmp", "ghost.txt");
    let err = f.files.reconcile(f.board, &[ghost], "alice01").unwrap_err();

    assert!(matches!(err, ApiError::SourceFileMissing(_)));
    assert_eq!(f.db.list_files(f.board).unwrap(), before);
    assert_eq!(f.permanent_files(), vec!["a1.txt"]);
}

#[test]
fn replayed_submission_surfaces_missing_source() {
    let f = fixture();
    let upload = f.stage("a1.txt", "x");

    f.files.reconcile(f.board, &[upload.clone()], "alice01").unwrap();
    let err = f.files.reconcile(f.board, &[upload], "alice01").unwrap_err();
    assert!(matches!(err, ApiError::SourceFileMissing(_)));
    assert_eq!(f.db.list_files(f.board).unwrap().len(), 1);
}

#[test]
fn new_entry_without_original_name_is_skipped() {
    let f = fixture();
    let mut nameless = f.stage("n1.txt", "x");
    nameless.original_name.clear();

    let rows = f.files.reconcile(f.board, &[nameless], "alice01").unwrap();
    assert!(rows.is_empty());
    assert!(f.storage.exists("tmp", "n1.txt"));
}

#[test]
fn foreign_seq_is_ignored() {
    let f = fixture();
    let other = f.db.insert_board("FAQ", "other", "contents", "{}", "alice01").unwrap();
    fs::write(f.storage.path("tmp", "theirs.txt"), "x").unwrap();
    let theirs = f
        .files
        .reconcile(
            other,
            &[AttachmentDescriptor::new_upload("theirs.txt", "tmp", "theirs.txt")],
            "alice01",
        )
        .unwrap();

    let mine = f.attach(&["mine.txt"]);
    let rows = f
        .files
        .reconcile(f.board, &[Fixture::kept(&mine[0]), Fixture::kept(&theirs[0])], "alice01")
        .unwrap();

    assert_eq!(rows, mine);
    assert_eq!(f.db.list_files(other).unwrap(), theirs);
}

#[test]
fn moves_only_from_holding_directory() {
    let f = fixture();
    f.storage.ensure_dir("elsewhere").unwrap();
    fs::write(f.storage.path("elsewhere", "x.txt"), "x").unwrap();

    let err = f
        .files
        .reconcile(
            f.board,
            &[AttachmentDescriptor::new_upload("x.txt", "elsewhere", "x.txt")],
            "alice01",
        )
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
    assert!(f.storage.exists("elsewhere", "x.txt"));
}

#[test]
fn file_already_gone_is_not_an_error() {
    let f = fixture();
    let rows = f.attach(&["a1.txt"]);
    fs::remove_file(f.storage.path("upload", &rows[0].name)).unwrap();

    f.files.clear(f.board).unwrap();
    assert!(f.db.list_files(f.board).unwrap().is_empty());
}

#[test]
fn same_board_reconciles_do_not_interleave() {
    let f = fixture();
    let first = f.stage("one.txt", "1");
    let second = f.stage("two.txt", "2");

    std::thread::scope(|s| {
        let a = s.spawn(|| f.files.reconcile(f.board, &[first], "alice01"));
        let b = s.spawn(|| f.files.reconcile(f.board, &[second], "bob0001"));
        a.join().unwrap().unwrap();
        b.join().unwrap().unwrap();
    });

    // Whichever ran second dropped the other's attachment.
    let rows = f.db.list_files(f.board).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(f.permanent_files(), vec![rows[0].name.clone()]);
}

fn reject_file_writes(db: &Database, op: &str) {
    let sql = format!("CREATE TRIGGER reject_{op} BEFORE {op} ON files BEGIN SELECT RAISE(ABORT, 'files are read-only'); END;");
    db.with_conn(|conn| {
        conn.execute_batch(&sql)?;
        Ok(())
    })
    .unwrap();
}

#[test]
fn deleted_board_leaves_upload_in_holding() {
    let f = fixture();
    f.db.delete_boards(&[f.board]).unwrap();

    let late = f.stage("late.txt", "x");
    let err = f.files.reconcile(f.board, &[late], "alice01").unwrap_err();

    assert!(matches!(err, ApiError::BoardNotFound(seq) if seq == f.board));
    assert!(f.storage.exists("tmp", "late.txt"));
    assert!(f.permanent_files().is_empty());
    assert!(f.db.list_files(f.board).unwrap().is_empty());
}

#[test]
fn delete_board_takes_attachments_with_it() {
    let f = fixture();
    f.attach(&["a1.txt", "b2.txt"]);

    assert!(f.files.delete_board(f.board).unwrap());
    assert!(f.db.get_board(f.board).unwrap().is_none());
    assert!(f.db.list_files(f.board).unwrap().is_empty());
    assert!(f.permanent_files().is_empty());

    assert!(!f.files.delete_board(f.board).unwrap());
}

#[test]
fn delete_board_and_reconcile_never_orphan_a_file() {
    let f = fixture();
    let late = f.stage("late.txt", "x");

    std::thread::scope(|s| {
        let save = s.spawn(|| f.files.reconcile(f.board, &[late], "alice01"));
        let delete = s.spawn(|| f.files.delete_board(f.board));

        assert!(delete.join().unwrap().unwrap());
        match save.join().unwrap() {
            Ok(rows) => assert_eq!(rows.len(), 1),
            Err(ApiError::BoardNotFound(_)) => assert!(f.storage.exists("tmp", "late.txt")),
            Err(e) => panic!("unexpected error: {e}"),
        }
    });

    assert!(f.permanent_files().is_empty());
    assert!(f.db.list_files(f.board).unwrap().is_empty());
}

#[test]
fn failed_insert_removes_moved_file() {
    let f = fixture();
    reject_file_writes(&f.db, "INSERT");

    let fresh = f.stage("a1.txt", "x");
    let err = f.files.reconcile(f.board, &[fresh], "alice01").unwrap_err();

    assert!(matches!(err, ApiError::Storage(_)));
    assert!(f.permanent_files().is_empty());
    assert!(f.db.list_files(f.board).unwrap().is_empty());
}

#[test]
fn failed_update_keeps_old_file_and_drops_new_one() {
    let f = fixture();
    let before = f.attach(&["old.txt"]);
    reject_file_writes(&f.db, "UPDATE");

    fs::write(f.storage.path("tmp", "new.txt"), "v2").unwrap();
    let replacement = AttachmentDescriptor::existing(before[0].seq, "v2.txt", "tmp", "new.txt");
    let err = f.files.reconcile(f.board, &[replacement], "alice01").unwrap_err();

    assert!(matches!(err, ApiError::Storage(_)));
    assert_eq!(f.db.list_files(f.board).unwrap(), before);
    assert_eq!(f.permanent_files(), vec!["old.txt"]);
}
