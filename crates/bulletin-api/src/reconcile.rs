use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use bulletin_db::Database;
use bulletin_db::models::FileRow;
use bulletin_types::api::FileDescriptor;

use crate::config::{UploadConfig, is_plain_component};
use crate::error::ApiError;
use crate::storage::Storage;

const MAX_NAME_LEN: usize = 255;

/// A validated entry of a submitted attachment list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentDescriptor {
    /// `None` for a file that has no row yet.
    pub seq: Option<i64>,
    pub original_name: String,
    pub temp_name: String,
    pub temp_dir: String,
}

impl AttachmentDescriptor {
    pub fn new_upload(original_name: &str, temp_dir: &str, temp_name: &str) -> Self {
        Self {
            seq: None,
            original_name: original_name.to_string(),
            temp_name: temp_name.to_string(),
            temp_dir: temp_dir.to_string(),
        }
    }

    pub fn existing(seq: i64, original_name: &str, dir: &str, name: &str) -> Self {
        Self {
            seq: Some(seq),
            original_name: original_name.to_string(),
            temp_name: name.to_string(),
            temp_dir: dir.to_string(),
        }
    }
}

impl TryFrom<&FileDescriptor> for AttachmentDescriptor {
    type Error = ApiError;

    fn try_from(d: &FileDescriptor) -> Result<Self, Self::Error> {
        let raw_seq = d.file_seq.trim();
        let seq = if raw_seq.is_empty() {
            None
        } else {
            match raw_seq.parse::<i64>() {
                Ok(n) if n > 0 => Some(n),
                _ => {
                    return Err(ApiError::validation(format!(
                        "file_seq must be empty or a positive integer, got {raw_seq:?}"
                    )));
                }
            }
        };

        for (field, value) in [("file_tmp_name", &d.file_tmp_name), ("file_tmp_dir", &d.file_tmp_dir)] {
            if !is_plain_component(value) || value.len() > MAX_NAME_LEN {
                return Err(ApiError::validation(format!("{field} is not a plain file name: {value:?}")));
            }
        }
        if d.file_org_name.len() > MAX_NAME_LEN {
            return Err(ApiError::validation("file_org_name is longer than 255 bytes"));
        }

        Ok(Self {
            seq,
            original_name: d.file_org_name.clone(),
            temp_name: d.file_tmp_name.clone(),
            temp_dir: d.file_tmp_dir.clone(),
        })
    }
}

/// Validate a submitted list. Two entries naming the same attachment are
/// rejected.
pub fn parse_descriptors(list: &[FileDescriptor]) -> Result<Vec<AttachmentDescriptor>, ApiError> {
    let descriptors = list
        .iter()
        .map(AttachmentDescriptor::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    let mut seen = HashSet::new();
    for seq in descriptors.iter().filter_map(|d| d.seq) {
        if !seen.insert(seq) {
            return Err(ApiError::validation(format!("file_seq {seq} submitted twice")));
        }
    }
    Ok(descriptors)
}

/// Brings a board's attachment rows and files in line with a submitted list.
///
/// Runs blocking filesystem and database work; call it from
/// `spawn_blocking`. Calls for the same board are serialized.
pub struct FileReconciler {
    db: Arc<Database>,
    storage: Arc<Storage>,
    tmp_dir: String,
    file_dir: String,
    locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

#[derive(Debug, Default)]
struct Summary {
    added: usize,
    replaced: usize,
    retained: usize,
    deleted: usize,
}

impl FileReconciler {
    pub fn new(db: Arc<Database>, storage: Arc<Storage>, upload: &UploadConfig) -> Self {
        Self {
            db,
            storage,
            tmp_dir: upload.tmp_dir.clone(),
            file_dir: upload.file_dir.clone(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Apply `submitted` to the board and return its resulting rows.
    ///
    /// An empty list deletes every attachment of the board. Work already
    /// applied stays applied if a later step fails.
    pub fn reconcile(
        &self,
        board_seq: i64,
        submitted: &[AttachmentDescriptor],
        author_id: &str,
    ) -> Result<Vec<FileRow>, ApiError> {
        let lock = self.board_lock(board_seq);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        self.check_board(board_seq)?;
        self.apply(board_seq, submitted, author_id)
    }

    /// Delete every attachment of the board, rows and files.
    pub fn clear(&self, board_seq: i64) -> Result<(), ApiError> {
        self.reconcile(board_seq, &[], "").map(|_| ())
    }

    /// Delete the board together with its attachments. Returns false when
    /// the board does not exist.
    ///
    /// The board lock is held across both steps, so no attachment can be
    /// added in between.
    pub fn delete_board(&self, board_seq: i64) -> Result<bool, ApiError> {
        let lock = self.board_lock(board_seq);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        if self.db.get_board(board_seq)?.is_none() {
            return Ok(false);
        }
        self.apply(board_seq, &[], "")?;
        Ok(self.db.delete_boards(&[board_seq])? > 0)
    }

    fn check_board(&self, board_seq: i64) -> Result<(), ApiError> {
        if self.db.get_board(board_seq)?.is_none() {
            return Err(ApiError::BoardNotFound(board_seq));
        }
        Ok(())
    }

    /// Caller holds the board lock and has checked the board exists.
    fn apply(
        &self,
        board_seq: i64,
        submitted: &[AttachmentDescriptor],
        author_id: &str,
    ) -> Result<Vec<FileRow>, ApiError> {
        self.storage.ensure_dir(&self.file_dir)?;
        let existing: BTreeMap<i64, FileRow> = self
            .db
            .list_files(board_seq)?
            .into_iter()
            .map(|row| (row.seq, row))
            .collect();

        if submitted.is_empty() {
            let deleted = self.discard_all(existing.values())?;
            info!("Board {}: cleared {} attachment(s)", board_seq, deleted);
            return Ok(vec![]);
        }

        self.check_moves(&existing, submitted)?;

        let mut summary = Summary::default();
        for desc in submitted {
            match desc.seq {
                Some(seq) => {
                    let Some(row) = existing.get(&seq) else {
                        debug!("Board {}: file {} is not attached here, ignoring", board_seq, seq);
                        continue;
                    };
                    if row.dir == desc.temp_dir {
                        summary.retained += 1;
                        continue;
                    }

                    let replaces_in_place = row.dir == self.file_dir && row.name == desc.temp_name;
                    self.storage.move_file(&desc.temp_dir, &desc.temp_name, &self.file_dir)?;
                    let updated =
                        self.db
                            .update_file(seq, &self.file_dir, &desc.temp_name, &desc.original_name, author_id);
                    if let Err(e) = updated {
                        if !replaces_in_place {
                            self.undo_move(&desc.temp_name);
                        }
                        return Err(e.into());
                    }
                    if !replaces_in_place {
                        self.storage.remove(&row.dir, &row.name)?;
                    }
                    debug!("Board {}: replaced file {} with {}", board_seq, seq, desc.temp_name);
                    summary.replaced += 1;
                }
                None if desc.original_name.is_empty() => {
                    debug!("Board {}: skipping new entry without an original name", board_seq);
                }
                None => {
                    self.storage.move_file(&desc.temp_dir, &desc.temp_name, &self.file_dir)?;
                    let inserted = self.db.insert_file(
                        board_seq,
                        &self.file_dir,
                        &desc.temp_name,
                        &desc.original_name,
                        author_id,
                    );
                    let seq = match inserted {
                        Ok(seq) => seq,
                        Err(e) => {
                            self.undo_move(&desc.temp_name);
                            return Err(e.into());
                        }
                    };
                    debug!("Board {}: attached {} as file {}", board_seq, desc.original_name, seq);
                    summary.added += 1;
                }
            }
        }

        let kept: HashSet<i64> = submitted.iter().filter_map(|d| d.seq).collect();
        summary.deleted = self.discard_all(existing.values().filter(|row| !kept.contains(&row.seq)))?;

        info!(
            "Board {}: {} added, {} replaced, {} retained, {} deleted",
            board_seq, summary.added, summary.replaced, summary.retained, summary.deleted
        );
        Ok(self.db.list_files(board_seq)?)
    }

    /// A file moved into permanent storage whose row could not be written
    /// is deleted again.
    fn undo_move(&self, name: &str) {
        if let Err(e) = self.storage.remove(&self.file_dir, name) {
            warn!("Failed to remove unrecorded file {}/{}: {}", self.file_dir, name, e);
        }
    }

    /// Every entry that needs a move must come from the holding directory,
    /// with a file that is there now, and no two entries may move the same
    /// file.
    fn check_moves(
        &self,
        existing: &BTreeMap<i64, FileRow>,
        submitted: &[AttachmentDescriptor],
    ) -> Result<(), ApiError> {
        let mut sources = HashSet::new();
        for desc in submitted {
            let needs_move = match desc.seq {
                Some(seq) => existing.get(&seq).is_some_and(|row| row.dir != desc.temp_dir),
                None => !desc.original_name.is_empty(),
            };
            if !needs_move {
                continue;
            }

            if desc.temp_dir != self.tmp_dir {
                return Err(ApiError::validation(format!(
                    "new files must come from {:?}, got {:?}",
                    self.tmp_dir, desc.temp_dir
                )));
            }
            if !sources.insert(desc.temp_name.as_str()) {
                return Err(ApiError::validation(format!("{} submitted twice", desc.temp_name)));
            }
            if !self.storage.exists(&desc.temp_dir, &desc.temp_name) {
                return Err(ApiError::SourceFileMissing(
                    self.storage.path(&desc.temp_dir, &desc.temp_name),
                ));
            }
        }
        Ok(())
    }

    /// The file goes first; the row is removed only once the file is gone.
    fn discard_all<'a>(&self, rows: impl Iterator<Item = &'a FileRow>) -> Result<usize, ApiError> {
        let mut deleted = 0;
        for row in rows {
            self.storage.remove(&row.dir, &row.name)?;
            self.db.delete_file(row.seq)?;
            debug!("Board {}: deleted file {} ({})", row.board_seq, row.seq, row.org_name);
            deleted += 1;
        }
        Ok(deleted)
    }

    fn board_lock(&self, board_seq: i64) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(board_seq).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(seq: &str, org: &str, name: &str, dir: &str) -> FileDescriptor {
        FileDescriptor {
            file_seq: seq.into(),
            file_org_name: org.into(),
            file_tmp_name: name.into(),
            file_tmp_dir: dir.into(),
        }
    }

    #[test]
    fn parses_new_and_existing_entries() {
        let parsed = parse_descriptors(&[
            descriptor("", "a.txt", "n1.txt", "tmp"),
            descriptor(" 5 ", "b.txt", "n2.txt", "upload"),
        ])
        .unwrap();
        assert_eq!(parsed[0].seq, None);
        assert_eq!(parsed[1].seq, Some(5));
        assert_eq!(parsed[1].temp_dir, "upload");
    }

    #[test]
    fn rejects_bad_seq() {
        for seq in ["abc", "0", "-3", "1.5"] {
            let err = parse_descriptors(&[descriptor(seq, "a", "n", "tmp")]).unwrap_err();
            assert!(matches!(err, ApiError::Validation(_)), "{seq}");
        }
    }

    #[test]
    fn rejects_path_tricks() {
        for (name, dir) in [("../x", "tmp"), ("x", "../tmp"), ("a/b", "tmp"), ("", "tmp"), ("x", "")] {
            assert!(parse_descriptors(&[descriptor("", "a", name, dir)]).is_err(), "{name} {dir}");
        }
    }

    #[test]
    fn rejects_duplicate_seq() {
        let err = parse_descriptors(&[
            descriptor("5", "a", "n1", "upload"),
            descriptor("5", "b", "n2", "upload"),
        ])
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }
}
