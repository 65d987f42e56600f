use std::sync::Arc;

use bulletin_db::Database;

use crate::auth::AuthManager;
use crate::clock::Clock;
use crate::config::{AuthSettings, UploadConfig};
use crate::error::ApiError;
use crate::reconcile::FileReconciler;
use crate::storage::Storage;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub auth: AuthManager,
    pub files: FileReconciler,
    pub storage: Arc<Storage>,
    pub upload: UploadConfig,
}

impl AppStateInner {
    /// Wire the auth core, storage and reconciler around one database.
    pub fn build(
        db: Arc<Database>,
        auth: &AuthSettings,
        upload: UploadConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<AppState, ApiError> {
        let storage = Arc::new(Storage::new(upload.home.clone())?);
        storage.ensure_dir(&upload.tmp_dir)?;
        storage.ensure_dir(&upload.file_dir)?;

        Ok(Arc::new(Self {
            auth: AuthManager::new(db.clone(), auth, clock)?,
            files: FileReconciler::new(db.clone(), storage.clone(), &upload),
            db,
            storage,
            upload,
        }))
    }
}
