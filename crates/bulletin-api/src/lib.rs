pub mod auth;
pub mod boards;
pub mod clock;
pub mod config;
pub mod convert;
pub mod error;
pub mod files;
pub mod login;
pub mod middleware;
pub mod params;
pub mod reconcile;
pub mod routes;
pub mod state;
pub mod storage;
pub mod users;

pub use auth::AuthManager;
pub use error::ApiError;
pub use reconcile::FileReconciler;
pub use state::{AppState, AppStateInner};
