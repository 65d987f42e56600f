use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
};

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{boards, files, login, users};

/// All API routes, unprefixed. Read-only board routes and token issuance are
/// public; everything else goes through `require_auth`.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/login", post(login::login))
        .route("/refresh", post(login::refresh))
        .route("/boards", get(boards::list_boards))
        .route("/boards/code/{boards_code}", get(boards::list_boards_by_code))
        .route("/boards/seqs/{seqs}", get(boards::get_boards_by_seqs))
        .route("/boards/{seq}", get(boards::get_board))
        .route("/boards/{seq}/files", get(files::list_files));

    let protected_routes = Router::new()
        .route("/me", get(login::me))
        .route("/users", get(users::list_users).post(users::create_user))
        .route("/users/role/{role}", get(users::list_users_by_role))
        .route("/users/seqs/{seqs}", get(users::get_users_by_seqs).delete(users::delete_users))
        .route("/users/{seq}", get(users::get_user).put(users::update_user))
        .route("/boards", post(boards::create_board))
        .route(
            "/boards/upload",
            post(files::upload).layer(DefaultBodyLimit::max(state.upload.max_upload_bytes)),
        )
        .route("/boards/seqs/{seqs}", delete(boards::delete_boards))
        .route("/boards/{seq}", put(boards::update_board).delete(boards::delete_board))
        .route("/boards/{seq}/files", post(files::save_files))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
