//! HTTP server and routes.

mod handlers;
mod state;

pub use state::AppState;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let library_routes = Router::new()
        .route("/{id}/scan", post(handlers::scan_library))
        .route("/{id}/empty-trash", post(handlers::empty_trash));

    let book_routes = Router::new()
        .route("/{id}/pages/{number}", get(handlers::book_page))
        .route("/{id}/thumbnail", get(handlers::book_thumbnail))
        .route("/{id}/file", delete(handlers::delete_book_file));

    let api_routes = Router::new()
        .route("/index/rebuild", post(handlers::rebuild_index))
        .route("/search", get(handlers::search))
        .nest("/libraries", library_routes)
        .nest("/books", book_routes);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
