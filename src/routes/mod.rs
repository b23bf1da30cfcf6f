use axum::{Router, extract::DefaultBodyLimit, middleware};
use tower_http::{catch_panic::CatchPanicLayer, services::ServeDir};

use crate::errors::{AppError, handle_panic};
use crate::logging::log_request;
use crate::security::form::MAX_BODY_SIZE_BYTES;
use crate::security::headers::set_security_headers;
use crate::security::session::load_and_save;
use crate::state::AppState;

pub mod snippets;
pub mod users;

/// Builds the full application: session-backed page routes, static files,
/// and the outer middleware stack (panic recovery outermost).
pub fn create_router(state: AppState) -> Router {
    tracing::debug!("Creating application router");

    build_router(page_routes(), state)
}

pub(crate) fn page_routes() -> Router<AppState> {
    Router::new()
        .merge(snippets::router())
        .merge(users::router())
}

pub(crate) fn build_router(pages: Router<AppState>, state: AppState) -> Router {
    let dynamic =
        pages.route_layer(middleware::from_fn_with_state(state.clone(), load_and_save));

    Router::new()
        .merge(dynamic)
        .nest_service("/static", ServeDir::new(&state.static_dir))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE_BYTES))
        .layer(middleware::from_fn(set_security_headers))
        .layer(middleware::from_fn(log_request))
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

async fn not_found() -> AppError {
    AppError::NotFound
}
