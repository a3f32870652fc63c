// Export route modules
pub mod chat;

use crate::state::AppState;
use axum::http::{header, Method};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

// Function to configure all routes
pub fn configure(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new().merge(chat::routes(state)).layer(cors)
}
