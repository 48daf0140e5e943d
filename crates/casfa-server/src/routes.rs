//! Wires C6-C11's handlers onto the HTTP surface in spec §6.1, plus
//! the CORS and request-tracing layers the teacher applies uniformly.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{delegate_controller, mcp, oauth_controller, refresh, root_controller, state::AppState};

/// Build the full application router over a shared [`AppState`].
pub fn build(state: Arc<AppState>) -> Router {
    let cors = build_cors_layer(&state.config.server.cors_allowed_origins);

    Router::new()
        .route("/api/tokens/root", post(root_controller::get_or_create_root))
        .route("/api/refresh", post(refresh::refresh_handler))
        .route("/api/realm/:realm_id/delegates", post(delegate_controller::create_delegate).get(delegate_controller::list_delegates))
        .route("/api/realm/:realm_id/delegates/:id", get(delegate_controller::get_delegate))
        .route("/api/realm/:realm_id/delegates/:id/revoke", post(delegate_controller::revoke_delegate))
        .route("/.well-known/oauth-authorization-server/api/auth", get(oauth_controller::metadata))
        .route("/api/auth/authorize", get(oauth_controller::authorize))
        .route("/api/auth/approve", post(oauth_controller::approve))
        .route("/api/auth/token", post(oauth_controller::token))
        .route("/api/mcp", post(mcp::dispatch))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
        .max_age(Duration::from_secs(3600));

    if allowed_origins.is_empty() {
        layer.allow_origin(tower_http::cors::Any)
    } else {
        let origins: Vec<_> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        layer.allow_origin(AllowOrigin::list(origins))
    }
}
