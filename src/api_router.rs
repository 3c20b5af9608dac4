//! Assembles the HTTP application: portal routes, CORS for the web client and
//! request tracing.

use axum::http::{header, HeaderValue, Method};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::core::shared::state::AppState;
use crate::portal::configure_portal_routes;

fn cors_layer(public_base_url: &str) -> CorsLayer {
    let origin = match HeaderValue::from_str(public_base_url.trim_end_matches('/')) {
        Ok(origin) => AllowOrigin::exact(origin),
        Err(_) => {
            log::warn!(
                "public_base_url {} is not a valid origin, CORS requests will be refused",
                public_base_url
            );
            AllowOrigin::list(Vec::<HeaderValue>::new())
        }
    };
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let max_upload_bytes = state.config.portal.max_upload_bytes;
    let cors = cors_layer(&state.config.server.public_base_url);

    configure_portal_routes(max_upload_bytes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
