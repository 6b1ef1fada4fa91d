//! CORS Middleware Configuration

use std::time::Duration;

use tower_http::cors::{Any, CorsLayer};

use crate::config::CorsSettings;

/// Create CORS layer from settings. `*`, or no parseable origin, allows any.
pub fn create_cors_layer(settings: &CorsSettings) -> CorsLayer {
    let any = settings.allowed_origins.iter().any(|o| o == "*");
    let origins: Vec<_> = settings
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if any || origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(origins).max_age(Duration::from_secs(3600))
    }
}
