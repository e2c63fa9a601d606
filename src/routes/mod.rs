// Route definitions

use std::sync::Arc;

use axum::{Router, extract::FromRef, routing::get};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::{config::Settings, gateway::ProxyApi};

mod api;

// Shared state handed to every handler
#[derive(Clone, FromRef)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub api: Arc<dyn ProxyApi>,
}

pub fn create_router(app_state: AppState) -> Router {
    let static_dir = app_state.settings.static_dir.clone();

    let router = Router::new()
        // The frontend calls these with a trailing slash; accept both forms.
        .route("/api/", get(api::search_vehicles))
        .route("/api", get(api::search_vehicles))
        .route("/api/makes-models-trims/", get(api::get_makes_models_trims))
        .route("/api/makes-models-trims", get(api::get_makes_models_trims))
        .with_state(app_state);

    // Serve the built frontend if one is configured
    let router = match static_dir {
        Some(dir) => {
            tracing::info!("Serving frontend from {}", dir);
            router.fallback_service(ServeDir::new(dir))
        }
        None => router,
    };

    router
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
