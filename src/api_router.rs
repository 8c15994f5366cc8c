//! API router.
//!
//! Combines the per-module routers into the REST surface served by `main`.

use std::sync::Arc;

use axum::Router;

use crate::shared::state::AppState;

pub fn configure_api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(crate::itsm::configure_itsm_routes())
        .merge(crate::sla::configure_sla_routes())
        .merge(crate::directory::configure_directory_routes())
}
