//! Route handlers, organized by resource (spec §6).

pub mod idle_policies;
pub mod operations;
pub mod projects;
pub mod support;
pub mod system;
pub mod templates;
pub mod volumes;
pub mod workstations;

use crate::state::AppState;
use axum::Router;

/// Build the `/api/v1` route tree. `/storage` is mounted as a second name
/// for the same router as `/volumes` (spec's volumes and storage endpoints
/// are analogous in shape).
pub fn api_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .nest("/workstations", workstations::routes())
        .nest("/templates", templates::routes())
        .nest("/volumes", volumes::routes())
        .nest("/storage", volumes::routes())
        .nest("/projects", projects::routes())
        .nest("/operations", operations::routes())
        .nest("/idle-policies", idle_policies::routes())
        .merge(system::routes());

    Router::new().nest("/api/v1", api_routes).with_state(state)
}
