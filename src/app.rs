use axum::{
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth;
use crate::fights;
use crate::ranking;
use crate::shared::AppState;

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Builds the HTTP surface. Everything under `/admin` requires an admin
/// bearer token.
pub fn build_router(app_state: AppState) -> Router {
    let admin = Router::new()
        .route("/fights/:fight_id/result", post(fights::resolve_fight))
        .route(
            "/leagues/:league_id/events/:event_id/consolidate",
            post(ranking::consolidate_event),
        )
        .route("/scoring/preview", post(fights::preview_points))
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            auth::require_admin,
        ));

    Router::new()
        .route("/health", get(health))
        .route(
            "/leagues/:league_id/events/:event_id/snapshots/:snapshot_type",
            get(ranking::list_snapshots),
        )
        .route(
            "/leagues/:league_id/standings/:period",
            get(ranking::league_standings),
        )
        .route("/users/:user_id/totals", get(ranking::user_totals))
        .nest("/admin", admin)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}
