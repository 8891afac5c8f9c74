use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::app::AppContext;
use crate::scheduler::LIVE_TICK_LOOP;

const LOOP_NAMES: &[&str] = &[LIVE_TICK_LOOP];

pub fn create_router(ctx: AppContext) -> Router {
    let api = Router::new()
        .route("/overview", get(get_overview))
        .route("/roster", get(get_roster))
        .route("/alerts/recent", get(get_recent_alerts));

    Router::new()
        .route("/healthz", get(get_healthz))
        .route("/metrics", get(get_metrics))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn get_healthz(State(ctx): State<AppContext>) -> StatusCode {
    let is_ready = ctx
        .state
        .is_ready(LOOP_NAMES, Duration::from_secs(180))
        .await;

    if is_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn get_metrics(State(ctx): State<AppContext>) -> Response {
    match ctx.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(err) => {
            warn!(error = ?err, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

async fn get_overview(State(ctx): State<AppContext>) -> Json<crate::state::OverviewSnapshot> {
    Json(ctx.state.get_overview().await)
}

async fn get_roster(State(ctx): State<AppContext>) -> Json<Vec<crate::state::RosterEntry>> {
    Json(ctx.state.get_roster().await)
}

async fn get_recent_alerts(
    State(ctx): State<AppContext>,
    Query(params): Query<std::collections::HashMap<String, String>>,
) -> Json<Vec<crate::alerts::AlertRecord>> {
    let limit: usize = params
        .get("limit")
        .and_then(|v| v.parse().ok())
        .unwrap_or(50);
    Json(ctx.state.recent_alerts(limit).await)
}
