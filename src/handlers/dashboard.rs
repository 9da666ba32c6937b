use axum::{
    extract::State,
    response::{Html, IntoResponse, Response},
};
use serde::Serialize;

use super::AppError;
use crate::{
    AppState,
    models::{DashboardStats, PipelineSummary},
    templates::render,
};

#[derive(Serialize)]
struct DashboardContext {
    stats: DashboardStats,
    pipelines: Vec<PipelineSummary>,
    error: Option<String>,
    kestra_url: String,
}

/// Server-rendered card view of the same data `/api/pipelines` serves. A
/// failed fetch still renders the page, with an error banner and empty grid.
pub async fn get_dashboard(State(state): State<AppState>) -> Result<Response, AppError> {
    let (pipelines, error) = match state.kestra.list_executions().await {
        Ok(executions) => {
            (executions.iter().map(PipelineSummary::from_execution).collect(), None)
        }
        Err(err) => {
            tracing::error!("Failed to fetch from Kestra: {err:?}");
            (vec![], Some(err.to_string()))
        }
    };
    let stats = DashboardStats::tally(&pipelines);
    let rendered = render(&state.templates, "dashboard.html", DashboardContext {
        stats,
        pipelines,
        error,
        kestra_url: state.config.kestra.base_url.clone(),
    })?;
    Ok(Html(rendered).into_response())
}
