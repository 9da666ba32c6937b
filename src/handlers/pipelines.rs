use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::{AppState, kestra::KestraError, models::PipelineSummary};

#[derive(Debug, Serialize)]
pub struct PipelinesResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Always present, so clients can render a consistent empty state.
    pub pipelines: Vec<PipelineSummary>,
}

/// JSON view of the latest self-heal executions. Upstream HTTP failures keep
/// their status; transport failures become a 500 with a generic message.
pub async fn get_pipelines(State(state): State<AppState>) -> Response {
    match state.kestra.list_executions().await {
        Ok(executions) => {
            let pipelines =
                executions.iter().map(PipelineSummary::from_execution).collect::<Vec<_>>();
            Json(PipelinesResponse { error: None, pipelines }).into_response()
        }
        Err(err) => {
            let status = match &err {
                KestraError::Api { status } => *status,
                KestraError::Unreachable(source) => {
                    tracing::error!("Failed to fetch from Kestra: {source:?}");
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            let body = PipelinesResponse { error: Some(err.to_string()), pipelines: vec![] };
            (status, Json(body)).into_response()
        }
    }
}
