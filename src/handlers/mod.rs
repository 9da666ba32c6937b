use axum::{
    Router,
    extract::Request,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use tower::ServiceExt;
use tower_http::services::ServeDir;

use crate::AppState;

mod dashboard;
mod pipelines;

pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest_service(
            "/static",
            <ServeDir as ServiceExt<Request>>::map_response(
                ServeDir::new("static"),
                |mut response| {
                    response.headers_mut().insert(
                        header::CACHE_CONTROL,
                        HeaderValue::from_static("public, max-age=86400, must-revalidate"),
                    );
                    response
                },
            ),
        )
        .route("/robots.txt", get(get_robots))
        .route("/api/pipelines", get(pipelines::get_pipelines))
        .route("/", get(dashboard::get_dashboard))
        .fallback(fallback)
}

async fn get_robots() -> &'static str {
    "User-agent: *\nDisallow: /api/\n"
}

async fn fallback() -> AppError {
    AppError::Status(StatusCode::NOT_FOUND)
}

/// Error type for the HTML routes. Fetch failures on the JSON route carry
/// their own response shape and do not go through this.
pub enum AppError {
    Status(StatusCode),
    Internal(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::Status(status) if status == StatusCode::NOT_FOUND => {
                (status, "Not found").into_response()
            }
            Self::Status(status) => status.into_response(),
            Self::Internal(err) => {
                tracing::error!("{:?}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Something went wrong: {}", err))
                    .into_response()
            }
        }
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self { Self::Internal(err.into()) }
}
