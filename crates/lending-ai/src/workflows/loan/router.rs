use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use super::auth::AuthError;
use super::domain::{ApplicationId, LoanRequest};
use super::repository::{CancelOutcome, ChangeNotifier, LoanRepository};
use super::scheduler::StageQueue;
use super::service::{LoanPipelineService, PipelineError};

impl PipelineError {
    /// HTTP status for surfacing this error at the API edge.
    pub fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            PipelineError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::NotFound => StatusCode::NOT_FOUND,
            PipelineError::InvalidTransition { .. } => StatusCode::CONFLICT,
            PipelineError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Router builder exposing the pipeline's HTTP endpoints: submission for
/// the application form collaborator, reads for the dashboard, the abort
/// operation, and the operational stalled query.
pub fn loan_router<R, Q, N>(service: Arc<LoanPipelineService<R, Q, N>>) -> Router
where
    R: LoanRepository + 'static,
    Q: StageQueue + 'static,
    N: ChangeNotifier + 'static,
{
    Router::new()
        .route(
            "/api/v1/loans",
            post(submit_handler::<R, Q, N>).get(list_handler::<R, Q, N>),
        )
        .route(
            "/api/v1/loans/:application_id",
            get(status_handler::<R, Q, N>),
        )
        .route(
            "/api/v1/loans/:application_id/activities",
            get(activities_handler::<R, Q, N>),
        )
        .route(
            "/api/v1/loans/:application_id/cancel",
            post(cancel_handler::<R, Q, N>),
        )
        .route("/api/v1/ops/stalled", get(stalled_handler::<R, Q, N>))
        .with_state(service)
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, PipelineError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(PipelineError::Unauthorized(AuthError::Unauthorized))
}

fn error_response(err: PipelineError) -> Response {
    let payload = json!({ "error": err.to_string() });
    (err.status_code(), Json(payload)).into_response()
}

pub(crate) async fn submit_handler<R, Q, N>(
    State(service): State<Arc<LoanPipelineService<R, Q, N>>>,
    headers: HeaderMap,
    Json(request): Json<LoanRequest>,
) -> Response
where
    R: LoanRepository + 'static,
    Q: StageQueue + 'static,
    N: ChangeNotifier + 'static,
{
    let token = match bearer_token(&headers) {
        Ok(token) => token,
        Err(err) => return error_response(err),
    };

    match service.submit(token, request) {
        Ok(receipt) => (StatusCode::ACCEPTED, Json(receipt)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn list_handler<R, Q, N>(
    State(service): State<Arc<LoanPipelineService<R, Q, N>>>,
    headers: HeaderMap,
) -> Response
where
    R: LoanRepository + 'static,
    Q: StageQueue + 'static,
    N: ChangeNotifier + 'static,
{
    let token = match bearer_token(&headers) {
        Ok(token) => token,
        Err(err) => return error_response(err),
    };

    match service.applications(token) {
        Ok(applications) => {
            let views: Vec<_> = applications
                .iter()
                .map(|application| application.status_view())
                .collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn status_handler<R, Q, N>(
    State(service): State<Arc<LoanPipelineService<R, Q, N>>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
) -> Response
where
    R: LoanRepository + 'static,
    Q: StageQueue + 'static,
    N: ChangeNotifier + 'static,
{
    let token = match bearer_token(&headers) {
        Ok(token) => token,
        Err(err) => return error_response(err),
    };

    match service.application(token, &ApplicationId(application_id)) {
        Ok(application) => (StatusCode::OK, Json(application.status_view())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn activities_handler<R, Q, N>(
    State(service): State<Arc<LoanPipelineService<R, Q, N>>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
) -> Response
where
    R: LoanRepository + 'static,
    Q: StageQueue + 'static,
    N: ChangeNotifier + 'static,
{
    let token = match bearer_token(&headers) {
        Ok(token) => token,
        Err(err) => return error_response(err),
    };

    match service.activities(token, &ApplicationId(application_id)) {
        Ok(activities) => (StatusCode::OK, Json(activities)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn cancel_handler<R, Q, N>(
    State(service): State<Arc<LoanPipelineService<R, Q, N>>>,
    headers: HeaderMap,
    Path(application_id): Path<String>,
) -> Response
where
    R: LoanRepository + 'static,
    Q: StageQueue + 'static,
    N: ChangeNotifier + 'static,
{
    let token = match bearer_token(&headers) {
        Ok(token) => token,
        Err(err) => return error_response(err),
    };

    match service.cancel(token, &ApplicationId(application_id)) {
        Ok(outcome) => {
            let cancelled = matches!(outcome, CancelOutcome::Cancelled(_));
            let application = outcome.application();
            let payload = json!({
                "application_id": application.id,
                "status": application.status.label(),
                "cancelled": cancelled,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn stalled_handler<R, Q, N>(
    State(service): State<Arc<LoanPipelineService<R, Q, N>>>,
    headers: HeaderMap,
) -> Response
where
    R: LoanRepository + 'static,
    Q: StageQueue + 'static,
    N: ChangeNotifier + 'static,
{
    let token = match bearer_token(&headers) {
        Ok(token) => token,
        Err(err) => return error_response(err),
    };

    match service.stalled(token) {
        Ok(applications) => {
            let views: Vec<_> = applications
                .iter()
                .map(|application| application.status_view())
                .collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(err) => error_response(err),
    }
}
