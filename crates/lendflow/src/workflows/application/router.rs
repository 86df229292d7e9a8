use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::domain::{
    ActorRef, ActorRole, ApplicationId, ApplicationStatus, NewApplication, ReviewDecision,
    StepPayload,
};
use super::repository::{
    ApplicationEventSink, ApplicationRepository, ApplicationView, ProgressView, RepositoryError,
    StatusChangeView,
};
use super::service::{ApplicationWorkflowService, WorkflowError};

/// Router builder exposing the application workflow endpoints.
pub fn application_router<R, E>(service: Arc<ApplicationWorkflowService<R, E>>) -> Router
where
    R: ApplicationRepository + 'static,
    E: ApplicationEventSink + 'static,
{
    Router::new()
        .route("/api/v1/applications", post(create_handler::<R, E>))
        .route(
            "/api/v1/applications/:application_id",
            get(get_handler::<R, E>),
        )
        .route(
            "/api/v1/applications/:application_id/submit",
            post(submit_handler::<R, E>),
        )
        .route(
            "/api/v1/applications/:application_id/progress",
            get(progress_handler::<R, E>),
        )
        .route(
            "/api/v1/applications/:application_id/progress/complete-step",
            post(complete_step_handler::<R, E>),
        )
        .route(
            "/api/v1/applications/:application_id/progress/set-step",
            post(set_step_handler::<R, E>),
        )
        .route(
            "/api/v1/applications/:application_id/status",
            post(update_status_handler::<R, E>),
        )
        .route(
            "/api/v1/applications/:application_id/status-history",
            get(history_handler::<R, E>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitRequest {
    #[serde(default)]
    actor_id: Option<Uuid>,
    #[serde(default)]
    actor_role: Option<ActorRole>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompleteStepRequest {
    step: u8,
    actor_id: Uuid,
    actor_role: ActorRole,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    documents_verified: Option<BTreeMap<String, bool>>,
    #[serde(default)]
    credit_check_result: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default)]
    decision: Option<ReviewDecision>,
}

impl CompleteStepRequest {
    fn payload(&self) -> Option<StepPayload> {
        if let Some(decision) = self.decision {
            return Some(StepPayload::Decision(decision));
        }
        if let Some(result) = &self.credit_check_result {
            return Some(StepPayload::CreditCheck(result.clone()));
        }
        self.documents_verified
            .as_ref()
            .map(|verified| StepPayload::DocumentVerification(verified.clone()))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SetStepRequest {
    step: u8,
    actor_id: Uuid,
    actor_role: ActorRole,
    #[serde(default)]
    decision: Option<ReviewDecision>,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateStatusRequest {
    status: ApplicationStatus,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    actor_id: Option<Uuid>,
    #[serde(default)]
    actor_role: Option<ActorRole>,
}

fn optional_actor(id: Option<Uuid>, role: Option<ActorRole>) -> Option<ActorRef> {
    match (id, role) {
        (Some(id), Some(role)) => Some(ActorRef { id, role }),
        _ => None,
    }
}

pub(crate) async fn create_handler<R, E>(
    State(service): State<Arc<ApplicationWorkflowService<R, E>>>,
    axum::Json(input): axum::Json<NewApplication>,
) -> Response
where
    R: ApplicationRepository + 'static,
    E: ApplicationEventSink + 'static,
{
    match service.create(input) {
        Ok(application) => {
            let view = ApplicationView::from(&application);
            (StatusCode::CREATED, axum::Json(view)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn get_handler<R, E>(
    State(service): State<Arc<ApplicationWorkflowService<R, E>>>,
    Path(application_id): Path<Uuid>,
) -> Response
where
    R: ApplicationRepository + 'static,
    E: ApplicationEventSink + 'static,
{
    match service.get(&ApplicationId(application_id)) {
        Ok(application) => {
            let view = ApplicationView::from(&application);
            (StatusCode::OK, axum::Json(view)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn submit_handler<R, E>(
    State(service): State<Arc<ApplicationWorkflowService<R, E>>>,
    Path(application_id): Path<Uuid>,
    axum::Json(request): axum::Json<SubmitRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    E: ApplicationEventSink + 'static,
{
    let actor = optional_actor(request.actor_id, request.actor_role);
    match service.submit(&ApplicationId(application_id), actor.as_ref()) {
        Ok(application) => {
            let view = ApplicationView::from(&application);
            (StatusCode::OK, axum::Json(view)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn progress_handler<R, E>(
    State(service): State<Arc<ApplicationWorkflowService<R, E>>>,
    Path(application_id): Path<Uuid>,
) -> Response
where
    R: ApplicationRepository + 'static,
    E: ApplicationEventSink + 'static,
{
    match service.get_progress(&ApplicationId(application_id)) {
        Ok(progress) => {
            let view = ProgressView::from(&progress);
            (StatusCode::OK, axum::Json(view)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn complete_step_handler<R, E>(
    State(service): State<Arc<ApplicationWorkflowService<R, E>>>,
    Path(application_id): Path<Uuid>,
    axum::Json(request): axum::Json<CompleteStepRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    E: ApplicationEventSink + 'static,
{
    let actor = ActorRef {
        id: request.actor_id,
        role: request.actor_role,
    };
    let payload = request.payload();
    match service.complete_step(
        &ApplicationId(application_id),
        request.step,
        &actor,
        request.notes.clone(),
        payload,
    ) {
        Ok(progress) => {
            let view = ProgressView::from(&progress);
            (StatusCode::OK, axum::Json(view)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn set_step_handler<R, E>(
    State(service): State<Arc<ApplicationWorkflowService<R, E>>>,
    Path(application_id): Path<Uuid>,
    axum::Json(request): axum::Json<SetStepRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    E: ApplicationEventSink + 'static,
{
    let actor = ActorRef {
        id: request.actor_id,
        role: request.actor_role,
    };
    match service.set_current_step(
        &ApplicationId(application_id),
        request.step,
        &actor,
        request.decision,
        request.notes.clone(),
    ) {
        Ok(progress) => {
            let view = ProgressView::from(&progress);
            (StatusCode::OK, axum::Json(view)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn update_status_handler<R, E>(
    State(service): State<Arc<ApplicationWorkflowService<R, E>>>,
    Path(application_id): Path<Uuid>,
    axum::Json(request): axum::Json<UpdateStatusRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    E: ApplicationEventSink + 'static,
{
    let actor = optional_actor(request.actor_id, request.actor_role);
    match service.update_status(
        &ApplicationId(application_id),
        request.status,
        request.notes.clone(),
        actor.as_ref(),
    ) {
        Ok(application) => {
            let view = ApplicationView::from(&application);
            (StatusCode::OK, axum::Json(view)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn history_handler<R, E>(
    State(service): State<Arc<ApplicationWorkflowService<R, E>>>,
    Path(application_id): Path<Uuid>,
) -> Response
where
    R: ApplicationRepository + 'static,
    E: ApplicationEventSink + 'static,
{
    match service.status_history(&ApplicationId(application_id)) {
        Ok(history) => {
            let views: Vec<StatusChangeView> = history.iter().map(StatusChangeView::from).collect();
            (StatusCode::OK, axum::Json(views)).into_response()
        }
        Err(error) => error_response(error),
    }
}

fn error_response(error: WorkflowError) -> Response {
    let status = match &error {
        WorkflowError::Step(_) => StatusCode::UNPROCESSABLE_ENTITY,
        WorkflowError::NotAuthorized { .. } => StatusCode::FORBIDDEN,
        WorkflowError::ApplicationNotFound => StatusCode::NOT_FOUND,
        WorkflowError::AlreadySubmitted => StatusCode::CONFLICT,
        WorkflowError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        WorkflowError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        WorkflowError::Repository(RepositoryError::Unavailable(_))
        | WorkflowError::Event(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let payload = json!({ "error": error.to_string() });
    (status, axum::Json(payload)).into_response()
}
