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

use super::domain::{SubscriptionId, UsageType};
use super::repository::{BillingRepository, RepositoryError};
use super::service::{UsageError, UsageMeteringService};

/// Router builder exposing the usage metering endpoints.
pub fn billing_router<R>(service: Arc<UsageMeteringService<R>>) -> Router
where
    R: BillingRepository + 'static,
{
    Router::new()
        .route(
            "/api/v1/subscriptions/:subscription_id/usage",
            post(record_usage_handler::<R>).get(usage_summary_handler::<R>),
        )
        .route(
            "/api/v1/subscriptions/:subscription_id/usage/limits",
            get(check_limits_handler::<R>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecordUsageRequest {
    usage_type: UsageType,
    tokens_used: i64,
    #[serde(default)]
    user_id: Option<Uuid>,
    #[serde(default)]
    metadata: Option<BTreeMap<String, serde_json::Value>>,
}

pub(crate) async fn record_usage_handler<R>(
    State(service): State<Arc<UsageMeteringService<R>>>,
    Path(subscription_id): Path<Uuid>,
    axum::Json(request): axum::Json<RecordUsageRequest>,
) -> Response
where
    R: BillingRepository + 'static,
{
    match service.record_usage(
        &SubscriptionId(subscription_id),
        request.usage_type,
        request.tokens_used,
        request.user_id,
        request.metadata,
    ) {
        Ok(usage) => (StatusCode::CREATED, axum::Json(usage)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn usage_summary_handler<R>(
    State(service): State<Arc<UsageMeteringService<R>>>,
    Path(subscription_id): Path<Uuid>,
) -> Response
where
    R: BillingRepository + 'static,
{
    match service.usage_summary(&SubscriptionId(subscription_id)) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn check_limits_handler<R>(
    State(service): State<Arc<UsageMeteringService<R>>>,
    Path(subscription_id): Path<Uuid>,
) -> Response
where
    R: BillingRepository + 'static,
{
    match service.check_usage_limits(&SubscriptionId(subscription_id)) {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(error) => error_response(error),
    }
}

fn error_response(error: UsageError) -> Response {
    let status = match &error {
        UsageError::SubscriptionNotFound => StatusCode::NOT_FOUND,
        UsageError::SubscriptionNotActive { .. } => StatusCode::CONFLICT,
        UsageError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        UsageError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        UsageError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    let payload = json!({ "error": error.to_string() });
    (status, axum::Json(payload)).into_response()
}
