use crate::infra::{AppState, InMemoryBillingRepository};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use lendflow::billing::{billing_router, BillingRepository, UsageMeteringService};
use lendflow::workflows::application::{
    application_router, ApplicationEventSink, ApplicationRepository, ApplicationWorkflowService,
};

/// Full platform router: workflow + metering endpoints from the library,
/// subscription provisioning glue, and the operational endpoints.
pub(crate) fn platform_router<R, E>(
    workflow: Arc<ApplicationWorkflowService<R, E>>,
    metering: Arc<UsageMeteringService<InMemoryBillingRepository>>,
    billing: Arc<InMemoryBillingRepository>,
) -> Router
where
    R: ApplicationRepository + 'static,
    E: ApplicationEventSink + 'static,
{
    application_router(workflow)
        .merge(billing_router(metering))
        .route(
            "/api/v1/subscriptions",
            post(create_subscription_endpoint).with_state(billing.clone()),
        )
        .route("/api/v1/plans", get(list_plans_endpoint).with_state(billing))
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateSubscriptionRequest {
    group_id: Uuid,
    plan_id: Uuid,
}

pub(crate) async fn create_subscription_endpoint(
    State(billing): State<Arc<InMemoryBillingRepository>>,
    Json(request): Json<CreateSubscriptionRequest>,
) -> impl IntoResponse {
    let Some(plan) = billing.plan(&request.plan_id) else {
        let payload = json!({ "error": "plan not found" });
        return (StatusCode::NOT_FOUND, Json(payload)).into_response();
    };

    let subscription = billing.create_subscription(request.group_id, plan, Utc::now());
    (StatusCode::CREATED, Json(subscription)).into_response()
}

pub(crate) async fn list_plans_endpoint(
    State(billing): State<Arc<InMemoryBillingRepository>>,
) -> impl IntoResponse {
    match billing.active_plans() {
        Ok(plans) => (StatusCode::OK, Json(plans)).into_response(),
        Err(error) => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{
        default_plan_catalog, standard_commission_rules, InMemoryCommissionRepository,
        InMemoryWorkflowRepository,
    };
    use axum::body::Body;
    use axum::http::Request;
    use lendflow::commissions::CommissionEngine;
    use serde_json::Value;
    use tower::ServiceExt;

    fn test_router() -> Router {
        let workflow_repository = Arc::new(InMemoryWorkflowRepository::default());
        let commissions = Arc::new(InMemoryCommissionRepository::with_rules(
            standard_commission_rules(),
        ));
        let engine = Arc::new(CommissionEngine::new(commissions));
        let workflow = Arc::new(ApplicationWorkflowService::new(workflow_repository, engine));

        let billing = Arc::new(InMemoryBillingRepository::with_plans(default_plan_catalog()));
        let metering = Arc::new(UsageMeteringService::new(billing.clone()));

        platform_router(workflow, metering, billing)
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body reads");
        serde_json::from_slice(&bytes).expect("body is json")
    }

    fn post_json(uri: &str, payload: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string()))
            .expect("request builds")
    }

    #[tokio::test]
    async fn healthcheck_reports_ok() {
        let response = test_router()
            .oneshot(
                Request::get("/health")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("request completes");

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn subscription_can_be_provisioned_and_metered() {
        let router = test_router();

        let response = router
            .clone()
            .oneshot(
                Request::get("/api/v1/plans")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("request completes");
        assert_eq!(response.status(), StatusCode::OK);
        let plans = body_json(response).await;
        let plan_id = plans[0]["id"].as_str().expect("plan id").to_string();

        let response = router
            .clone()
            .oneshot(post_json(
                "/api/v1/subscriptions",
                json!({ "group_id": Uuid::new_v4(), "plan_id": plan_id }),
            ))
            .await
            .expect("request completes");
        assert_eq!(response.status(), StatusCode::CREATED);
        let subscription = body_json(response).await;
        let subscription_id = subscription["id"].as_str().expect("id").to_string();

        let response = router
            .clone()
            .oneshot(post_json(
                &format!("/api/v1/subscriptions/{subscription_id}/usage"),
                json!({ "usage_type": "llm", "tokens_used": 1200 }),
            ))
            .await
            .expect("request completes");
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = router
            .oneshot(
                Request::get(format!(
                    "/api/v1/subscriptions/{subscription_id}/usage"
                ))
                .body(Body::empty())
                .expect("request builds"),
            )
            .await
            .expect("request completes");
        assert_eq!(response.status(), StatusCode::OK);
        let summary = body_json(response).await;
        assert_eq!(summary["llm"]["used"], 1200);
    }

    #[tokio::test]
    async fn provisioning_rejects_unknown_plans() {
        let response = test_router()
            .oneshot(post_json(
                "/api/v1/subscriptions",
                json!({ "group_id": Uuid::new_v4(), "plan_id": Uuid::new_v4() }),
            ))
            .await
            .expect("request completes");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
