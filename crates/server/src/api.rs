//! JSON API over the workflow service.
//!
//! - `POST /api/v1/entities` register a draft
//! - `GET  /api/v1/entities/{id}` current workflow state
//! - `POST /api/v1/entities/{id}/submit` hand a draft to stage 1
//! - `POST /api/v1/entities/{id}/decisions` approve, reject or revise
//! - `GET  /api/v1/entities/{id}/history` status log, latest first
//! - `GET  /api/v1/entities/{id}/decisions` decision log, oldest first
//! - `GET  /api/v1/pending` work waiting on the caller
//!
//! Caller identity comes from the session gateway in `x-actor-id`,
//! `x-actor-role` and `x-actor-scope` (comma separated units).

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use onay_core::audit::AuditSink;
use onay_core::domain::actor::{Actor, RequestContext, Scope};
use onay_core::domain::decision::{Decision, DecisionKind};
use onay_core::domain::entity::{EntityId, NewEntity, WorkflowType, WorkflowedEntity};
use onay_core::domain::history::HistoryEntry;
use onay_core::errors::{ApplicationError, InterfaceError};
use onay_core::service::WorkflowService;
use onay_core::store::WorkflowStore;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";
pub const ACTOR_SCOPE_HEADER: &str = "x-actor-scope";
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

pub type SharedService = Arc<WorkflowService<Arc<dyn WorkflowStore>, Arc<dyn AuditSink>>>;

#[derive(Clone)]
pub struct ApiState {
    service: SharedService,
}

pub fn router(service: SharedService) -> Router {
    Router::new()
        .route("/api/v1/entities", post(register_entity))
        .route("/api/v1/entities/{id}", get(get_entity))
        .route("/api/v1/entities/{id}/submit", post(submit_entity))
        .route("/api/v1/entities/{id}/decisions", post(decide_entity).get(list_decisions))
        .route("/api/v1/entities/{id}/history", get(list_history))
        .route("/api/v1/pending", get(list_pending))
        .with_state(ApiState { service })
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub id: String,
    pub workflow_type: String,
    pub owner_scope: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DecideRequest {
    pub decision: String,
    pub comments: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DecisionResponse {
    pub entity: WorkflowedEntity,
    pub decision_id: String,
    pub attempts: u32,
}

#[derive(Debug, Serialize)]
pub struct PendingResponse {
    pub role: String,
    pub count: usize,
    pub entities: Vec<WorkflowedEntity>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub entity_id: String,
    pub entries: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize)]
pub struct DecisionLogResponse {
    pub entity_id: String,
    pub decisions: Vec<Decision>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    pub correlation_id: String,
    pub retryable: bool,
}

// ---------------------------------------------------------------------------
// Caller identity
// ---------------------------------------------------------------------------

/// Request context assembled from the identity headers.
pub struct Caller(pub RequestContext);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let correlation_id = header_value(parts, CORRELATION_ID_HEADER)
            .unwrap_or_else(|| format!("req-{}", Uuid::new_v4()));

        let Some(actor_id) = header_value(parts, ACTOR_ID_HEADER) else {
            return Err(ApiError::bad_request(
                format!("missing `{ACTOR_ID_HEADER}` header"),
                correlation_id,
            ));
        };
        let Some(role) = header_value(parts, ACTOR_ROLE_HEADER) else {
            return Err(ApiError::bad_request(
                format!("missing `{ACTOR_ROLE_HEADER}` header"),
                correlation_id,
            ));
        };

        let mut actor = Actor::new(actor_id, role);
        if let Some(raw_scope) = header_value(parts, ACTOR_SCOPE_HEADER) {
            actor = actor.with_scope(Scope::new(raw_scope.split(',')));
        }

        Ok(Caller(RequestContext::new(actor, correlation_id)))
    }
}

fn header_value(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

impl ApiError {
    fn bad_request(message: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self(InterfaceError::BadRequest {
            message: message.into(),
            correlation_id: correlation_id.into(),
        })
    }

    fn from_application(error: ApplicationError, ctx: &RequestContext) -> Self {
        Self(error.into_interface(ctx.correlation_id.clone()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::InvalidState { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!(
                event_name = "api.request.failed",
                correlation_id = %self.0.correlation_id(),
                error_kind = self.0.kind(),
                error = %self.0,
                "request failed"
            );
        }

        let body = ErrorBody {
            error: self.0.kind(),
            message: self.0.user_message().to_string(),
            correlation_id: self.0.correlation_id().to_string(),
            retryable: self.0.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}

fn json_body<T>(
    payload: Result<Json<T>, JsonRejection>,
    ctx: &RequestContext,
) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text(), ctx.correlation_id.clone()))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// The caller always becomes the owner of the draft it registers.
async fn register_entity(
    State(state): State<ApiState>,
    Caller(ctx): Caller,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<WorkflowedEntity>), ApiError> {
    let body = json_body(payload, &ctx)?;
    let new = NewEntity {
        id: EntityId(body.id.trim().to_string()),
        workflow_type: WorkflowType(body.workflow_type.trim().to_string()),
        owner_id: ctx.actor.id.clone(),
        owner_scope: body.owner_scope.filter(|scope| !scope.trim().is_empty()),
    };

    let entity = state
        .service
        .register(&ctx, new)
        .await
        .map_err(|error| ApiError::from_application(error, &ctx))?;

    info!(
        event_name = "api.entity.registered",
        correlation_id = %ctx.correlation_id,
        entity_id = %entity.id,
        workflow_type = %entity.workflow_type,
        "entity registered"
    );
    Ok((StatusCode::CREATED, Json(entity)))
}

async fn get_entity(
    State(state): State<ApiState>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
) -> Result<Json<WorkflowedEntity>, ApiError> {
    state
        .service
        .entity(&ctx, &EntityId(id))
        .await
        .map(Json)
        .map_err(|error| ApiError::from_application(error, &ctx))
}

async fn submit_entity(
    State(state): State<ApiState>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
) -> Result<Json<WorkflowedEntity>, ApiError> {
    let entity = state
        .service
        .submit(&ctx, &EntityId(id))
        .await
        .map_err(|error| ApiError::from_application(error, &ctx))?;

    info!(
        event_name = "api.entity.submitted",
        correlation_id = %ctx.correlation_id,
        entity_id = %entity.id,
        status = %entity.status,
        "entity submitted"
    );
    Ok(Json(entity))
}

async fn decide_entity(
    State(state): State<ApiState>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
    payload: Result<Json<DecideRequest>, JsonRejection>,
) -> Result<Json<DecisionResponse>, ApiError> {
    let body = json_body(payload, &ctx)?;
    let Some(kind) = DecisionKind::parse(&body.decision) else {
        return Err(ApiError::bad_request(
            format!("unknown decision `{}`; expected approve, reject or revise", body.decision),
            ctx.correlation_id.clone(),
        ));
    };

    let outcome = state
        .service
        .decide(&ctx, &EntityId(id), kind, body.comments.as_deref())
        .await
        .map_err(|error| ApiError::from_application(error, &ctx))?;

    info!(
        event_name = "api.entity.decided",
        correlation_id = %ctx.correlation_id,
        entity_id = %outcome.entity.id,
        decision = kind.as_str(),
        status = %outcome.entity.status,
        attempts = outcome.attempts,
        "decision recorded"
    );
    Ok(Json(DecisionResponse {
        entity: outcome.entity,
        decision_id: outcome.decision_id.0,
        attempts: outcome.attempts,
    }))
}

async fn list_history(
    State(state): State<ApiState>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let entity_id = EntityId(id);
    let entries = state
        .service
        .history(&ctx, &entity_id)
        .await
        .map_err(|error| ApiError::from_application(error, &ctx))?;
    Ok(Json(HistoryResponse { entity_id: entity_id.0, entries }))
}

async fn list_decisions(
    State(state): State<ApiState>,
    Caller(ctx): Caller,
    Path(id): Path<String>,
) -> Result<Json<DecisionLogResponse>, ApiError> {
    let entity_id = EntityId(id);
    let decisions = state
        .service
        .decisions(&ctx, &entity_id)
        .await
        .map_err(|error| ApiError::from_application(error, &ctx))?;
    Ok(Json(DecisionLogResponse { entity_id: entity_id.0, decisions }))
}

async fn list_pending(
    State(state): State<ApiState>,
    Caller(ctx): Caller,
) -> Result<Json<PendingResponse>, ApiError> {
    let entities = state
        .service
        .pending(&ctx)
        .await
        .map_err(|error| ApiError::from_application(error, &ctx))?;
    Ok(Json(PendingResponse { role: ctx.actor.role.clone(), count: entities.len(), entities }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        response::IntoResponse,
        Router,
    };
    use onay_core::audit::{AuditSink, InMemoryAuditSink};
    use onay_core::domain::entity::EntityId;
    use onay_core::errors::ApplicationError;
    use onay_core::service::WorkflowService;
    use onay_core::stages::StageTable;
    use onay_core::store::{InMemoryWorkflowStore, WorkflowStore};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::{router, ApiError};

    struct Harness {
        router: Router,
        store: InMemoryWorkflowStore,
        audit: Arc<InMemoryAuditSink>,
    }

    fn harness() -> Harness {
        let store = InMemoryWorkflowStore::new();
        let audit = Arc::new(InMemoryAuditSink::default());
        let shared_store: Arc<dyn WorkflowStore> = Arc::new(store.clone());
        let shared_audit: Arc<dyn AuditSink> = audit.clone();
        let service = WorkflowService::new(
            shared_store,
            shared_audit,
            Arc::new(StageTable::builtin().expect("builtin catalogue")),
        );
        Harness { router: router(Arc::new(service)), store, audit }
    }

    struct Call<'a> {
        method: &'a str,
        uri: String,
        actor: Option<(&'a str, &'a str)>,
        scope: Option<&'a str>,
        body: Option<Value>,
    }

    impl<'a> Call<'a> {
        fn new(method: &'a str, uri: impl Into<String>) -> Self {
            Self { method, uri: uri.into(), actor: None, scope: None, body: None }
        }

        fn by(mut self, actor_id: &'a str, role: &'a str) -> Self {
            self.actor = Some((actor_id, role));
            self
        }

        fn scoped(mut self, scope: &'a str) -> Self {
            self.scope = Some(scope);
            self
        }

        fn json(mut self, body: Value) -> Self {
            self.body = Some(body);
            self
        }
    }

    async fn send(router: &Router, call: Call<'_>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(call.method)
            .uri(call.uri)
            .header("x-correlation-id", "req-test");
        if let Some((actor_id, role)) = call.actor {
            builder = builder.header("x-actor-id", actor_id).header("x-actor-role", role);
        }
        if let Some(scope) = call.scope {
            builder = builder.header("x-actor-scope", scope);
        }
        let request = match call.body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };

        let response = router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }

    async fn register_and_submit(router: &Router, id: &str, scope: &str) {
        let (status, _) = send(
            router,
            Call::new("POST", "/api/v1/entities").by("u-owner", "staff").json(json!({
                "id": id,
                "workflow_type": "budget_proposal",
                "owner_scope": scope,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) =
            send(router, Call::new("POST", format!("/api/v1/entities/{id}/submit")).by("u-owner", "staff"))
                .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "vp_review");
    }

    #[tokio::test]
    async fn full_chain_reaches_approved_over_http() {
        let harness = harness();
        register_and_submit(&harness.router, "BT-HTTP-1", "mali-hizmetler").await;

        for (role, expected) in [
            ("vice_president", "finance_review"),
            ("finance", "president_review"),
            ("president", "approved"),
        ] {
            let (status, body) = send(
                &harness.router,
                Call::new("POST", "/api/v1/entities/BT-HTTP-1/decisions")
                    .by("u-approver", role)
                    .scoped("mali-hizmetler")
                    .json(json!({ "decision": "approve" })),
            )
            .await;
            assert_eq!(status, StatusCode::OK, "{role} should be able to approve");
            assert_eq!(body["entity"]["status"], expected);
            assert_eq!(body["attempts"], 1);
        }

        let (status, body) = send(
            &harness.router,
            Call::new("GET", "/api/v1/entities/BT-HTTP-1/history").by("u-owner", "staff"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let entries = body["entries"].as_array().expect("entries");
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0]["to_status"], "approved");

        let (_, body) = send(
            &harness.router,
            Call::new("GET", "/api/v1/entities/BT-HTTP-1/decisions").by("u-owner", "staff"),
        )
        .await;
        let decisions = body["decisions"].as_array().expect("decisions");
        assert_eq!(decisions.len(), 3);
        assert_eq!(decisions[0]["stage_role"], "vice_president");
        assert_eq!(harness.store.decision_count(), 3);
    }

    #[tokio::test]
    async fn wrong_role_is_forbidden_without_writes() {
        let harness = harness();
        register_and_submit(&harness.router, "BT-HTTP-2", "mali-hizmetler").await;

        let (status, body) = send(
            &harness.router,
            Call::new("POST", "/api/v1/entities/BT-HTTP-2/decisions")
                .by("u-fin", "finance")
                .json(json!({ "decision": "approve" })),
        )
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "forbidden");
        assert_eq!(body["correlation_id"], "req-test");
        assert_eq!(harness.store.decision_count(), 0);
        assert_eq!(harness.store.history_count(), 1);
    }

    #[tokio::test]
    async fn reject_without_comments_is_a_bad_request() {
        let harness = harness();
        register_and_submit(&harness.router, "BT-HTTP-3", "mali-hizmetler").await;

        let (status, body) = send(
            &harness.router,
            Call::new("POST", "/api/v1/entities/BT-HTTP-3/decisions")
                .by("u-vp", "vice_president")
                .scoped("mali-hizmetler")
                .json(json!({ "decision": "reject", "comments": "   " })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "bad_request");
        assert_eq!(harness.store.decision_count(), 0);
    }

    #[tokio::test]
    async fn unknown_decision_kind_is_a_bad_request() {
        let harness = harness();
        register_and_submit(&harness.router, "BT-HTTP-4", "mali-hizmetler").await;

        let (status, body) = send(
            &harness.router,
            Call::new("POST", "/api/v1/entities/BT-HTTP-4/decisions")
                .by("u-vp", "vice_president")
                .scoped("mali-hizmetler")
                .json(json!({ "decision": "escalate" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap_or_default().contains("escalate"));
    }

    #[tokio::test]
    async fn missing_identity_headers_are_rejected() {
        let harness = harness();

        let (status, body) = send(&harness.router, Call::new("GET", "/api/v1/pending")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap_or_default().contains("x-actor-id"));
        assert!(harness.audit.events().is_empty());
    }

    #[tokio::test]
    async fn unknown_entity_is_not_found() {
        let harness = harness();

        let (status, body) = send(
            &harness.router,
            Call::new("GET", "/api/v1/entities/NOPE-1").by("u-owner", "staff"),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts_and_double_submit_is_invalid_state() {
        let harness = harness();
        register_and_submit(&harness.router, "BT-HTTP-5", "mali-hizmetler").await;

        let (status, _) = send(
            &harness.router,
            Call::new("POST", "/api/v1/entities").by("u-owner", "staff").json(json!({
                "id": "BT-HTTP-5",
                "workflow_type": "budget_proposal",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(
            &harness.router,
            Call::new("POST", "/api/v1/entities/BT-HTTP-5/submit").by("u-owner", "staff"),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "invalid_state");
        assert_eq!(body["retryable"], false);
    }

    #[tokio::test]
    async fn decision_on_a_finished_entity_is_final_not_retryable() {
        let harness = harness();
        register_and_submit(&harness.router, "BT-HTTP-8", "mali-hizmetler").await;

        let (status, _) = send(
            &harness.router,
            Call::new("POST", "/api/v1/entities/BT-HTTP-8/decisions")
                .by("u-vp", "vice_president")
                .scoped("mali-hizmetler")
                .json(json!({ "decision": "reject", "comments": "eksik gerekce" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            &harness.router,
            Call::new("POST", "/api/v1/entities/BT-HTTP-8/decisions")
                .by("u-vp", "vice_president")
                .scoped("mali-hizmetler")
                .json(json!({ "decision": "approve" })),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "invalid_state");
        assert_eq!(body["retryable"], false);
        assert_eq!(harness.store.decision_count(), 1);
    }

    #[tokio::test]
    async fn exhausted_conflict_body_is_marked_retryable() {
        let error = ApplicationError::Conflict { entity_id: EntityId("BT-1".to_owned()), attempts: 3 }
            .into_interface("req-retry");

        let response = ApiError(error).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let body: Value = serde_json::from_slice(&bytes).expect("json body");

        assert_eq!(body["error"], "conflict");
        assert_eq!(body["retryable"], true);
        assert_eq!(body["correlation_id"], "req-retry");
    }

    #[tokio::test]
    async fn registration_ignores_a_foreign_owner_in_the_body() {
        let harness = harness();

        let (status, body) = send(
            &harness.router,
            Call::new("POST", "/api/v1/entities").by("u-owner", "staff").json(json!({
                "id": "BT-HTTP-9",
                "workflow_type": "budget_proposal",
                "owner_id": "u-someone-else",
            })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["owner_id"], "u-owner");
    }

    #[tokio::test]
    async fn pending_respects_the_caller_scope() {
        let harness = harness();
        register_and_submit(&harness.router, "BT-HTTP-6", "mali-hizmetler").await;
        register_and_submit(&harness.router, "BT-HTTP-7", "bilgi-islem").await;

        let (status, body) = send(
            &harness.router,
            Call::new("GET", "/api/v1/pending").by("u-vp", "vice_president").scoped("bilgi-islem"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["entities"][0]["id"], "BT-HTTP-7");

        let (_, body) = send(
            &harness.router,
            Call::new("GET", "/api/v1/pending").by("u-fin", "finance"),
        )
        .await;
        assert_eq!(body["count"], 0);
    }

    #[tokio::test]
    async fn malformed_json_is_reported_as_bad_request() {
        let harness = harness();

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/entities")
            .header("x-actor-id", "u-owner")
            .header("x-actor-role", "staff")
            .header("content-type", "application/json")
            .body(Body::from("{\"id\": "))
            .expect("request");
        let response = harness.router.clone().oneshot(request).await.expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
