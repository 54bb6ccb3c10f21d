//! REST surface for the task scheduler.
//!
//! Two endpoints, both JSON-in/JSON-out with a `{code, msg, data}` envelope:
//! - `POST /task-scheduler/start` — register or replace a scheduled task
//! - `POST /task-scheduler/stop`  — cancel a scheduled task
//!
//! Request shape validation (blank checks, naming conventions, the six-field
//! cron silhouette) lives here; schedule semantics belong to the registry.

use std::sync::Arc;
use std::sync::LazyLock;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::scheduler::{StartAck, StopAck, TaskIdentity, TaskRegistry};

/// Service and method names must be lower camel case.
static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-zA-Z0-9]*$").expect("name pattern must compile"));

/// Six whitespace-separated cron fields; a silhouette check only, the real
/// parse happens in the registry.
static CRON_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9*?/,-]+\s+[0-9*?/,-]+\s+[0-9*?/,-]+\s+[0-9*?/,LW-]+\s+[0-9*?/,-]+\s+[0-9*?/,L#-]+$")
        .expect("cron pattern must compile")
});

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTaskRequest {
    pub cron_expression: String,
    pub service_name: String,
    pub service_method: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTaskRequest {
    pub service_name: String,
    pub service_method: String,
}

/// The `{code, msg, data}` response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub code: u16,
    pub msg: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            code: 200,
            msg: "success".to_string(),
            data: Some(data),
        }
    }

    fn fail(msg: impl Into<String>) -> Self {
        Self {
            code: 500,
            msg: msg.into(),
            data: None,
        }
    }
}

/// Build the scheduler router.
pub fn scheduler_routes(registry: Arc<TaskRegistry>) -> Router {
    Router::new()
        .route("/task-scheduler/start", post(start_task))
        .route("/task-scheduler/stop", post(stop_task))
        .with_state(registry)
}

fn validate_name(label: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{label} must not be blank"));
    }
    if !NAME_PATTERN.is_match(value) {
        return Err(format!("{label} must be lower camel case"));
    }
    Ok(())
}

fn validate_start(request: &StartTaskRequest) -> Result<(), String> {
    if request.cron_expression.trim().is_empty() {
        return Err("cronExpression must not be blank".to_string());
    }
    if !CRON_PATTERN.is_match(request.cron_expression.trim()) {
        return Err(
            "cronExpression malformed, expected: sec min hour day month weekday".to_string(),
        );
    }
    validate_name("serviceName", &request.service_name)?;
    validate_name("serviceMethod", &request.service_method)?;
    Ok(())
}

fn validate_stop(request: &StopTaskRequest) -> Result<(), String> {
    validate_name("serviceName", &request.service_name)?;
    validate_name("serviceMethod", &request.service_method)?;
    Ok(())
}

async fn start_task(
    State(registry): State<Arc<TaskRegistry>>,
    Json(request): Json<StartTaskRequest>,
) -> Json<ApiResponse<StartAck>> {
    if let Err(message) = validate_start(&request) {
        return Json(ApiResponse::fail(message));
    }

    let identity = TaskIdentity::new(&request.service_name, &request.service_method);
    match registry.start(identity, request.cron_expression.trim()).await {
        Ok(ack) => Json(ApiResponse::ok(ack)),
        Err(e) => Json(ApiResponse::fail(format!("failed to start task: {e}"))),
    }
}

async fn stop_task(
    State(registry): State<Arc<TaskRegistry>>,
    Json(request): Json<StopTaskRequest>,
) -> Json<ApiResponse<StopAck>> {
    if let Err(message) = validate_stop(&request) {
        return Json(ApiResponse::fail(message));
    }

    let identity = TaskIdentity::new(&request.service_name, &request.service_method);
    Json(ApiResponse::ok(registry.stop(&identity)))
}
