// ABOUTME: Token-authenticated HTTP API over the supervisor and service definitions.
// ABOUTME: Routes under /v1/processes map one-to-one onto supervisor and config operations.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use eternal_core::{enabled, service, ConfigError, Paths, ServiceConfig};
use eternal_supervisor::{ProcessStatus, Supervisor, SupervisorError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Shared state behind every route
pub struct ApiState {
    pub supervisor: Supervisor,
    pub paths: Paths,
    pub token: String,
    /// How long DELETE waits for a running service to exit
    pub settle_timeout: Duration,
}

/// Response envelope used by every endpoint
#[derive(Debug, Serialize)]
pub struct Envelope {
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct ServiceListEntry {
    name: String,
    status: String,
    enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateServiceRequest {
    pub exec: String,
    #[serde(default)]
    pub dir: Option<String>,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Supervisor(e) => match e {
                SupervisorError::NotFound(_) => StatusCode::NOT_FOUND,
                SupervisorError::AlreadyRunning(_)
                | SupervisorError::NotRunning(_)
                | SupervisorError::StillRunning(_) => StatusCode::CONFLICT,
                SupervisorError::InvalidDefinition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                SupervisorError::LaunchFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Config(e) => match e {
                ConfigError::InvalidName(_) | ConfigError::MissingExec => StatusCode::BAD_REQUEST,
                ConfigError::AlreadyExists(_) => StatusCode::CONFLICT,
                ConfigError::NotFound(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "API request failed");
        }
        let body = Envelope {
            code: status.as_u16(),
            message: None,
            error: Some(self.to_string()),
            data: None,
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult = Result<Json<Envelope>, ApiError>;

fn success(message: &str, data: Option<serde_json::Value>) -> ApiResult {
    Ok(Json(Envelope {
        code: StatusCode::OK.as_u16(),
        message: Some(message.to_string()),
        error: None,
        data,
    }))
}

fn to_value(value: impl Serialize) -> Result<serde_json::Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::Internal(e.to_string()))
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/v1/processes", get(list_processes))
        .route(
            "/v1/processes/{name}",
            get(get_process).put(create_process).delete(delete_process),
        )
        .route("/v1/processes/{name}/{action}", post(process_action))
        .layer(middleware::from_fn_with_state(Arc::clone(&state), authenticate))
        .with_state(state)
}

/// Accepts `Authorization: Bearer <token>` or `access-token: <token>`.
async fn authenticate(
    State(state): State<Arc<ApiState>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let headers = req.headers();
    let authorized = headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .or_else(|| headers.get("access-token").and_then(|h| h.to_str().ok()))
        .is_some_and(|token| token == state.token);

    if !authorized {
        return Err(ApiError::Unauthorized);
    }
    Ok(next.run(req).await)
}

async fn list_processes(State(state): State<Arc<ApiState>>) -> ApiResult {
    let snapshots = state.supervisor.list().await;
    let enabled_names = enabled::load_enabled(&state.paths.enabled_file)?;

    let mut entries: BTreeMap<String, ServiceListEntry> = snapshots
        .into_iter()
        .map(|snap| {
            let entry = ServiceListEntry {
                name: snap.name.clone(),
                status: snap.status.to_string(),
                enabled: false,
            };
            (snap.name, entry)
        })
        .collect();
    for name in enabled_names {
        entries
            .entry(name.clone())
            .or_insert_with(|| ServiceListEntry {
                name,
                status: "not-found".to_string(),
                enabled: false,
            })
            .enabled = true;
    }

    let list: Vec<ServiceListEntry> = entries.into_values().collect();
    success("success", Some(to_value(list)?))
}

async fn get_process(State(state): State<Arc<ApiState>>, Path(name): Path<String>) -> ApiResult {
    let snapshot = state.supervisor.status(&name).await?;
    success("success", Some(to_value(snapshot)?))
}

async fn process_action(
    State(state): State<Arc<ApiState>>,
    Path((name, action)): Path<(String, String)>,
) -> ApiResult {
    let supervisor = &state.supervisor;
    let message = match action.as_str() {
        "start" => {
            supervisor.start(&name).await?;
            "process started successfully"
        }
        "stop" => {
            supervisor.stop(&name).await?;
            "process stopped successfully"
        }
        "restart" => {
            supervisor.restart(&name).await?;
            "process restarted successfully"
        }
        "enable" => {
            service::validate_name(&name)?;
            if !state.paths.service_file(&name).exists() {
                return Err(ConfigError::NotFound(name).into());
            }
            enabled::enable(&state.paths.enabled_file, &name)?;
            "service enabled"
        }
        "disable" => {
            enabled::disable(&state.paths.enabled_file, &name)?;
            "service disabled"
        }
        other => return Err(ApiError::BadRequest(format!("unknown action: {other}"))),
    };

    let data = match supervisor.status(&name).await {
        Ok(snapshot) => Some(to_value(snapshot)?),
        Err(_) => None,
    };
    success(message, data)
}

async fn create_process(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
    body: Result<Json<CreateServiceRequest>, JsonRejection>,
) -> ApiResult {
    let Json(req) = body.map_err(|_| ApiError::BadRequest("invalid json body".to_string()))?;
    if req.exec.trim().is_empty() {
        return Err(ApiError::BadRequest("exec is required".to_string()));
    }

    let config = ServiceConfig {
        exec: req.exec,
        dir: req.dir,
    };
    let definition = service::create_definition(&state.paths.services_dir, &name, &config)?;
    state.supervisor.register(definition).await;
    tracing::info!(service = %name, "Created service");

    let snapshot = state.supervisor.status(&name).await?;
    success("service created", Some(to_value(snapshot)?))
}

async fn delete_process(State(state): State<Arc<ApiState>>, Path(name): Path<String>) -> ApiResult {
    let supervisor = &state.supervisor;

    if let Ok(snapshot) = supervisor.status(&name).await {
        if snapshot.status == ProcessStatus::Running {
            supervisor.stop(&name).await?;
            supervisor.wait_settled(&name, state.settle_timeout).await?;
        }
    }

    let was_registered = match supervisor.deregister(&name).await {
        Ok(()) => true,
        Err(SupervisorError::NotFound(_)) => false,
        Err(e) => return Err(e.into()),
    };

    enabled::disable(&state.paths.enabled_file, &name)?;

    match service::delete_definition(&state.paths.services_dir, &name) {
        Ok(()) => {}
        Err(ConfigError::NotFound(_)) if was_registered => {}
        Err(e) => return Err(e.into()),
    }

    tracing::info!(service = %name, "Deleted service");
    success("service deleted", None)
}
