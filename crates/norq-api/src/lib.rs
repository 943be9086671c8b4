//! # Norq HTTP Service
//!
//! HTTP gateway exposing Norq queues as a JSON REST API.
//!
//! This library provides:
//! - Queue endpoints mapping requests onto [`QueueEngine`] operations
//! - A pure error-to-status mapping ([`status_for`])
//! - Health, welcome and model endpoints
//! - Layered service configuration ([`ServiceConfig`])
//!
//! Write endpoints require a JSON content type. The request body is handed
//! to the engine unparsed, so an unknown queue is reported before a
//! malformed body.

pub mod config;
pub mod errors;
pub mod responses;
pub mod selector;

pub use config::{ConfigError, LoggingConfig, QueueConfig, ServerConfig, ServiceConfig};
pub use errors::{status_for, ApiError, ServiceError};
pub use responses::{
    HealthResponse, LimitParams, PageParams, RemoveResponse, SizeResponse, WelcomeResponse,
    DEFAULT_WINDOW,
};
pub use selector::Selector;

use axum::{
    extract::{rejection::QueryRejection, DefaultBodyLimit, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::Utc;
use norq_core::{Document, PushReceipt, QueueDefinition, QueueEngine, SetReceipt};
use serde_json::Value;
use std::{collections::BTreeMap, future::IntoFuture, sync::Arc, time::Duration};
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use tracing::{error, info, instrument, warn};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration for the service
    pub config: Arc<ServiceConfig>,

    /// Queue engine serving every queue endpoint
    pub engine: QueueEngine,
}

impl AppState {
    /// Create new application state
    pub fn new(config: ServiceConfig, engine: QueueEngine) -> Self {
        Self {
            config: Arc::new(config),
            engine,
        }
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let server = state.config.server.clone();

    let service_routes = Router::new()
        .route("/", get(handle_welcome))
        .route("/health", get(handle_health_check))
        .route("/model", get(handle_model));

    let queue_routes = Router::new()
        .route(
            "/{queue}",
            get(get_definition).post(push_document).put(push_document),
        )
        .route("/{queue}/schema", get(get_schema))
        .route("/{queue}/next", get(peek_document).delete(pop_document))
        .route("/{queue}/size", get(get_size))
        .route("/{queue}/head", get(get_head))
        .route("/{queue}/tail", get(get_tail))
        .route("/{queue}/page/{page}", get(get_page))
        .route(
            "/{queue}/{selector}",
            get(get_selection).put(set_document).delete(remove_document),
        );

    let mut router = Router::new()
        .merge(service_routes)
        .merge(queue_routes)
        .layer(DefaultBodyLimit::max(server.max_body_size))
        .layer(TimeoutLayer::new(Duration::from_secs(server.timeout_seconds)))
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if server.enable_compression {
        router = router.layer(CompressionLayer::new());
    }
    if server.enable_cors {
        router = router.layer(CorsLayer::permissive());
    }

    router
}

/// Start HTTP server
pub async fn start_server(config: ServiceConfig, engine: QueueEngine) -> Result<(), ServiceError> {
    config.server.validate()?;

    let address = format!("{}:{}", config.server.host, config.server.port);
    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_seconds);

    let app = create_router(AppState::new(config, engine));

    let listener =
        tokio::net::TcpListener::bind(&address)
            .await
            .map_err(|e| ServiceError::BindFailed {
                address: address.clone(),
                message: e.to_string(),
            })?;

    info!("Starting HTTP server on {}", address);

    serve_until_deadline(listener, app, shutdown_signal(), shutdown_timeout).await?;

    info!("HTTP server shutdown complete");
    Ok(())
}

/// Serve `app` until `signal` resolves, then drain for at most `deadline`
///
/// New connections are refused once the signal arrives. Requests still in
/// flight when the deadline passes are abandoned.
pub(crate) async fn serve_until_deadline<S>(
    listener: tokio::net::TcpListener,
    app: Router,
    signal: S,
    deadline: Duration,
) -> Result<(), ServiceError>
where
    S: std::future::Future<Output = ()> + Send + 'static,
{
    let (fired_tx, fired_rx) = tokio::sync::oneshot::channel::<()>();
    let graceful = async move {
        signal.await;
        let _ = fired_tx.send(());
    };

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(graceful)
        .into_future();
    tokio::pin!(server);

    let drain_deadline = async move {
        if fired_rx.await.is_err() {
            std::future::pending::<()>().await;
        }
        info!(
            "Waiting up to {}s for in-flight requests",
            deadline.as_secs_f64()
        );
        tokio::time::sleep(deadline).await;
    };

    tokio::select! {
        result = &mut server => result.map_err(|e| ServiceError::ServerFailed {
            message: e.to_string(),
        }),
        _ = drain_deadline => {
            warn!(
                timeout_seconds = deadline.as_secs_f64(),
                "Graceful shutdown timed out; abandoning in-flight requests"
            );
            Ok(())
        }
    }
}

/// Resolve when SIGINT or SIGTERM is received
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C signal handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}

// ============================================================================
// Service Handlers
// ============================================================================

async fn handle_welcome() -> Json<WelcomeResponse> {
    Json(WelcomeResponse::default())
}

/// Health check: reports whether the backing store answers
#[instrument(skip(state))]
async fn handle_health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (status, label) = match state.engine.ping().await {
        Ok(()) => (StatusCode::OK, "healthy"),
        Err(e) => {
            warn!(error = %e, "Backing store health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
        }
    };

    (
        status,
        Json(HealthResponse {
            status: label.to_string(),
            provider: state.engine.provider_type(),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// Every queue definition, keyed by queue name
async fn handle_model(State(state): State<AppState>) -> Json<BTreeMap<String, QueueDefinition>> {
    let model = state
        .engine
        .registry()
        .definitions()
        .into_iter()
        .map(|definition| (definition.name.clone(), definition.clone()))
        .collect();
    Json(model)
}

// ============================================================================
// Queue Handlers
// ============================================================================

async fn get_definition(
    State(state): State<AppState>,
    Path(queue): Path<String>,
) -> Result<Json<QueueDefinition>, ApiError> {
    Ok(Json(state.engine.definition(&queue)?.clone()))
}

async fn get_schema(
    State(state): State<AppState>,
    Path(queue): Path<String>,
) -> Result<Json<Option<Value>>, ApiError> {
    Ok(Json(state.engine.definition(&queue)?.schema.clone()))
}

#[instrument(skip(state, headers, body))]
async fn push_document(
    State(state): State<AppState>,
    Path(queue): Path<String>,
    headers: HeaderMap,
    body: String,
) -> Result<(StatusCode, Json<PushReceipt>), ApiError> {
    require_json(&headers)?;
    let receipt = state.engine.push(&queue, body).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn peek_document(
    State(state): State<AppState>,
    Path(queue): Path<String>,
) -> Result<Json<Option<Document>>, ApiError> {
    Ok(Json(state.engine.peek(&queue).await?))
}

#[instrument(skip(state))]
async fn pop_document(
    State(state): State<AppState>,
    Path(queue): Path<String>,
) -> Result<Json<Option<Document>>, ApiError> {
    Ok(Json(state.engine.pop(&queue).await?))
}

async fn get_size(
    State(state): State<AppState>,
    Path(queue): Path<String>,
) -> Result<Json<SizeResponse>, ApiError> {
    let size = state.engine.size(&queue).await?;
    Ok(Json(SizeResponse { queue, size }))
}

async fn get_head(
    State(state): State<AppState>,
    Path(queue): Path<String>,
    query: Result<Query<LimitParams>, QueryRejection>,
) -> Result<Json<Vec<Document>>, ApiError> {
    state.engine.definition(&queue)?;
    let Query(params) = query?;
    Ok(Json(state.engine.head(&queue, params.limit()).await?))
}

async fn get_tail(
    State(state): State<AppState>,
    Path(queue): Path<String>,
    query: Result<Query<LimitParams>, QueryRejection>,
) -> Result<Json<Vec<Document>>, ApiError> {
    state.engine.definition(&queue)?;
    let Query(params) = query?;
    Ok(Json(state.engine.tail(&queue, params.limit()).await?))
}

/// Parameters are checked only after the queue resolves
async fn get_page(
    State(state): State<AppState>,
    Path((queue, page)): Path<(String, String)>,
    query: Result<Query<PageParams>, QueryRejection>,
) -> Result<Json<Vec<Document>>, ApiError> {
    state.engine.definition(&queue)?;
    let page = page.parse::<u64>().map_err(|e| ApiError::InvalidParameter {
        message: format!("page '{page}': {e}"),
    })?;
    let Query(params) = query?;
    Ok(Json(state.engine.page(&queue, page, params.size()).await?))
}

/// Window or single document, depending on the selector segment
async fn get_selection(
    State(state): State<AppState>,
    Path((queue, selector)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let engine = &state.engine;

    let documents = match Selector::parse(&selector) {
        Selector::Range { start, end } => engine.range(&queue, start, end).await?,
        Selector::Head(count) => engine.head(&queue, count).await?,
        Selector::Tail(count) => engine.tail(&queue, count).await?,
        Selector::Id(id) => {
            return match engine.get(&queue, &id).await? {
                Some(document) => Ok(Json(document).into_response()),
                None => Err(ApiError::ItemNotFound { queue, id }),
            };
        }
    };

    Ok(Json(documents).into_response())
}

#[instrument(skip(state, headers, body))]
async fn set_document(
    State(state): State<AppState>,
    Path((queue, id)): Path<(String, String)>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<SetReceipt>, ApiError> {
    require_json(&headers)?;
    Ok(Json(state.engine.set(&queue, &id, body).await?))
}

#[instrument(skip(state))]
async fn remove_document(
    State(state): State<AppState>,
    Path((queue, id)): Path<(String, String)>,
) -> Result<Json<RemoveResponse>, ApiError> {
    let status = state.engine.remove(&queue, &id).await?;
    Ok(Json(RemoveResponse {
        id,
        deleted: true,
        status,
    }))
}

/// Check that a request declares a JSON body
///
/// Accepts `application/json` and any `application/*+json` type, with or
/// without parameters.
pub fn require_json(headers: &HeaderMap) -> Result<(), ApiError> {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            let mime = value
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase();
            mime == "application/json"
                || (mime.starts_with("application/") && mime.ends_with("+json"))
        })
        .unwrap_or(false);

    if is_json {
        Ok(())
    } else {
        Err(ApiError::ContentTypeNotJson)
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// Request logging middleware with correlation ID tracking
///
/// Reuses the caller's `x-correlation-id` or generates one, records it on the
/// request span, and echoes it in the response headers.
#[instrument(skip(request, next), fields(
    method = %request.method(),
    uri = %request.uri(),
    correlation_id
))]
async fn request_logging_middleware(
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    let correlation_id = request
        .headers()
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    tracing::Span::current().record("correlation_id", correlation_id.as_str());
    request.extensions_mut().insert(correlation_id.clone());

    let mut response = next.run(request).await;
    let duration = start.elapsed();

    if let Ok(header_value) = correlation_id.parse() {
        response
            .headers_mut()
            .insert("x-correlation-id", header_value);
    }

    let status = response.status();

    if status.is_server_error() {
        error!(
            correlation_id = %correlation_id,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with server error"
        );
    } else if status.is_client_error() {
        warn!(
            correlation_id = %correlation_id,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with client error"
        );
    } else {
        info!(
            correlation_id = %correlation_id,
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed"
        );
    }

    response
}
