use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::delete;
use axum::routing::get;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::engine::flash::FlashStatus;
use crate::engine::Event;
use crate::engine::EventSender;
use crate::engine::Registry;

/// Response for the /v1/ping endpoint
#[derive(Serialize)]
struct PingResponse {
    status: String,
}

/// Response for the /v1/info endpoint
#[derive(Serialize)]
struct InfoResponse {
    version: String,
    hostname: String,
}

/// One entry of the /v1/lights listing
#[derive(Debug, Serialize)]
struct LightResponse {
    entity_id: String,
    room: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    flash: FlashStatus,
}

#[derive(Debug, Deserialize)]
struct SunriseRequest {
    room: String,
    minutes: f64,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    version: &'static str,
    registry: Arc<Registry>,
    events: EventSender,
}

/// Handler for GET /v1/ping
#[tracing::instrument]
async fn ping() -> impl IntoResponse {
    tracing::debug!("Handling /v1/ping request");
    (
        StatusCode::OK,
        Json(PingResponse {
            status: "ok".to_string(),
        }),
    )
}

/// Handler for GET /v1/info
#[tracing::instrument(skip(state))]
async fn info(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Handling /v1/info request");

    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    (
        StatusCode::OK,
        Json(InfoResponse {
            version: state.version.to_string(),
            hostname,
        }),
    )
}

/// Handler for GET /v1/lights
#[tracing::instrument(skip(state))]
async fn lights(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut lights = Vec::new();
    for (_, handle) in state.registry.lights() {
        let light = handle.lock().await;
        lights.push(LightResponse {
            entity_id: light.entity_id.clone(),
            room: light.room.clone(),
            kind: light.kind.clone(),
            flash: light.session.status(),
        });
    }
    (StatusCode::OK, Json(lights))
}

/// Handler for POST /v1/sunrise
#[tracing::instrument(skip(state))]
async fn start_sunrise(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SunriseRequest>,
) -> axum::response::Response {
    if state.registry.room(&request.room).is_none() {
        return error(StatusCode::NOT_FOUND, format!("unknown room {}", request.room));
    }
    if !request.minutes.is_finite() || request.minutes < 0.0 {
        return error(StatusCode::BAD_REQUEST, "minutes must be a non-negative number");
    }

    let event = Event::SunriseStart {
        room: request.room,
        minutes: request.minutes,
    };
    match state.events.send(event).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(_) => error(StatusCode::SERVICE_UNAVAILABLE, "dispatcher is not running"),
    }
}

/// Handler for DELETE /v1/sunrise/:room
#[tracing::instrument(skip(state))]
async fn stop_sunrise(
    State(state): State<Arc<AppState>>,
    Path(room): Path<String>,
) -> axum::response::Response {
    if state.registry.room(&room).is_none() {
        return error(StatusCode::NOT_FOUND, format!("unknown room {}", room));
    }
    match state.events.send(Event::SunriseStop { room }).await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(_) => error(StatusCode::SERVICE_UNAVAILABLE, "dispatcher is not running"),
    }
}

/// Create the API router with all endpoints
fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/ping", get(ping))
        .route("/v1/info", get(info))
        .route("/v1/lights", get(lights))
        .route("/v1/sunrise", post(start_sunrise))
        .route("/v1/sunrise/:room", delete(stop_sunrise))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP API server
///
/// This function will bind to the specified address and serve the API endpoints.
/// It will run until the provided shutdown signal is triggered.
///
/// # Arguments
/// * `listen` - The IP address to listen on (e.g., "127.0.0.1")
/// * `port` - The port to listen on (e.g., 8566)
/// * `registry` - Lights and rooms, for status and request validation
/// * `events` - Sender into the dispatcher
/// * `shutdown_rx` - A oneshot receiver that will trigger graceful shutdown
pub async fn serve(
    listen: String,
    port: u16,
    registry: Arc<Registry>,
    events: EventSender,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    let version = env!("CARGO_PKG_VERSION");

    let state = Arc::new(AppState {
        version,
        registry,
        events,
    });
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", listen, port)
        .parse()
        .with_context(|| format!("Invalid API listen address {}:{}", listen, port))?;
    tracing::info!("Starting HTTP API server on {}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            tracing::info!("HTTP API server shutting down gracefully");
        })
        .await?;

    Ok(())
}
