//! Debug HTTP Surface
//!
//! Loopback-only endpoints used by automated tests to drive a running server:
//!
//! - `POST /debug/start` forces the round into Active
//! - `POST /debug/teleport` moves a player and sets look or health
//! - `POST /debug/shoot` fires one rifle shot from a player
//!
//! Requests from any non-loopback address get `403 forbidden`.

use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::game::state::{ActionError, PlayerId};
use crate::network::server::{now_ms, GameServerError};
use crate::network::session::{SharedSession, Teleport};

/// Body of `/debug/shoot`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShootRequest {
    pub from_id: PlayerId,
}

type DebugResponse = (StatusCode, Json<Value>);

/// True for 127.0.0.0/8, ::1 and IPv4-mapped loopback.
pub fn is_loopback(addr: &SocketAddr) -> bool {
    match addr.ip() {
        IpAddr::V4(ip) => ip.is_loopback(),
        IpAddr::V6(ip) => ip.is_loopback() || ip.to_ipv4_mapped().is_some_and(|v4| v4.is_loopback()),
    }
}

async fn loopback_only(ConnectInfo(addr): ConnectInfo<SocketAddr>, req: Request, next: Next) -> Response {
    if is_loopback(&addr) {
        next.run(req).await
    } else {
        warn!(%addr, path = %req.uri().path(), "debug request from non-loopback address");
        (StatusCode::FORBIDDEN, "forbidden").into_response()
    }
}

/// Debug routes over `session`.
pub fn router(session: SharedSession) -> Router {
    Router::new()
        .route("/debug/start", post(start))
        .route("/debug/teleport", post(teleport))
        .route("/debug/shoot", post(shoot))
        .layer(middleware::from_fn(loopback_only))
        .with_state(session)
}

/// Serve the debug routes on `addr` until shutdown.
pub async fn serve(
    addr: SocketAddr,
    session: SharedSession,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), GameServerError> {
    let listener = TcpListener::bind(addr).await.map_err(GameServerError::BindFailed)?;
    info!("Debug endpoints listening on {}", addr);

    let app = router(session).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;
    Ok(())
}

pub async fn start(State(session): State<SharedSession>) -> DebugResponse {
    session.write().await.debug_start(now_ms());
    (StatusCode::OK, Json(json!({ "ok": true })))
}

pub async fn teleport(State(session): State<SharedSession>, Json(req): Json<Teleport>) -> DebugResponse {
    match session.write().await.debug_teleport(&req, now_ms()) {
        Ok(()) => (StatusCode::OK, Json(json!({ "ok": true }))),
        Err(_) => (StatusCode::NOT_FOUND, Json(json!({ "ok": false, "error": "no-player" }))),
    }
}

pub async fn shoot(State(session): State<SharedSession>, Json(req): Json<ShootRequest>) -> DebugResponse {
    match session.write().await.debug_shoot(req.from_id, now_ms()) {
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!({ "ok": true, "hit": outcome.hit, "hitHp": outcome.hit_hp })),
        ),
        Err(ActionError::UnknownPlayer(_)) => {
            (StatusCode::NOT_FOUND, Json(json!({ "ok": false, "error": "no-shooter" })))
        }
        Err(e) => (StatusCode::OK, Json(json!({ "ok": false, "error": debug_error_code(&e) }))),
    }
}

fn debug_error_code(e: &ActionError) -> &'static str {
    match e {
        ActionError::Dead => "dead",
        _ => "rejected",
    }
}
