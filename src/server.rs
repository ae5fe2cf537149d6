//! Webhook HTTP surface.
//!
//! Every path answers HTTP 200 with a `{ code, message }` envelope; the
//! alerting platforms that send these webhooks ignore status codes, so
//! failures are distinguished by `code` alone.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::ExecutionError;
use crate::models::{Side, TradingSignal, WebhookPayload};
use crate::trading::{Outcome, Reporter, TradeEngine};

/// Shared handler state.
pub struct AppState {
    pub engine: Arc<TradeEngine>,
    pub reporter: Arc<dyn Reporter>,
    pub passphrase: String,
}

/// Response envelope for every webhook path.
#[derive(Debug, Serialize)]
pub struct SignalResponse {
    pub code: &'static str,
    pub message: String,
}

impl SignalResponse {
    fn success(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            code: "success",
            message: message.into(),
        })
    }

    fn error(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            code: "error",
            message: message.into(),
        })
    }
}

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ping", post(ping))
        .route("/webhook", post(webhook))
        .with_state(state)
}

/// Bind and serve until interrupted.
pub async fn serve(addr: SocketAddr, state: Arc<AppState>) -> Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "webhook server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
    info!("shutdown signal received");
}

async fn index() -> &'static str {
    "Hello, World!"
}

/// Keep-alive target so free-tier hosts don't idle the process out.
async fn ping() -> &'static str {
    "Pinged!"
}

/// Receive a signal, run it to a terminal state, and map that state to the
/// response envelope. This is also the top-level catch: any failure the
/// pipeline did not classify is reported with full detail and answered with
/// a generic error.
async fn webhook(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<WebhookPayload>, JsonRejection>,
) -> Json<SignalResponse> {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => {
            warn!(error = %rejection, "malformed webhook payload");
            return SignalResponse::error("invalid payload");
        }
    };

    let signal = match TradingSignal::from_payload(&payload, &state.passphrase) {
        Ok(signal) => signal,
        Err(ExecutionError::Authentication) => {
            state.reporter.alert("Incorrect Passcode!").await;
            return SignalResponse::error("Access Denied!");
        }
        Err(e) => {
            state
                .reporter
                .alert(&format!("Unusable buy/sell alert: {}", e))
                .await;
            return SignalResponse::error("incorrect order action");
        }
    };

    let side = signal.side;
    let span = info_span!(
        "invocation",
        id = %Uuid::new_v4(),
        pair = %signal.pair,
        side = %side
    );

    // Detached task: if the sender drops the connection mid-invocation, the
    // exchange sequence still runs to completion and the ledger still
    // reaches the reporter.
    let engine = state.engine.clone();
    let task = tokio::spawn(async move { engine.execute(&signal).await }.instrument(span));

    match task.await {
        Ok(Ok(Outcome::Opened(_))) => SignalResponse::success("order completed"),
        Ok(Ok(Outcome::ClosedOnly)) => match side {
            Side::Buy => SignalResponse::success("short canceled!"),
            Side::Sell => SignalResponse::success("long canceled!"),
        },
        Ok(Ok(Outcome::Failed)) => SignalResponse::error("order failed"),
        Ok(Err(ExecutionError::AlreadyInTrade)) => SignalResponse::error("Already in a Trade!"),
        Ok(Err(e)) => {
            state
                .reporter
                .alert(&format!("Invocation error: {}", e))
                .await;
            SignalResponse::error("internal error")
        }
        Err(join_error) => {
            state
                .reporter
                .alert(&format!("{:?} Crash!", join_error))
                .await;
            SignalResponse::error("internal error")
        }
    }
}
