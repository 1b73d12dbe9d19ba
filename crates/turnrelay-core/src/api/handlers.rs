//! Request handlers

use std::convert::Infallible;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use tokio_stream::{Stream, StreamExt};
use tracing::{instrument, warn};

use super::error::ApiError;
use super::AppState;
use crate::constants::http::SSE_KEEP_ALIVE;
use crate::controller::{ContinueRequest, StartRequest, TurnStream};
use crate::events::error::PLAN_NOT_FOUND;
use crate::events::{AgentEvent, RelayError};
use crate::plan::{ConversationEntry, Plan};

#[instrument(skip_all)]
pub async fn start_plan(
    State(state): State<AppState>,
    body: Result<Json<StartRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let Json(request) = body?;
    let turn = state.controller.start(request).await?;
    Ok(event_stream(turn))
}

#[instrument(skip_all)]
pub async fn continue_plan(
    State(state): State<AppState>,
    body: Result<Json<ContinueRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let Json(request) = body?;
    let turn = state.controller.resume(request).await?;
    Ok(event_stream(turn))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanView {
    #[serde(flatten)]
    pub plan: Plan,
    pub conversation: Vec<ConversationEntry>,
}

/// Plan with its transcript, the target of "view full output" links
pub async fn get_plan(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
) -> Result<Json<PlanView>, ApiError> {
    let store = state.controller.store();
    let plan = store
        .get_plan(&plan_id)
        .await
        .map_err(|e| RelayError::unknown(format!("Failed to load plan: {:#}", e)))?
        .ok_or_else(|| RelayError::session(PLAN_NOT_FOUND, format!("no plan {}", plan_id)))?;
    let conversation = store
        .conversation(&plan_id)
        .await
        .map_err(|e| RelayError::unknown(format!("Failed to load conversation: {:#}", e)))?;

    Ok(Json(PlanView { plan, conversation }))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn event_stream(turn: TurnStream) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = turn.into_stream().map(|event| Ok(to_sse_event(&event)));
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(SSE_KEEP_ALIVE)
            .text("keep-alive"),
    )
}

fn to_sse_event(event: &AgentEvent) -> Event {
    match serde_json::to_string(event) {
        Ok(json) => Event::default().data(json),
        Err(e) => {
            warn!("Failed to serialize {} event: {}", event.kind(), e);
            Event::default().comment("unserializable event")
        }
    }
}
