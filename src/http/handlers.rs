//! Axum HTTP handlers
//!
//! `POST /rpc` always answers `200 OK` for anything the dispatcher produced;
//! protocol errors travel in the JSON body.

use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::warn;

use crate::{errors::AppError, jsonrpc::codec::encode, AppState};

pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn rpc_endpoint(
    State(state): State<AppState>,
    body: Body,
) -> Result<Response, AppError> {
    let reply = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => state.dispatcher.dispatch(&bytes).await,
        Err(err) => {
            warn!(error = %err, "unable to read request body");
            state.dispatcher.reject_unreadable(err)
        }
    };

    match encode(&reply)? {
        Some(bytes) => Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            bytes,
        )
            .into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}
