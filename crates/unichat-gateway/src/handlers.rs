// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway REST API.
//!
//! Bridge operations always answer with their structured result; the status
//! code only mirrors the failure reason. Room operations map
//! [`UnichatError`] onto status codes through [`ApiError`].

use std::collections::HashMap;
use std::str::FromStr;

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use unichat_bridge::{FailureReason, LoginMethod, LoginOptions, LoginOutcome};
use unichat_core::{Attachment, Platform, SessionId, UnichatError};
use unichat_sync::OutgoingMessage;

use crate::server::GatewayState;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// [`UnichatError`] rendered as a JSON error response.
#[derive(Debug)]
pub struct ApiError(pub UnichatError);

impl From<UnichatError> for ApiError {
    fn from(e: UnichatError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            UnichatError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            UnichatError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            UnichatError::Unsupported(_) => StatusCode::NOT_IMPLEMENTED,
            UnichatError::Timeout { .. } | UnichatError::BridgeTimeout { .. } => {
                StatusCode::GATEWAY_TIMEOUT
            }
            UnichatError::Protocol { status, .. } if (400..500).contains(status) => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            UnichatError::Protocol { .. }
            | UnichatError::CredentialExpired
            | UnichatError::Transport { .. }
            | UnichatError::Bridge { .. }
            | UnichatError::MediaUploadFailed { .. } => StatusCode::BAD_GATEWAY,
            UnichatError::Config(_) | UnichatError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            tracing::warn!(error = %self.0, "request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

fn parse_platform(raw: &str) -> Result<Platform, ApiError> {
    Platform::from_str(raw)
        .ok()
        .filter(|p| p.is_bridged())
        .ok_or_else(|| ApiError(UnichatError::InvalidInput(format!("unknown platform: {raw}"))))
}

fn outcome_status(outcome: &LoginOutcome) -> StatusCode {
    match outcome {
        LoginOutcome::Failure { reason } => match reason {
            FailureReason::InvalidInput => StatusCode::BAD_REQUEST,
            FailureReason::SessionNotFound => StatusCode::NOT_FOUND,
            FailureReason::Unsupported => StatusCode::NOT_IMPLEMENTED,
            FailureReason::Timeout => StatusCode::GATEWAY_TIMEOUT,
            FailureReason::BridgeError | FailureReason::Protocol => StatusCode::BAD_GATEWAY,
        },
        _ => StatusCode::OK,
    }
}

// --- Bridges ---

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub user_id: String,
    #[serde(default)]
    pub method: Option<LoginMethod>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub cookies: Option<HashMap<String, String>>,
}

/// POST /v1/bridges/{platform}/login
pub async fn post_login(
    State(state): State<GatewayState>,
    Path(platform): Path<String>,
    Json(body): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let platform = parse_platform(&platform)?;
    let options = LoginOptions {
        method: body.method,
        phone_number: body.phone_number,
        cookies: body.cookies,
    };
    let result = state
        .bridges
        .start_login(platform, &body.user_id, options)
        .await;
    Ok((outcome_status(&result.outcome), Json(result)).into_response())
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub session_id: String,
    #[serde(default)]
    pub code: String,
}

/// POST /v1/bridges/verify
pub async fn post_verify(
    State(state): State<GatewayState>,
    Json(body): Json<VerifyRequest>,
) -> Response {
    let result = state
        .bridges
        .submit_verification(&SessionId(body.session_id), &body.code)
        .await;
    (outcome_status(&result.outcome), Json(result)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub user_id: String,
    /// Read the stored status instead of asking the bot.
    #[serde(default)]
    pub cached: bool,
}

/// GET /v1/bridges/{platform}/status
pub async fn get_status(
    State(state): State<GatewayState>,
    Path(platform): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<Response, ApiError> {
    let platform = parse_platform(&platform)?;
    if query.cached {
        let status = state.bridges.cached_status(platform, Some(&query.user_id));
        return Ok(Json(serde_json::json!({
            "platform": platform,
            "connected": status.connected,
            "last_updated": status.last_updated,
        }))
        .into_response());
    }
    let report = state.bridges.check_status(platform, &query.user_id).await;
    Ok(Json(report).into_response())
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: String,
}

/// GET /v1/bridges/status
pub async fn get_all_status(
    State(state): State<GatewayState>,
    Query(query): Query<UserQuery>,
) -> Response {
    Json(state.bridges.check_all(&query.user_id).await).into_response()
}

#[derive(Debug, Deserialize)]
pub struct UserBody {
    pub user_id: String,
}

/// POST /v1/bridges/{platform}/disconnect
pub async fn post_disconnect(
    State(state): State<GatewayState>,
    Path(platform): Path<String>,
    Json(body): Json<UserBody>,
) -> Result<Response, ApiError> {
    let platform = parse_platform(&platform)?;
    let result = state.bridges.disconnect(platform, &body.user_id).await;
    Ok(Json(result).into_response())
}

// --- Rooms ---

/// GET /v1/rooms
pub async fn get_rooms(State(state): State<GatewayState>) -> Result<Response, ApiError> {
    let rooms = state.messaging.list_rooms().await?;
    Ok(Json(serde_json::json!({ "rooms": rooms })).into_response())
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    #[serde(default)]
    pub limit: Option<u32>,
    /// `end` token of the previous page.
    #[serde(default)]
    pub from: Option<String>,
}

/// GET /v1/rooms/{room}/messages
pub async fn get_messages(
    State(state): State<GatewayState>,
    Path(room_id): Path<String>,
    Query(query): Query<MessagesQuery>,
) -> Result<Response, ApiError> {
    let messages = state
        .messaging
        .get_room_messages(&room_id, query.limit, query.from.as_deref())
        .await?;
    Ok(Json(messages).into_response())
}

/// GET /v1/rooms/{room}/history
pub async fn get_history(
    State(state): State<GatewayState>,
    Path(room_id): Path<String>,
) -> Result<Response, ApiError> {
    let history = state.messaging.get_room_history(&room_id).await?;
    Ok(Json(history).into_response())
}

/// POST /v1/rooms/{room}/messages
///
/// Multipart fields: `user_id`, `text`, `reply_to`, and any number of
/// `files`.
pub async fn post_message(
    State(state): State<GatewayState>,
    Path(room_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut user_id = String::new();
    let mut message = OutgoingMessage::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| UnichatError::InvalidInput(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "files" | "file" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| UnichatError::InvalidInput(format!("unreadable file: {e}")))?;
                message.files.push(Attachment {
                    file_name,
                    content_type,
                    data: data.to_vec(),
                });
            }
            "text" | "user_id" | "reply_to" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| UnichatError::InvalidInput(format!("unreadable field: {e}")))?;
                match name.as_str() {
                    "text" => message.text = Some(value),
                    "user_id" => user_id = value,
                    _ => message.reply_to = Some(value).filter(|v| !v.is_empty()),
                }
            }
            other => tracing::debug!(field = other, "ignoring multipart field"),
        }
    }

    let report = state
        .messaging
        .send_message(&room_id, &user_id, message)
        .await?;
    let status = if report.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    Ok((status, Json(report)).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ReactionRequest {
    pub user_id: String,
    pub event_id: String,
    pub key: String,
}

/// POST /v1/rooms/{room}/reactions
pub async fn post_reaction(
    State(state): State<GatewayState>,
    Path(room_id): Path<String>,
    Json(body): Json<ReactionRequest>,
) -> Result<Response, ApiError> {
    let receipt = state
        .messaging
        .send_reaction(&room_id, &body.user_id, &body.event_id, &body.key)
        .await?;
    Ok(Json(receipt).into_response())
}

/// POST /v1/rooms/{room}/leave
pub async fn post_leave(
    State(state): State<GatewayState>,
    Path(room_id): Path<String>,
) -> Result<Response, ApiError> {
    state.messaging.leave_room(&room_id).await?;
    Ok(Json(serde_json::json!({ "success": true, "room_id": room_id })).into_response())
}

#[derive(Debug, Deserialize)]
pub struct GroupRequest {
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub topic: Option<String>,
}

/// POST /v1/groups
pub async fn post_group(
    State(state): State<GatewayState>,
    Json(body): Json<GroupRequest>,
) -> Result<Response, ApiError> {
    let created = state
        .messaging
        .create_group(&body.name, &body.members, body.topic.as_deref())
        .await?;
    Ok(Json(created).into_response())
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub term: String,
    #[serde(default = "default_search_limit")]
    pub limit: u32,
}

fn default_search_limit() -> u32 {
    10
}

/// POST /v1/users/search
pub async fn post_search(
    State(state): State<GatewayState>,
    Json(body): Json<SearchRequest>,
) -> Result<Response, ApiError> {
    let users = state.messaging.search_users(&body.term, body.limit).await?;
    Ok(Json(serde_json::json!({ "results": users })).into_response())
}

// --- Health ---

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub connections: usize,
    pub sync_loops: usize,
}

/// GET /health (unauthenticated)
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
        connections: state.dispatcher.registry().connection_count(),
        sync_loops: state.dispatcher.sync().active_loops(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_request_accepts_minimal_body() {
        let req: LoginRequest = serde_json::from_str(r#"{"user_id": "@a:hs"}"#).unwrap();
        assert_eq!(req.user_id, "@a:hs");
        assert!(req.method.is_none());
        assert!(req.cookies.is_none());
    }

    #[test]
    fn login_request_reads_method_and_phone() {
        let req: LoginRequest = serde_json::from_str(
            r#"{"user_id": "@a:hs", "method": "phone", "phone_number": "+15550100"}"#,
        )
        .unwrap();
        assert_eq!(req.method, Some(LoginMethod::Phone));
        assert_eq!(req.phone_number.as_deref(), Some("+15550100"));
    }

    #[test]
    fn platform_path_must_be_bridged() {
        assert_eq!(parse_platform("WhatsApp").unwrap(), Platform::Whatsapp);
        assert!(parse_platform("matrix").is_err());
        assert!(parse_platform("signal").is_err());
    }

    #[test]
    fn errors_map_to_status_codes() {
        let status = |e: UnichatError| ApiError(e).into_response().status();
        assert_eq!(status(UnichatError::InvalidInput("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status(UnichatError::Protocol {
                status: 403,
                errcode: Some("M_FORBIDDEN".into()),
                message: "no".into()
            }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status(UnichatError::Protocol {
                status: 500,
                errcode: None,
                message: "down".into()
            }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status(UnichatError::Unsupported("cookies".into())),
            StatusCode::NOT_IMPLEMENTED
        );
    }

    #[test]
    fn failures_carry_their_reason_as_status() {
        assert_eq!(
            outcome_status(&LoginOutcome::Failure {
                reason: FailureReason::SessionNotFound
            }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(outcome_status(&LoginOutcome::AlreadyConnected), StatusCode::OK);
    }

    #[test]
    fn search_limit_defaults_to_ten() {
        let req: SearchRequest = serde_json::from_str(r#"{"term": "bob"}"#).unwrap();
        assert_eq!(req.limit, 10);
    }
}
