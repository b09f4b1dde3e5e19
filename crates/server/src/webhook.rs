//! Carrier callback endpoint.

use std::collections::BTreeMap;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use callbridge_core::errors::InterfaceError;
use callbridge_core::signature::SIGNATURE_HEADER;
use callbridge_core::{InboundRequest, TurnOutcome};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::bootstrap::SharedBridge;

const XML_CONTENT_TYPE: &str = "application/xml";

#[derive(Clone)]
pub struct WebhookState {
    bridge: SharedBridge,
}

impl WebhookState {
    pub fn new(bridge: SharedBridge) -> Self {
        Self { bridge }
    }
}

pub fn router(bridge: SharedBridge) -> Router {
    let path = format!("/{}", bridge.url_token());
    Router::new().route(&path, post(inbound)).with_state(WebhookState::new(bridge))
}

pub async fn inbound(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let params = match parse_params(&headers, &body) {
        Ok(params) => params,
        Err(message) => {
            warn!(event_name = "webhook.payload.rejected", error = %message, "unreadable callback body");
            return (StatusCode::BAD_REQUEST, message).into_response();
        }
    };
    let correlation_id = params
        .get("CallSid")
        .or_else(|| params.get("SessionId"))
        .cloned()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let request = InboundRequest {
        host: header_value(&headers, header::HOST.as_str()),
        signature: header_value(&headers, SIGNATURE_HEADER),
        params,
    };

    match state.bridge.handle(request).await {
        Ok(TurnOutcome::Reply { channel, markup }) => {
            info!(
                event_name = "webhook.reply.sent",
                correlation_id = %correlation_id,
                channel = channel.as_str(),
                "carrier reply sent"
            );
            xml(markup)
        }
        Ok(TurnOutcome::NoOp) => xml(String::new()),
        Err(bridge_error) => {
            let interface = bridge_error.into_interface(correlation_id);
            let status = status_for(&interface);
            if status.is_server_error() {
                error!(
                    event_name = "webhook.turn.failed",
                    correlation_id = %interface.correlation_id(),
                    error = %interface,
                    "carrier turn failed"
                );
            } else {
                warn!(
                    event_name = "webhook.turn.rejected",
                    correlation_id = %interface.correlation_id(),
                    error = %interface,
                    "carrier turn rejected"
                );
            }
            (status, interface.user_message()).into_response()
        }
    }
}

fn xml(markup: String) -> Response {
    (StatusCode::OK, [(header::CONTENT_TYPE, XML_CONTENT_TYPE)], markup).into_response()
}

fn status_for(error: &InterfaceError) -> StatusCode {
    match error {
        InterfaceError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|value| value.to_str().ok()).map(str::to_string)
}

/// Carriers post form bodies; JSON is accepted for local tooling.
fn parse_params(headers: &HeaderMap, body: &[u8]) -> Result<BTreeMap<String, String>, String> {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));

    if !is_json {
        return Ok(url::form_urlencoded::parse(body).into_owned().collect());
    }

    let object: serde_json::Map<String, Value> =
        serde_json::from_slice(body).map_err(|error| format!("invalid JSON body: {error}"))?;
    Ok(object
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(text) => Some((key, text)),
            other => Some((key, other.to_string())),
        })
        .collect())
}
