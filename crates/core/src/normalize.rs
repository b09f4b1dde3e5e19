//! Inbound webhook normalization.
//!
//! Resolution happens in two steps so the session can be loaded by key in
//! between: [`resolve_identity`] is pure and decides whether the callback
//! starts a turn at all, [`apply_turn`] records the callback on the session
//! and produces the engine input.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::Serialize;

use crate::errors::BridgeError;
use crate::session::{Channel, SessionKey, SessionState};

/// Carrier callback fields this bridge reads. Everything is optional; the
/// carrier omits fields that do not apply to the event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InboundPayload {
    pub account_sid: Option<String>,
    pub api_version: Option<String>,
    pub call_sid: Option<String>,
    pub session_id: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub url_base: Option<String>,
    pub digits: Option<String>,
    pub speech_result: Option<String>,
    pub speech_result_error: Option<String>,
    pub body: Option<String>,
}

impl InboundPayload {
    pub fn from_params(params: &BTreeMap<String, String>) -> Self {
        let field = |name: &str| params.get(name).filter(|value| !value.is_empty()).cloned();
        Self {
            account_sid: field("AccountSid"),
            api_version: field("ApiVersion"),
            call_sid: field("CallSid"),
            session_id: field("SessionId"),
            from: field("From"),
            to: field("To"),
            url_base: field("UrlBase"),
            digits: field("Digits"),
            speech_result: field("SpeechResult"),
            speech_result_error: field("SpeechResultError"),
            body: field("Body"),
        }
    }

    /// The callback our own fallback redirect triggers after a silent gather.
    pub fn is_redirect_loopback(&self) -> bool {
        self.speech_result_error.as_deref() == Some("redirect")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnIdentity {
    pub key: SessionKey,
    pub channel: Channel,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnInput {
    pub user_id: String,
    pub session_id: String,
    pub text: String,
    pub data: TurnData,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnData {
    pub account_sid: String,
    pub api_version: String,
    pub call: bool,
    pub sms: bool,
    pub phone: String,
}

/// Returns `Ok(None)` for redirect loopbacks, which must not start a turn.
pub fn resolve_identity(
    payload: &InboundPayload,
    supported_version: &str,
    now: NaiveDateTime,
) -> Result<Option<TurnIdentity>, BridgeError> {
    let found = payload.api_version.as_deref().unwrap_or_default();
    if found != supported_version {
        return Err(BridgeError::VersionMismatch {
            expected: supported_version.to_string(),
            found: found.to_string(),
        });
    }

    if payload.is_redirect_loopback() {
        return Ok(None);
    }

    let user_id = payload.from.clone().unwrap_or_default();
    let channel = if payload.call_sid.is_some() { Channel::Call } else { Channel::Sms };
    let session_id = payload
        .call_sid
        .clone()
        .or_else(|| payload.session_id.clone())
        .unwrap_or_else(|| synthesize_session_id(&user_id, now));

    Ok(Some(TurnIdentity { key: SessionKey::new(user_id, session_id), channel }))
}

/// Fallback identity for messages without a correlation id: the sender
/// followed by an unpadded `year month day hour minute` stamp. Two sessions
/// from one address within the same minute share an id.
pub fn synthesize_session_id(user_id: &str, now: NaiveDateTime) -> String {
    format!(
        "{user_id}{}{}{}{}{}",
        now.year(),
        now.month(),
        now.day(),
        now.hour(),
        now.minute()
    )
}

pub fn apply_turn(
    payload: &InboundPayload,
    identity: &TurnIdentity,
    host: Option<&str>,
    session: &mut SessionState,
    default_num_digits: u32,
) -> TurnInput {
    if session.urlbase.as_deref().map_or(true, str::is_empty) {
        session.urlbase = host.filter(|host| !host.is_empty()).map(str::to_string);
    }
    session.from = payload.from.clone().unwrap_or_default();
    session.to = payload.to.clone().unwrap_or_default();
    session.channel = Some(identity.channel);
    session.number_of_digits = Some(default_num_digits);

    let text = match identity.channel {
        Channel::Call => resolve_voice_text(
            payload.digits.as_deref(),
            payload.speech_result.as_deref(),
            &session.menu,
        ),
        Channel::Sms => resolve_sms_text(payload.body.as_deref().unwrap_or_default(), &session.menu),
    };

    TurnInput {
        user_id: identity.key.user_id.clone(),
        session_id: identity.key.session_id.clone(),
        text,
        data: TurnData {
            account_sid: payload.account_sid.clone().unwrap_or_default(),
            api_version: payload.api_version.clone().unwrap_or_default(),
            call: identity.channel == Channel::Call,
            sms: identity.channel == Channel::Sms,
            phone: payload.from.clone().unwrap_or_default(),
        },
    }
}

fn resolve_voice_text(
    digits: Option<&str>,
    speech: Option<&str>,
    menu: &BTreeMap<String, String>,
) -> String {
    match digits {
        Some(digits) => menu_label(menu, digits)
            .unwrap_or_else(|| digits.chars().filter(|ch| !ch.is_whitespace()).collect()),
        None => speech.unwrap_or_default().to_string(),
    }
}

fn resolve_sms_text(body: &str, menu: &BTreeMap<String, String>) -> String {
    let single_digit = body.len() == 1 && body.as_bytes()[0].is_ascii_digit();
    if single_digit {
        if let Some(label) = menu_label(menu, body) {
            return label;
        }
    }
    body.to_string()
}

fn menu_label(menu: &BTreeMap<String, String>, token: &str) -> Option<String> {
    menu.get(token).filter(|label| !label.is_empty()).cloned()
}
