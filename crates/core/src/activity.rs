//! Engine output instructions.
//!
//! The engine emits activities as `{"name": "<kind>", "activityParams": {...}}`.
//! Unknown kinds and parameter blocks that cannot be decoded become
//! [`Activity::Ignored`] instead of failing the whole turn.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use tracing::warn;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "RawActivity")]
pub enum Activity {
    Handover(Handover),
    Prompt(Prompt),
    Hangup,
    Play(PlayParams),
    Record(RecordParams),
    Conference(ConferenceParams),
    Sms(SmsParams),
    Redirect(RedirectParams),
    Locale(LocaleParams),
    Ignored { name: String },
}

impl Activity {
    pub fn name(&self) -> &str {
        match self {
            Self::Handover(_) => "handover",
            Self::Prompt(_) => "prompt",
            Self::Hangup => "hangup",
            Self::Play(_) => "play",
            Self::Record(_) => "record",
            Self::Conference(_) => "conference",
            Self::Sms(_) => "sms",
            Self::Redirect(_) => "redirect",
            Self::Locale(_) => "locale",
            Self::Ignored { name } => name,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "handoverType", rename_all = "lowercase")]
pub enum Handover {
    Phone(PhoneHandover),
    Sip(SipHandover),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PhoneHandover {
    pub destination: String,
    pub from: Option<String>,
    pub callback_url: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SipHandover {
    pub user: String,
    pub domain: String,
    pub from: Option<String>,
    pub callback_url: Option<String>,
    pub connection: SipCredentials,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SipCredentials {
    pub username: String,
    pub password: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "promptType", rename_all = "lowercase")]
pub enum Prompt {
    #[serde(rename_all = "camelCase")]
    Menu {
        #[serde(default)]
        menu: BTreeMap<String, String>,
        #[serde(default)]
        menu_text: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Number {
        #[serde(default, deserialize_with = "lenient_count")]
        number_of_digits: Option<u32>,
        #[serde(default)]
        number_text: Option<String>,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PlayParams {
    pub url: Option<String>,
    pub text: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RecordParams {
    pub should_record: bool,
    pub action_url: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConferenceParams {
    pub conference_room: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SmsParams {
    pub from: Option<String>,
    pub to: Option<String>,
    pub text: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RedirectParams {
    pub url: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LocaleParams {
    pub language: Option<String>,
    pub voice: Option<String>,
}

/// A missing or non-string `name` decodes as an empty kind and is ignored.
#[derive(Deserialize)]
struct RawActivity {
    #[serde(default)]
    name: Value,
    #[serde(default, rename = "activityParams")]
    params: Value,
}

impl From<RawActivity> for Activity {
    fn from(raw: RawActivity) -> Self {
        let RawActivity { name, params } = raw;
        let name = match name {
            Value::String(name) => name,
            _ => String::new(),
        };
        let params = if params.is_null() { Value::Object(Map::new()) } else { params };

        let parsed = match name.as_str() {
            "handover" => serde_json::from_value(params).map(Self::Handover),
            "prompt" => serde_json::from_value(params).map(Self::Prompt),
            "hangup" => Ok(Self::Hangup),
            "play" => serde_json::from_value(params).map(Self::Play),
            "record" => serde_json::from_value(params).map(Self::Record),
            "conference" => serde_json::from_value(params).map(Self::Conference),
            "sms" => serde_json::from_value(params).map(Self::Sms),
            "redirect" => serde_json::from_value(params).map(Self::Redirect),
            "locale" => serde_json::from_value(params).map(Self::Locale),
            _ => return Self::Ignored { name },
        };

        parsed.unwrap_or_else(|error| {
            warn!(
                event_name = "engine.activity.malformed",
                activity = %name,
                error = %error,
                "ignoring activity with undecodable parameters"
            );
            Self::Ignored { name }
        })
    }
}

/// Digit counts arrive as numbers or numeric strings depending on the flow.
fn lenient_count<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(number)) => number.as_u64().and_then(|n| u32::try_from(n).ok()),
        Some(Value::String(raw)) => raw.trim().parse().ok(),
        _ => None,
    })
}

/// One engine output for a turn.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineOutput {
    pub text: Option<String>,
    /// `None` when the engine produced bare text with no structured payload.
    pub activities: Option<Vec<Activity>>,
}

impl EngineOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()), activities: None }
    }

    pub fn activities(activities: Vec<Activity>) -> Self {
        Self { text: None, activities: Some(activities) }
    }
}

/// Markup accumulated from one engine output.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderedOutput {
    pub text: Option<String>,
    /// `<Sms>` sub-document sent alongside a voice response.
    pub sms: Option<String>,
}

impl RenderedOutput {
    pub fn append_text(&mut self, fragment: &str) {
        match &mut self.text {
            Some(text) => text.push_str(fragment),
            None => self.text = Some(fragment.to_string()),
        }
    }
}

pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.is_empty())
}
