//! Per-conversation state keyed by `(user_id, session_id)`.
//!
//! A turn loads the state once, threads it by `&mut` through input
//! normalization, activity dispatch, and command assembly, then saves it
//! once. Control flags are one-shot: they are set during dispatch and
//! consumed by exactly one assembly call per turn.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub user_id: String,
    pub session_id: String,
}

impl SessionKey {
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), session_id: session_id.into() }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.session_id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Call,
    Sms,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Sms => "sms",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFlags {
    pub dial: bool,
    pub hangup: bool,
    pub conference: bool,
    pub sms: bool,
    pub redirect: bool,
}

/// How the voice response ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandMode {
    /// Listen for speech or digits, then loop back through the callback.
    Gather,
    /// A transfer, hangup, conference, or redirect ends interactive input.
    Terminal,
}

impl ControlFlags {
    pub fn command_mode(&self) -> CommandMode {
        if self.dial || self.hangup || self.conference || self.redirect {
            CommandMode::Terminal
        } else {
            CommandMode::Gather
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    pub channel: Option<Channel>,
    pub from: String,
    pub to: String,
    /// Active menu: input token to resolved label.
    pub menu: BTreeMap<String, String>,
    pub number_of_digits: Option<u32>,
    pub language: Option<String>,
    pub voice: Option<String>,
    /// Host the carrier reached us on; set on the first turn and kept.
    pub urlbase: Option<String>,
    pub flags: ControlFlags,
    /// Rendered `<Record/>` directive waiting for assembly.
    pub record: Option<String>,
}

impl SessionState {
    pub fn channel(&self) -> Channel {
        self.channel.unwrap_or(Channel::Call)
    }

    pub fn is_sms(&self) -> bool {
        self.channel() == Channel::Sms
    }

    /// Returns the pending flags and record directive, leaving both cleared.
    pub fn take_controls(&mut self) -> (ControlFlags, Option<String>) {
        (std::mem::take(&mut self.flags), self.record.take())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionStoreError {
    #[error("session store backend failure: {0}")]
    Backend(String),
    #[error("session state for `{key}` could not be decoded: {message}")]
    Decode { key: String, message: String },
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the stored state, or an empty state on first access.
    async fn load(&self, key: &SessionKey) -> Result<SessionState, SessionStoreError>;
    async fn save(&self, key: &SessionKey, state: &SessionState) -> Result<(), SessionStoreError>;
}

#[async_trait]
impl<S> SessionStore for std::sync::Arc<S>
where
    S: SessionStore + ?Sized,
{
    async fn load(&self, key: &SessionKey) -> Result<SessionState, SessionStoreError> {
        (**self).load(key).await
    }

    async fn save(&self, key: &SessionKey, state: &SessionState) -> Result<(), SessionStoreError> {
        (**self).save(key, state).await
    }
}
