//! Engine output to carrier markup.
//!
//! Each engine output is rendered independently into a [`RenderedOutput`].
//! Activities that end interactive input only raise a flag on the session;
//! the assembler decides what the final response looks like.

use tracing::debug;

use crate::activity::{
    non_empty, Activity, ConferenceParams, EngineOutput, Handover, LocaleParams, PlayParams,
    Prompt, RecordParams, RedirectParams, RenderedOutput, SmsParams,
};
use crate::config::CarrierConfig;
use crate::markup;
use crate::session::{Channel, SessionState};

/// Carrier-level fallbacks used while rendering a turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CarrierDefaults {
    pub language: String,
    pub voice: String,
    pub caller_id: String,
    pub num_digits: u32,
    pub gather_timeout_secs: u32,
    pub max_conference_parties: u32,
}

impl Default for CarrierDefaults {
    fn default() -> Self {
        Self::from(&CarrierConfig::default())
    }
}

impl From<&CarrierConfig> for CarrierDefaults {
    fn from(config: &CarrierConfig) -> Self {
        Self {
            language: config.default_language.clone(),
            voice: config.default_voice.clone(),
            caller_id: config.default_caller_id.clone(),
            num_digits: config.default_num_digits,
            gather_timeout_secs: config.gather_timeout_secs,
            max_conference_parties: config.max_conference_parties,
        }
    }
}

impl CarrierDefaults {
    pub fn language<'a>(&'a self, session: &'a SessionState) -> &'a str {
        non_empty(&session.language).unwrap_or(&self.language)
    }

    pub fn voice<'a>(&'a self, session: &'a SessionState) -> &'a str {
        non_empty(&session.voice).unwrap_or(&self.voice)
    }

    fn say(&self, session: &SessionState, text: &str) -> String {
        markup::say(self.language(session), self.voice(session), text)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ActivityDispatcher {
    defaults: CarrierDefaults,
}

impl ActivityDispatcher {
    pub fn new(defaults: CarrierDefaults) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> &CarrierDefaults {
        &self.defaults
    }

    /// Renders one engine output. Bare text on a voice channel is spoken;
    /// outputs carrying activities start from their text as given.
    pub fn render(&self, output: &EngineOutput, session: &mut SessionState) -> RenderedOutput {
        let mut rendered = RenderedOutput { text: output.text.clone(), sms: None };

        match &output.activities {
            Some(activities) => {
                for activity in activities {
                    self.apply(activity, session, &mut rendered);
                }
            }
            None => {
                if session.channel() == Channel::Call {
                    if let Some(text) = &output.text {
                        rendered.text = Some(self.defaults.say(session, text));
                    }
                }
            }
        }

        rendered
    }

    pub fn apply(&self, activity: &Activity, session: &mut SessionState, output: &mut RenderedOutput) {
        match activity {
            Activity::Handover(handover) => self.handover(handover, session, output),
            Activity::Prompt(prompt) => self.prompt(prompt, session, output),
            Activity::Hangup => session.flags.hangup = true,
            Activity::Play(params) => play(params, session, output),
            Activity::Record(params) => record(params, session),
            Activity::Conference(params) => self.conference(params, session, output),
            Activity::Sms(params) => sms(params, session, output),
            Activity::Redirect(params) => redirect(params, session, output),
            Activity::Locale(params) => locale(params, session),
            Activity::Ignored { name } => {
                debug!(event_name = "dispatch.activity.ignored", activity = %name, "skipping activity");
            }
        }
    }

    fn handover(&self, handover: &Handover, session: &mut SessionState, output: &mut RenderedOutput) {
        let dial = match handover {
            Handover::Phone(phone) => {
                let caller_id = self.caller_id(&phone.from, &phone.destination, session);
                markup::dial_number(&caller_id, non_empty(&phone.callback_url), &phone.destination)
            }
            Handover::Sip(sip) => {
                let caller_id = self.caller_id(&sip.from, "", session);
                markup::dial_sip(
                    &caller_id,
                    non_empty(&sip.callback_url),
                    &sip.connection.username,
                    &sip.connection.password,
                    &format!("{}@{}", sip.user, sip.domain),
                )
            }
        };
        output.append_text(&dial);
        session.flags.dial = true;
    }

    fn caller_id(&self, from: &Option<String>, destination: &str, session: &SessionState) -> String {
        if let Some(from) = non_empty(from) {
            return from.to_string();
        }
        if !session.to.is_empty() {
            return session.to.clone();
        }
        if !destination.is_empty() && destination == session.from {
            return self.defaults.caller_id.clone();
        }
        String::new()
    }

    fn prompt(&self, prompt: &Prompt, session: &mut SessionState, output: &mut RenderedOutput) {
        let text = match prompt {
            Prompt::Menu { menu, menu_text } => {
                session.menu = menu.clone();
                session.number_of_digits = Some(self.defaults.num_digits);
                menu_text
            }
            Prompt::Number { number_of_digits, number_text } => {
                session.number_of_digits = Some(number_of_digits.unwrap_or(self.defaults.num_digits));
                number_text
            }
        };

        if let Some(text) = non_empty(text) {
            output.text = Some(match session.channel() {
                Channel::Sms => text.to_string(),
                Channel::Call => self.defaults.say(session, text),
            });
        }
    }

    fn conference(
        &self,
        params: &ConferenceParams,
        session: &mut SessionState,
        output: &mut RenderedOutput,
    ) {
        session.flags.conference = true;
        let room = params.conference_room.as_deref().unwrap_or_default();
        let room = room.strip_prefix('+').unwrap_or(room);
        output.append_text(&markup::conference(room, self.defaults.max_conference_parties));
    }
}

fn play(params: &PlayParams, session: &SessionState, output: &mut RenderedOutput) {
    match session.channel() {
        Channel::Call => {
            if let Some(url) = non_empty(&params.url) {
                output.append_text(&markup::play(url));
            }
        }
        Channel::Sms => output.text = params.text.clone(),
    }
}

fn record(params: &RecordParams, session: &mut SessionState) {
    session.record = params
        .should_record
        .then(|| markup::record(params.action_url.as_deref().unwrap_or_default()));
}

fn sms(params: &SmsParams, session: &mut SessionState, output: &mut RenderedOutput) {
    session.flags.sms = true;
    match session.channel() {
        Channel::Call => {
            let from = non_empty(&params.from).unwrap_or(&session.to);
            let to = non_empty(&params.to).unwrap_or(&session.from);
            output.sms = Some(markup::voice_sms(from, to, params.text.as_deref().unwrap_or_default()));
        }
        Channel::Sms => output.text = params.text.clone(),
    }
}

fn redirect(params: &RedirectParams, session: &mut SessionState, output: &mut RenderedOutput) {
    session.flags.redirect = true;
    if let Some(url) = non_empty(&params.url) {
        output.append_text(&markup::redirect(url));
    }
}

fn locale(params: &LocaleParams, session: &mut SessionState) {
    session.language = params.language.clone();
    session.voice = params.voice.clone();
}
