//! Carrier response grammar.
//!
//! Attribute names, attribute order and element nesting are fixed by the
//! carrier and are reproduced exactly. Text and attribute values are
//! emitted as given; the engine is trusted to supply carrier-safe content.

use crate::signature::REDIRECT_PARAMS;

pub fn response(body: &str) -> String {
    format!("<Response>{body}</Response>")
}

pub fn say(language: &str, voice: &str, text: &str) -> String {
    format!("<Say language=\"{language}\" voice=\"{voice}\">{text}</Say>")
}

pub fn play(url: &str) -> String {
    format!("<Play>{url}</Play>")
}

pub fn dial_number(caller_id: &str, callback_url: Option<&str>, destination: &str) -> String {
    format!("<Dial{}>{destination}</Dial>", dial_attributes(caller_id, callback_url))
}

pub fn dial_sip(
    caller_id: &str,
    callback_url: Option<&str>,
    username: &str,
    password: &str,
    sip_uri: &str,
) -> String {
    format!(
        "<Dial{}><Sip username=\"{username}\" password=\"{password}\">{sip_uri};transport=tcp</Sip></Dial>",
        dial_attributes(caller_id, callback_url)
    )
}

fn dial_attributes(caller_id: &str, callback_url: Option<&str>) -> String {
    let mut attributes = format!(" callerId=\"{caller_id}\"");
    if let Some(callback_url) = callback_url {
        attributes.push_str(&format!(" callbackUrl=\"{callback_url}\""));
    }
    attributes
}

pub fn conference(room: &str, max_participants: u32) -> String {
    format!(
        "<Dial><Conference startConferenceOnEnter=\"true\" maxParticipants=\"{max_participants}\">{room}</Conference></Dial>"
    )
}

/// `<Sms>` sub-document sent from within a voice response.
pub fn voice_sms(from: &str, to: &str, text: &str) -> String {
    format!("<Sms from=\"{from}\" to=\"{to}\">{text}</Sms>")
}

/// Reply to an inbound message; the carrier calls `action` with the outcome.
pub fn sms_reply(action: &str, from: &str, to: &str, text: &str) -> String {
    format!("<Sms action=\"{action}\" From=\"{from}\" To=\"{to}\">{text}</Sms>")
}

pub fn redirect(url: &str) -> String {
    format!("<Redirect method=\"POST\">{url}</Redirect>")
}

pub fn record(action_url: &str) -> String {
    format!("<Record method=\"POST\" finishOnKey=\"#\" action=\"{action_url}\"/>")
}

#[derive(Clone, Copy, Debug)]
pub struct GatherSpec<'a> {
    pub action: &'a str,
    pub language: &'a str,
    pub timeout_secs: u32,
    pub num_digits: u32,
}

/// Speech and DTMF gather around `prompt`, followed by the fallback redirect
/// the carrier follows when the caller stays silent.
pub fn gather(options: GatherSpec<'_>, prompt: &str) -> String {
    let GatherSpec { action, language, timeout_secs, num_digits } = options;
    format!(
        "<Gather method=\"POST\" action=\"{action}\" input=\"speech dtmf\" language=\"{language}\" timeout=\"{timeout_secs}\" numDigits=\"{num_digits}\">{prompt}</Gather>{}",
        redirect(&format!("{action}{REDIRECT_PARAMS}"))
    )
}
