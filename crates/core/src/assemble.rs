//! Final carrier document for a turn.

use crate::activity::RenderedOutput;
use crate::dispatch::CarrierDefaults;
use crate::markup::{self, GatherSpec};
use crate::session::{Channel, CommandMode, SessionState};

#[derive(Clone, Debug, Default)]
pub struct CommandAssembler {
    defaults: CarrierDefaults,
}

impl CommandAssembler {
    pub fn new(defaults: CarrierDefaults) -> Self {
        Self { defaults }
    }

    /// Builds the response document and consumes the turn's one-shot
    /// controls. Must run exactly once per turn.
    pub fn assemble(
        &self,
        session: &mut SessionState,
        callback_url: &str,
        session_id: &str,
        outputs: &[RenderedOutput],
    ) -> String {
        let number_of_digits = session.number_of_digits.unwrap_or(self.defaults.num_digits);
        let (flags, record) = session.take_controls();
        session.number_of_digits = Some(self.defaults.num_digits);

        let text = join(outputs.iter().map(|output| output.text.as_deref()));

        match session.channel() {
            Channel::Sms => markup::response(&markup::sms_reply(
                &format!("{callback_url}?SessionId={session_id}"),
                &session.to,
                &session.from,
                &text,
            )),
            Channel::Call => {
                let sms = if flags.sms {
                    join(outputs.iter().map(|output| output.sms.as_deref()))
                } else {
                    String::new()
                };
                let control = match flags.command_mode() {
                    CommandMode::Terminal => text,
                    CommandMode::Gather => markup::gather(
                        GatherSpec {
                            action: callback_url,
                            language: self.defaults.language(session),
                            timeout_secs: self.defaults.gather_timeout_secs,
                            num_digits: number_of_digits,
                        },
                        &text,
                    ),
                };
                markup::response(&format!("{}{sms}{control}", record.unwrap_or_default()))
            }
        }
    }
}

fn join<'a>(parts: impl Iterator<Item = Option<&'a str>>) -> String {
    parts.map(Option::unwrap_or_default).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::CommandAssembler;
    use crate::activity::RenderedOutput;
    use crate::session::{Channel, ControlFlags, SessionState};

    const URL: &str = "https://bridge.example.com/carrier";

    fn voice_session() -> SessionState {
        SessionState {
            channel: Some(Channel::Call),
            from: "+15551230000".to_string(),
            to: "+18004567890".to_string(),
            ..SessionState::default()
        }
    }

    fn spoken(text: &str) -> RenderedOutput {
        RenderedOutput { text: Some(text.to_string()), sms: None }
    }

    #[test]
    fn interactive_voice_turn_gathers_then_redirects() {
        let mut session = SessionState { number_of_digits: Some(4), ..voice_session() };

        let markup = CommandAssembler::default().assemble(&mut session, URL, "CA1", &[spoken("<Say>Hi</Say>")]);

        assert_eq!(
            markup,
            "<Response><Gather method=\"POST\" action=\"https://bridge.example.com/carrier\" input=\"speech dtmf\" language=\"en-US\" timeout=\"10\" numDigits=\"4\"><Say>Hi</Say></Gather><Redirect method=\"POST\">https://bridge.example.com/carrier?PlayStatus=completed&SpeechResult=&SpeechResultError=redirect&Confidence=0</Redirect></Response>"
        );
        assert_eq!(session.number_of_digits, Some(1));
    }

    #[test]
    fn dial_takes_precedence_and_omits_gather() {
        let mut session = SessionState {
            flags: ControlFlags { dial: true, ..ControlFlags::default() },
            ..voice_session()
        };

        let markup = CommandAssembler::default().assemble(
            &mut session,
            URL,
            "CA1",
            &[spoken("<Dial callerId=\"+18004567890\">+15550001111</Dial>")],
        );

        assert_eq!(
            markup,
            "<Response><Dial callerId=\"+18004567890\">+15550001111</Dial></Response>"
        );
        assert!(!markup.contains("<Gather"));
    }

    #[test]
    fn record_and_sms_side_channel_precede_the_prompt() {
        let mut session = SessionState {
            flags: ControlFlags { sms: true, hangup: true, ..ControlFlags::default() },
            record: Some("<Record/>".to_string()),
            ..voice_session()
        };
        let outputs = [
            RenderedOutput { text: Some("<Say>Bye</Say>".to_string()), sms: Some("<Sms>a</Sms>".to_string()) },
            RenderedOutput { text: None, sms: None },
        ];

        let markup = CommandAssembler::default().assemble(&mut session, URL, "CA1", &outputs);

        assert_eq!(markup, "<Response><Record/><Sms>a</Sms>\n<Say>Bye</Say>\n</Response>");
    }

    #[test]
    fn side_channel_is_dropped_when_sms_flag_is_not_set() {
        let mut session = SessionState {
            flags: ControlFlags { hangup: true, ..ControlFlags::default() },
            ..voice_session()
        };
        let outputs = [RenderedOutput { text: None, sms: Some("<Sms>a</Sms>".to_string()) }];

        let markup = CommandAssembler::default().assemble(&mut session, URL, "CA1", &outputs);

        assert_eq!(markup, "<Response></Response>");
    }

    #[test]
    fn every_control_flag_is_cleared_after_assembly() {
        for channel in [Channel::Call, Channel::Sms] {
            let mut session = SessionState {
                channel: Some(channel),
                flags: ControlFlags {
                    dial: true,
                    hangup: true,
                    conference: true,
                    sms: true,
                    redirect: true,
                },
                record: Some("<Record/>".to_string()),
                number_of_digits: Some(6),
                ..voice_session()
            };

            CommandAssembler::default().assemble(&mut session, URL, "S1", &[spoken("x")]);

            assert_eq!(session.flags, ControlFlags::default(), "{channel:?}");
            assert!(session.record.is_none());
            assert_eq!(session.number_of_digits, Some(1));
        }
    }

    #[test]
    fn sms_reply_swaps_addresses() {
        let mut session = SessionState { channel: Some(Channel::Sms), ..voice_session() };

        let markup = CommandAssembler::default().assemble(
            &mut session,
            URL,
            "S-42",
            &[spoken("Hello"), spoken("World")],
        );

        assert_eq!(
            markup,
            "<Response><Sms action=\"https://bridge.example.com/carrier?SessionId=S-42\" From=\"+18004567890\" To=\"+15551230000\">Hello\nWorld</Sms></Response>"
        );
    }
}
