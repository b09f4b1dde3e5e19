//! Local flow driven by a JSON script.
//!
//! ```json
//! {
//!   "greeting": [ { "text": "Welcome" } ],
//!   "replies": { "sales": [ { "activities": [ { "name": "hangup" } ] } ] },
//!   "fallback": [ { "text": "Sorry?" } ]
//! }
//! ```
//!
//! An empty turn text answers with `greeting`. Otherwise the trimmed,
//! lowercased text selects an entry of `replies`, falling back to `fallback`.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use callbridge_core::activity::{Activity, EngineOutput, Handover, PhoneHandover, Prompt};
use callbridge_core::engine::{ConversationEngine, EngineError};
use callbridge_core::normalize::TurnInput;

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FlowScript {
    pub greeting: Vec<EngineOutput>,
    pub replies: BTreeMap<String, Vec<EngineOutput>>,
    pub fallback: Vec<EngineOutput>,
}

impl FlowScript {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let mut script: Self = serde_json::from_str(raw)?;
        script.replies = std::mem::take(&mut script.replies)
            .into_iter()
            .map(|(key, outputs)| (normalize_key(&key), outputs))
            .collect();
        Ok(script)
    }

    /// Menu demo used when no script file is configured.
    pub fn demo() -> Self {
        let menu = BTreeMap::from([
            ("1".to_string(), "sales".to_string()),
            ("2".to_string(), "support".to_string()),
        ]);
        let main_menu = EngineOutput::activities(vec![Activity::Prompt(Prompt::Menu {
            menu,
            menu_text: Some("Press 1 for sales or 2 for support.".to_string()),
        })]);

        Self {
            greeting: vec![EngineOutput::text("Welcome to Callbridge."), main_menu.clone()],
            replies: BTreeMap::from([
                (
                    "sales".to_string(),
                    vec![
                        EngineOutput::text("Connecting you to sales."),
                        EngineOutput::activities(vec![Activity::Handover(Handover::Phone(
                            PhoneHandover {
                                destination: "+15550001111".to_string(),
                                ..PhoneHandover::default()
                            },
                        ))]),
                    ],
                ),
                (
                    "support".to_string(),
                    vec![
                        EngineOutput::text("Support is closed right now. Goodbye."),
                        EngineOutput::activities(vec![Activity::Hangup]),
                    ],
                ),
            ]),
            fallback: vec![EngineOutput::text("Sorry, I did not catch that."), main_menu],
        }
    }

    pub fn respond(&self, text: &str) -> &[EngineOutput] {
        let key = normalize_key(text);
        if key.is_empty() {
            return &self.greeting;
        }
        self.replies.get(&key).map_or(self.fallback.as_slice(), Vec::as_slice)
    }
}

fn normalize_key(text: &str) -> String {
    text.trim().to_lowercase()
}

pub struct ScriptedFlow {
    script: FlowScript,
}

impl ScriptedFlow {
    pub fn new(script: FlowScript) -> Self {
        Self { script }
    }

    pub fn demo() -> Self {
        Self::new(FlowScript::demo())
    }

    pub fn from_path(path: &Path) -> Result<Self, EngineError> {
        let raw = std::fs::read_to_string(path).map_err(|error| {
            EngineError::Flow(format!("could not read flow script `{}`: {error}", path.display()))
        })?;
        FlowScript::from_json(&raw).map(Self::new).map_err(|error| {
            EngineError::Flow(format!("could not parse flow script `{}`: {error}", path.display()))
        })
    }

    pub fn script(&self) -> &FlowScript {
        &self.script
    }
}

#[async_trait]
impl ConversationEngine for ScriptedFlow {
    async fn execute(&self, input: &TurnInput) -> Result<Vec<EngineOutput>, EngineError> {
        let outputs = self.script.respond(&input.text).to_vec();
        debug!(
            event_name = "engine.scripted.matched",
            correlation_id = %input.session_id,
            outputs = outputs.len(),
            "scripted flow answered"
        );
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use callbridge_core::activity::{Activity, EngineOutput};
    use callbridge_core::engine::{ConversationEngine, EngineError};
    use callbridge_core::normalize::{TurnData, TurnInput};

    use super::{FlowScript, ScriptedFlow};

    fn input(text: &str) -> TurnInput {
        TurnInput {
            user_id: "+15551230000".to_string(),
            session_id: "CA1".to_string(),
            text: text.to_string(),
            data: TurnData {
                account_sid: "AC1".to_string(),
                api_version: "v2".to_string(),
                call: true,
                sms: false,
                phone: "+15551230000".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn demo_greets_on_empty_text_and_routes_menu_labels() {
        let flow = ScriptedFlow::demo();

        let greeting = flow.execute(&input("")).await.expect("greeting");
        assert_eq!(greeting[0], EngineOutput::text("Welcome to Callbridge."));

        let support = flow.execute(&input(" Support ")).await.expect("support");
        assert_eq!(support.last(), Some(&EngineOutput::activities(vec![Activity::Hangup])));

        let unknown = flow.execute(&input("billing")).await.expect("fallback");
        assert_eq!(unknown[0], EngineOutput::text("Sorry, I did not catch that."));
    }

    #[test]
    fn script_keys_are_matched_case_insensitively() {
        let script = FlowScript::from_json(
            r#"{"replies":{"Sales":[{"text":"ok"}]},"fallback":[{"text":"?"}]}"#,
        )
        .expect("script parses");

        assert_eq!(script.respond("SALES"), &[EngineOutput::text("ok")]);
        assert_eq!(script.respond("other"), &[EngineOutput::text("?")]);
        assert!(script.respond("").is_empty());
    }

    #[test]
    fn script_file_loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"greeting":[{{"text":"hello"}}]}}"#).expect("write script");

        let flow = ScriptedFlow::from_path(file.path()).expect("load script");

        assert_eq!(flow.script().greeting, vec![EngineOutput::text("hello")]);
    }

    #[test]
    fn unreadable_script_is_a_flow_error() {
        let error = ScriptedFlow::from_path(std::path::Path::new("/nonexistent/flow.json"))
            .err()
            .expect("missing file");

        assert!(matches!(error, EngineError::Flow(ref message) if message.contains("could not read")));
    }
}
