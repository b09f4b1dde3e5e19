use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

use callbridge_core::activity::EngineOutput;
use callbridge_core::engine::{ConversationEngine, EngineError};
use callbridge_core::normalize::TurnInput;

#[derive(Debug, Deserialize)]
struct FlowResponse {
    #[serde(default)]
    outputs: Vec<EngineOutput>,
}

/// Remote flow endpoint. Each turn is one `POST` of the turn input as JSON.
pub struct RestFlowClient {
    client: Client,
    endpoint: String,
    api_key: Option<SecretString>,
}

impl RestFlowClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| EngineError::Transport(error.to_string()))?;
        Ok(Self { client, endpoint: endpoint.into(), api_key })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ConversationEngine for RestFlowClient {
    async fn execute(&self, input: &TurnInput) -> Result<Vec<EngineOutput>, EngineError> {
        let mut request = self.client.post(&self.endpoint).json(input);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request.send().await.map_err(|error| {
            warn!(
                event_name = "engine.rest.request_failed",
                correlation_id = %input.session_id,
                error = %error,
                "flow endpoint request failed"
            );
            EngineError::Transport(error.to_string())
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| EngineError::Transport(error.to_string()))?;
        if !status.is_success() {
            return Err(EngineError::Status { status: status.as_u16(), body });
        }

        let outputs = parse_flow_response(&body)?;
        debug!(
            event_name = "engine.rest.completed",
            correlation_id = %input.session_id,
            outputs = outputs.len(),
            "flow endpoint answered"
        );
        Ok(outputs)
    }
}

pub(crate) fn parse_flow_response(body: &str) -> Result<Vec<EngineOutput>, EngineError> {
    serde_json::from_str::<FlowResponse>(body)
        .map(|response| response.outputs)
        .map_err(|error| EngineError::Decode(error.to_string()))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use callbridge_core::activity::{Activity, EngineOutput};
    use callbridge_core::engine::EngineError;

    use super::{parse_flow_response, RestFlowClient};

    #[test]
    fn flow_response_decodes_text_and_activities() {
        let outputs = parse_flow_response(
            r#"{"outputs":[{"text":"Hi"},{"activities":[{"name":"hangup"}]}]}"#,
        )
        .expect("decodes");

        assert_eq!(
            outputs,
            vec![EngineOutput::text("Hi"), EngineOutput::activities(vec![Activity::Hangup])]
        );
    }

    #[test]
    fn nameless_activity_does_not_fail_the_response() {
        let outputs = parse_flow_response(
            r#"{"outputs":[{"text":"Hi"},{"activities":[{"activityParams":{}},{"name":7},{"name":"hangup"}]}]}"#,
        )
        .expect("decodes");

        assert_eq!(outputs.len(), 2);
        assert_eq!(
            outputs[1].activities,
            Some(vec![
                Activity::Ignored { name: String::new() },
                Activity::Ignored { name: String::new() },
                Activity::Hangup,
            ])
        );
    }

    #[test]
    fn empty_response_object_means_no_outputs() {
        assert_eq!(parse_flow_response("{}").expect("decodes"), Vec::new());
    }

    #[test]
    fn non_json_response_is_a_decode_error() {
        assert!(matches!(parse_flow_response("<html>"), Err(EngineError::Decode(_))));
    }

    #[test]
    fn client_keeps_endpoint() {
        let client =
            RestFlowClient::new("https://flows.example.com/turn", None, Duration::from_secs(5))
                .expect("client builds");

        assert_eq!(client.endpoint(), "https://flows.example.com/turn");
    }
}
