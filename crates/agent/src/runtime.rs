use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use callbridge_core::activity::EngineOutput;
use callbridge_core::config::{EngineConfig, EngineProvider};
use callbridge_core::engine::{ConversationEngine, EngineError};
use callbridge_core::normalize::TurnInput;

use crate::rest::RestFlowClient;
use crate::scripted::ScriptedFlow;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("engine provider `rest` requires `engine.endpoint_url`")]
    MissingEndpoint,
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// The configured conversation engine.
pub enum AgentRuntime {
    Rest(RestFlowClient),
    Scripted(ScriptedFlow),
}

impl AgentRuntime {
    pub fn from_config(config: &EngineConfig) -> Result<Self, AgentError> {
        let runtime = match config.provider {
            EngineProvider::Rest => {
                let endpoint = config.endpoint_url.clone().ok_or(AgentError::MissingEndpoint)?;
                Self::Rest(RestFlowClient::new(
                    endpoint,
                    config.api_key.clone(),
                    Duration::from_secs(config.timeout_secs.max(1)),
                )?)
            }
            EngineProvider::Scripted => match &config.script_path {
                Some(path) => Self::Scripted(ScriptedFlow::from_path(path)?),
                None => Self::Scripted(ScriptedFlow::demo()),
            },
        };

        info!(event_name = "engine.runtime.ready", provider = runtime.provider(), "engine ready");
        Ok(runtime)
    }

    pub fn provider(&self) -> &'static str {
        match self {
            Self::Rest(_) => "rest",
            Self::Scripted(_) => "scripted",
        }
    }
}

#[async_trait]
impl ConversationEngine for AgentRuntime {
    async fn execute(&self, input: &TurnInput) -> Result<Vec<EngineOutput>, EngineError> {
        match self {
            Self::Rest(client) => client.execute(input).await,
            Self::Scripted(flow) => flow.execute(input).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use callbridge_core::config::{EngineConfig, EngineProvider};

    use super::{AgentError, AgentRuntime};

    fn engine_config(provider: EngineProvider) -> EngineConfig {
        EngineConfig {
            provider,
            endpoint_url: None,
            api_key: None,
            timeout_secs: 5,
            script_path: None,
        }
    }

    #[test]
    fn scripted_provider_without_script_uses_demo_flow() {
        let runtime =
            AgentRuntime::from_config(&engine_config(EngineProvider::Scripted)).expect("runtime");

        assert_eq!(runtime.provider(), "scripted");
    }

    #[test]
    fn rest_provider_requires_endpoint() {
        let error = AgentRuntime::from_config(&engine_config(EngineProvider::Rest))
            .err()
            .expect("missing endpoint");

        assert!(matches!(error, AgentError::MissingEndpoint));
    }

    #[test]
    fn rest_provider_builds_client() {
        let config = EngineConfig {
            endpoint_url: Some("https://flows.example.com/turn".to_string()),
            ..engine_config(EngineProvider::Rest)
        };

        let runtime = AgentRuntime::from_config(&config).expect("runtime");

        assert_eq!(runtime.provider(), "rest");
    }
}
