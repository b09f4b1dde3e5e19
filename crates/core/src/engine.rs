use async_trait::async_trait;
use thiserror::Error;

use crate::activity::EngineOutput;
use crate::normalize::TurnInput;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("engine transport failure: {0}")]
    Transport(String),
    #[error("engine returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("engine response could not be decoded: {0}")]
    Decode(String),
    #[error("engine flow failure: {0}")]
    Flow(String),
}

/// Bot execution engine. One call per turn; outputs are dispatched in order.
#[async_trait]
pub trait ConversationEngine: Send + Sync {
    async fn execute(&self, input: &TurnInput) -> Result<Vec<EngineOutput>, EngineError>;
}

#[async_trait]
impl<E> ConversationEngine for std::sync::Arc<E>
where
    E: ConversationEngine + ?Sized,
{
    async fn execute(&self, input: &TurnInput) -> Result<Vec<EngineOutput>, EngineError> {
        (**self).execute(input).await
    }
}

/// Engine that answers every turn with the same outputs.
#[derive(Clone, Debug, Default)]
pub struct FixedEngine {
    outputs: Vec<EngineOutput>,
}

impl FixedEngine {
    pub fn new(outputs: Vec<EngineOutput>) -> Self {
        Self { outputs }
    }
}

#[async_trait]
impl ConversationEngine for FixedEngine {
    async fn execute(&self, _input: &TurnInput) -> Result<Vec<EngineOutput>, EngineError> {
        Ok(self.outputs.clone())
    }
}
