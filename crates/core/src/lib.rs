pub mod activity;
pub mod assemble;
pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod errors;
pub mod markup;
pub mod normalize;
pub mod session;
pub mod signature;

pub use activity::{Activity, EngineOutput, Handover, Prompt, RenderedOutput};
pub use assemble::CommandAssembler;
pub use bridge::{CarrierBridge, InboundRequest, TurnOutcome};
pub use dispatch::{ActivityDispatcher, CarrierDefaults};
pub use engine::{ConversationEngine, EngineError, FixedEngine};
pub use errors::{BridgeError, InterfaceError};
pub use normalize::{InboundPayload, TurnData, TurnIdentity, TurnInput};
pub use session::{
    Channel, CommandMode, ControlFlags, SessionKey, SessionState, SessionStore, SessionStoreError,
};
