//! Conversation engines for the carrier bridge.
//!
//! - `rest`: posts each turn to a remote flow endpoint.
//! - `scripted`: answers from a local JSON script, or a built-in demo menu.
//! - `runtime`: picks one of the above from `EngineConfig`.

pub mod rest;
pub mod runtime;
pub mod scripted;

pub use rest::RestFlowClient;
pub use runtime::{AgentError, AgentRuntime};
pub use scripted::{FlowScript, ScriptedFlow};
