use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use callbridge_agent::{AgentRuntime, ScriptedFlow};
use callbridge_core::config::{AppConfig, LoadOptions};
use callbridge_core::engine::ConversationEngine;
use callbridge_core::signature::compute_signature;
use callbridge_core::{CarrierBridge, InboundRequest, TurnOutcome};
use callbridge_db::InMemorySessionStore;
use secrecy::ExposeSecret;
use serde_json::Value;

use crate::commands::{parse_params, CommandResult};

#[derive(Debug, Clone, Default)]
pub struct SimulateArgs {
    pub payload: Option<PathBuf>,
    pub params: Vec<String>,
    pub script: Option<PathBuf>,
    pub host: String,
}

pub fn run(args: SimulateArgs) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "simulate",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let params = match collect_params(args.payload.as_deref(), &args.params) {
        Ok(params) => params,
        Err(message) => return CommandResult::failure("simulate", "invalid_input", message, 3),
    };

    let engine: Arc<dyn ConversationEngine> = match &args.script {
        Some(path) => match ScriptedFlow::from_path(path) {
            Ok(flow) => Arc::new(flow),
            Err(error) => {
                return CommandResult::failure("simulate", "engine_init", error.to_string(), 3)
            }
        },
        None => match AgentRuntime::from_config(&config.engine) {
            Ok(runtime) => Arc::new(runtime),
            Err(error) => {
                return CommandResult::failure("simulate", "engine_init", error.to_string(), 3)
            }
        },
    };

    let signature = config.carrier.auth_token.as_ref().and_then(|secret| {
        let url_base = params.get("UrlBase")?;
        Some(compute_signature(secret.expose_secret().as_bytes(), url_base, &params))
    });
    let request = InboundRequest { host: Some(args.host), signature, params };
    let store = InMemorySessionStore::new(config.session.ttl());
    let bridge = CarrierBridge::new(store, engine, &config.carrier);

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "simulate",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    match runtime.block_on(bridge.handle(request)) {
        Ok(TurnOutcome::Reply { markup, .. }) => CommandResult::success("simulate", markup),
        Ok(TurnOutcome::NoOp) => {
            CommandResult::success("simulate", "no-op: fallback redirect callbacks are ignored")
        }
        Err(error) => CommandResult::failure("simulate", "turn_rejected", error.to_string(), 4),
    }
}

/// Payload file parameters first, then `--param` values on top.
fn collect_params(
    payload: Option<&Path>,
    raw_params: &[String],
) -> Result<BTreeMap<String, String>, String> {
    let mut params = match payload {
        Some(path) => read_payload(path)?,
        None => BTreeMap::new(),
    };
    params.extend(parse_params(raw_params)?);
    Ok(params)
}

fn read_payload(path: &Path) -> Result<BTreeMap<String, String>, String> {
    let raw = fs::read_to_string(path)
        .map_err(|error| format!("could not read payload `{}`: {error}", path.display()))?;
    let object: serde_json::Map<String, Value> = serde_json::from_str(&raw)
        .map_err(|error| format!("payload `{}` is not a JSON object: {error}", path.display()))?;

    Ok(object
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(text) => Some((key, text)),
            other => Some((key, other.to_string())),
        })
        .collect())
}
