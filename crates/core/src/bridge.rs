//! Per-request orchestration of a carrier webhook turn.

use std::collections::BTreeMap;

use chrono::{Local, NaiveDateTime};
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, warn};

use crate::assemble::CommandAssembler;
use crate::config::CarrierConfig;
use crate::dispatch::{ActivityDispatcher, CarrierDefaults};
use crate::engine::ConversationEngine;
use crate::errors::BridgeError;
use crate::normalize::{apply_turn, resolve_identity, InboundPayload};
use crate::session::{Channel, SessionStore};
use crate::signature;

/// One carrier callback as seen by the transport.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InboundRequest {
    /// `Host` header the carrier used to reach us.
    pub host: Option<String>,
    /// Value of the `x-zang-signature` header.
    pub signature: Option<String>,
    pub params: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    Reply { channel: Channel, markup: String },
    /// Loopback from our own fallback redirect; answer with an empty body.
    NoOp,
}

pub struct CarrierBridge<S, E> {
    store: S,
    engine: E,
    auth_token: Option<SecretString>,
    api_version: String,
    url_token: String,
    dispatcher: ActivityDispatcher,
    assembler: CommandAssembler,
}

impl<S, E> CarrierBridge<S, E>
where
    S: SessionStore,
    E: ConversationEngine,
{
    pub fn new(store: S, engine: E, carrier: &CarrierConfig) -> Self {
        let defaults = CarrierDefaults::from(carrier);
        Self {
            store,
            engine,
            auth_token: carrier.auth_token.clone(),
            api_version: carrier.api_version.clone(),
            url_token: carrier.url_token.clone(),
            dispatcher: ActivityDispatcher::new(defaults.clone()),
            assembler: CommandAssembler::new(defaults),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn url_token(&self) -> &str {
        &self.url_token
    }

    pub async fn handle(&self, request: InboundRequest) -> Result<TurnOutcome, BridgeError> {
        self.handle_at(request, Local::now().naive_local()).await
    }

    /// Same as [`Self::handle`] with an explicit clock for synthesized
    /// session ids.
    pub async fn handle_at(
        &self,
        request: InboundRequest,
        now: NaiveDateTime,
    ) -> Result<TurnOutcome, BridgeError> {
        let payload = InboundPayload::from_params(&request.params);
        self.verify(&payload, &request)?;

        let Some(identity) = resolve_identity(&payload, &self.api_version, now)? else {
            info!(
                event_name = "bridge.turn.noop",
                correlation_id = payload.call_sid.as_deref().unwrap_or_default(),
                "ignoring fallback redirect callback"
            );
            return Ok(TurnOutcome::NoOp);
        };
        let correlation_id = identity.key.session_id.as_str();
        info!(
            event_name = "bridge.turn.received",
            correlation_id,
            channel = identity.channel.as_str(),
            "carrier turn received"
        );

        let mut session = self.store.load(&identity.key).await?;
        let input = apply_turn(
            &payload,
            &identity,
            request.host.as_deref(),
            &mut session,
            self.dispatcher.defaults().num_digits,
        );

        let outputs = self.engine.execute(&input).await.map_err(|error| {
            warn!(event_name = "bridge.engine.failed", correlation_id, error = %error, "engine call failed");
            BridgeError::from(error)
        })?;
        info!(
            event_name = "bridge.engine.completed",
            correlation_id,
            outputs = outputs.len(),
            "engine produced outputs"
        );

        let rendered = outputs
            .iter()
            .map(|output| self.dispatcher.render(output, &mut session))
            .collect::<Vec<_>>();
        let callback_url =
            format!("https://{}/{}", session.urlbase.as_deref().unwrap_or_default(), self.url_token);
        let markup = self.assembler.assemble(&mut session, &callback_url, correlation_id, &rendered);

        self.store.save(&identity.key, &session).await?;
        info!(
            event_name = "bridge.turn.completed",
            correlation_id,
            channel = identity.channel.as_str(),
            "carrier turn answered"
        );

        Ok(TurnOutcome::Reply { channel: identity.channel, markup })
    }

    /// Voice callbacks are signed against the `UrlBase` they report.
    /// Messages carry no carrier signature.
    fn verify(&self, payload: &InboundPayload, request: &InboundRequest) -> Result<(), BridgeError> {
        let Some(secret) = &self.auth_token else {
            return Ok(());
        };
        if payload.call_sid.is_none() {
            return Ok(());
        }

        let canonical_url = payload.url_base.as_deref().unwrap_or_default();
        let verified = signature::verify(
            secret.expose_secret().as_bytes(),
            canonical_url,
            &request.params,
            request.signature.as_deref(),
        );
        if verified {
            Ok(())
        } else {
            warn!(
                event_name = "bridge.signature.rejected",
                correlation_id = payload.call_sid.as_deref().unwrap_or_default(),
                "carrier signature mismatch"
            );
            Err(BridgeError::AuthenticationFailure)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveDateTime};
    use serde_json::json;
    use tokio::sync::{Mutex, RwLock};

    use super::{CarrierBridge, InboundRequest, TurnOutcome};
    use crate::activity::EngineOutput;
    use crate::config::CarrierConfig;
    use crate::engine::{ConversationEngine, EngineError, FixedEngine};
    use crate::errors::BridgeError;
    use crate::normalize::TurnInput;
    use crate::session::{Channel, SessionKey, SessionState, SessionStore, SessionStoreError};
    use crate::signature::compute_signature;

    #[derive(Default)]
    struct TestStore {
        sessions: RwLock<HashMap<SessionKey, SessionState>>,
        saves: Mutex<usize>,
    }

    #[async_trait]
    impl SessionStore for TestStore {
        async fn load(&self, key: &SessionKey) -> Result<SessionState, SessionStoreError> {
            Ok(self.sessions.read().await.get(key).cloned().unwrap_or_default())
        }

        async fn save(&self, key: &SessionKey, state: &SessionState) -> Result<(), SessionStoreError> {
            *self.saves.lock().await += 1;
            self.sessions.write().await.insert(key.clone(), state.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingEngine {
        outputs: Vec<EngineOutput>,
        inputs: Mutex<Vec<TurnInput>>,
    }

    #[async_trait]
    impl ConversationEngine for RecordingEngine {
        async fn execute(&self, input: &TurnInput) -> Result<Vec<EngineOutput>, EngineError> {
            self.inputs.lock().await.push(input.clone());
            Ok(self.outputs.clone())
        }
    }

    struct FailingEngine;

    #[async_trait]
    impl ConversationEngine for FailingEngine {
        async fn execute(&self, _input: &TurnInput) -> Result<Vec<EngineOutput>, EngineError> {
            Err(EngineError::Transport("connection refused".to_string()))
        }
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 7)
            .and_then(|date| date.and_hms_opt(9, 5, 0))
            .expect("valid timestamp")
    }

    fn menu_prompt() -> EngineOutput {
        serde_json::from_value(json!({
            "activities": [{
                "name": "prompt",
                "activityParams": {
                    "promptType": "menu",
                    "menu": { "1": "sales" },
                    "menuText": "Press 1 for sales"
                }
            }]
        }))
        .expect("engine output decodes")
    }

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(key, value)| (key.to_string(), value.to_string())).collect()
    }

    fn voice_request(extra: &[(&str, &str)]) -> InboundRequest {
        let mut params = params(&[
            ("AccountSid", "AC1"),
            ("ApiVersion", "v2"),
            ("CallSid", "CA1"),
            ("From", "+15551230000"),
            ("To", "+18004567890"),
        ]);
        params.extend(extra.iter().map(|(key, value)| (key.to_string(), value.to_string())));
        InboundRequest { host: Some("bridge.example.com".to_string()), signature: None, params }
    }

    #[tokio::test]
    async fn voice_turn_renders_menu_gather_with_redirect_marker() {
        let store = Arc::new(TestStore::default());
        let engine = Arc::new(RecordingEngine { outputs: vec![menu_prompt()], ..RecordingEngine::default() });
        let bridge = CarrierBridge::new(store.clone(), engine.clone(), &CarrierConfig::default());

        let outcome = bridge
            .handle_at(voice_request(&[("SpeechResult", "sales")]), now())
            .await
            .expect("turn succeeds");

        assert_eq!(
            outcome,
            TurnOutcome::Reply {
                channel: Channel::Call,
                markup: "<Response><Gather method=\"POST\" action=\"https://bridge.example.com/carrier\" input=\"speech dtmf\" language=\"en-US\" timeout=\"10\" numDigits=\"1\"><Say language=\"en-US\" voice=\"woman\">Press 1 for sales</Say></Gather><Redirect method=\"POST\">https://bridge.example.com/carrier?PlayStatus=completed&SpeechResult=&SpeechResultError=redirect&Confidence=0</Redirect></Response>".to_string(),
            }
        );

        let inputs = engine.inputs.lock().await;
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].text, "sales");
        assert_eq!(inputs[0].session_id, "CA1");

        let key = SessionKey::new("+15551230000", "CA1");
        let saved = store.load(&key).await.expect("load");
        assert_eq!(saved.menu.get("1").map(String::as_str), Some("sales"));
        assert_eq!(saved.urlbase.as_deref(), Some("bridge.example.com"));
        assert_eq!(*store.saves.lock().await, 1);
    }

    #[tokio::test]
    async fn next_turn_resolves_digits_through_saved_menu() {
        let store = Arc::new(TestStore::default());
        let engine = Arc::new(RecordingEngine { outputs: vec![menu_prompt()], ..RecordingEngine::default() });
        let bridge = CarrierBridge::new(store, engine.clone(), &CarrierConfig::default());

        bridge.handle_at(voice_request(&[]), now()).await.expect("first turn");
        bridge.handle_at(voice_request(&[("Digits", "1")]), now()).await.expect("second turn");

        let inputs = engine.inputs.lock().await;
        assert_eq!(inputs[1].text, "sales");
    }

    #[tokio::test]
    async fn redirect_loopback_is_a_no_op_without_side_effects() {
        let store = Arc::new(TestStore::default());
        let engine = Arc::new(RecordingEngine::default());
        let bridge = CarrierBridge::new(store.clone(), engine.clone(), &CarrierConfig::default());
        let request = voice_request(&[("SpeechResultError", "redirect"), ("PlayStatus", "completed")]);

        for _ in 0..2 {
            let outcome = bridge.handle_at(request.clone(), now()).await.expect("no-op");
            assert_eq!(outcome, TurnOutcome::NoOp);
        }

        assert!(engine.inputs.lock().await.is_empty());
        assert_eq!(*store.saves.lock().await, 0);
        assert!(store.sessions.read().await.is_empty());
    }

    #[tokio::test]
    async fn bad_signature_fails_before_any_mutation() {
        let store = Arc::new(TestStore::default());
        let engine = Arc::new(RecordingEngine::default());
        let carrier = CarrierConfig {
            auth_token: Some("carrier-secret".to_string().into()),
            ..CarrierConfig::default()
        };
        let bridge = CarrierBridge::new(store.clone(), engine.clone(), &carrier);
        let mut request = voice_request(&[("UrlBase", "https://bridge.example.com/carrier")]);
        request.signature = Some("bm90LXRoZS1zaWduYXR1cmU=".to_string());

        let error = bridge.handle_at(request, now()).await.expect_err("rejected");

        assert_eq!(error, BridgeError::AuthenticationFailure);
        assert!(engine.inputs.lock().await.is_empty());
        assert_eq!(*store.saves.lock().await, 0);
    }

    #[tokio::test]
    async fn valid_signature_is_accepted() {
        let carrier = CarrierConfig {
            auth_token: Some("carrier-secret".to_string().into()),
            ..CarrierConfig::default()
        };
        let bridge = CarrierBridge::new(
            Arc::new(TestStore::default()),
            FixedEngine::new(vec![EngineOutput::text("Hi")]),
            &carrier,
        );
        let mut request = voice_request(&[("UrlBase", "https://bridge.example.com/carrier")]);
        request.signature = Some(compute_signature(
            b"carrier-secret",
            "https://bridge.example.com/carrier",
            &request.params,
        ));

        let outcome = bridge.handle_at(request, now()).await.expect("accepted");

        assert!(matches!(outcome, TurnOutcome::Reply { channel: Channel::Call, .. }));
    }

    #[tokio::test]
    async fn unsupported_version_is_rejected() {
        let bridge = CarrierBridge::new(
            Arc::new(TestStore::default()),
            FixedEngine::default(),
            &CarrierConfig::default(),
        );

        let error = bridge
            .handle_at(voice_request(&[("ApiVersion", "v1")]), now())
            .await
            .expect_err("mismatch");

        assert!(matches!(error, BridgeError::VersionMismatch { .. }));
    }

    #[tokio::test]
    async fn sms_turn_replies_with_swapped_addresses() {
        let bridge = CarrierBridge::new(
            Arc::new(TestStore::default()),
            FixedEngine::new(vec![EngineOutput::text("Thanks!")]),
            &CarrierConfig::default(),
        );
        let request = InboundRequest {
            host: Some("bridge.example.com".to_string()),
            signature: None,
            params: params(&[
                ("ApiVersion", "v2"),
                ("From", "+15551230000"),
                ("To", "+18004567890"),
                ("Body", "hello"),
            ]),
        };

        let outcome = bridge.handle_at(request, now()).await.expect("sms turn");

        assert_eq!(
            outcome,
            TurnOutcome::Reply {
                channel: Channel::Sms,
                markup: "<Response><Sms action=\"https://bridge.example.com/carrier?SessionId=+1555123000020263795\" From=\"+18004567890\" To=\"+15551230000\">Thanks!</Sms></Response>".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn engine_failure_propagates_without_saving() {
        let store = Arc::new(TestStore::default());
        let bridge = CarrierBridge::new(store.clone(), FailingEngine, &CarrierConfig::default());

        let error = bridge.handle_at(voice_request(&[]), now()).await.expect_err("engine down");

        assert!(matches!(error, BridgeError::Engine(EngineError::Transport(_))));
        assert_eq!(*store.saves.lock().await, 0);
    }
}
