use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use callbridge_core::config::DEFAULT_SESSION_TTL_SECS;
use callbridge_core::session::{SessionKey, SessionState, SessionStore, SessionStoreError};

struct StoredSession {
    state: SessionState,
    updated_at: Instant,
}

impl StoredSession {
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.updated_at) > ttl
    }
}

/// Process-local store. Sessions untouched for longer than `ttl` read as
/// empty and are evicted on the next save.
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionKey, StoredSession>>,
    ttl: Duration,
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_SESSION_TTL_SECS))
    }
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self { sessions: RwLock::new(HashMap::new()), ttl }
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, key: &SessionKey) -> Result<SessionState, SessionStoreError> {
        let sessions = self.sessions.read().await;
        let now = Instant::now();
        Ok(sessions
            .get(key)
            .filter(|stored| !stored.is_expired(now, self.ttl))
            .map(|stored| stored.state.clone())
            .unwrap_or_default())
    }

    async fn save(&self, key: &SessionKey, state: &SessionState) -> Result<(), SessionStoreError> {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        evict_expired(&mut sessions, now, self.ttl);
        sessions.insert(key.clone(), StoredSession { state: state.clone(), updated_at: now });
        Ok(())
    }
}

/// Returns how many sessions were removed.
fn evict_expired(
    sessions: &mut HashMap<SessionKey, StoredSession>,
    now: Instant,
    ttl: Duration,
) -> usize {
    let before = sessions.len();
    sessions.retain(|_, stored| !stored.is_expired(now, ttl));
    before - sessions.len()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::{Duration, Instant};

    use callbridge_core::session::{Channel, SessionKey, SessionState, SessionStore};

    use super::{evict_expired, InMemorySessionStore};

    fn menu_state() -> SessionState {
        SessionState {
            channel: Some(Channel::Call),
            menu: BTreeMap::from([("1".to_string(), "sales".to_string())]),
            ..SessionState::default()
        }
    }

    #[tokio::test]
    async fn unknown_key_loads_empty_state() {
        let store = InMemorySessionStore::default();

        let state = store.load(&SessionKey::new("+1555", "CA1")).await.expect("load");

        assert_eq!(state, SessionState::default());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn sessions_are_isolated_by_user_and_session_id() {
        let store = InMemorySessionStore::default();
        let first = SessionKey::new("+1555", "CA1");
        let second = SessionKey::new("+1555", "CA2");

        store.save(&first, &menu_state()).await.expect("save");

        assert_eq!(store.load(&first).await.expect("load first"), menu_state());
        assert_eq!(store.load(&second).await.expect("load second"), SessionState::default());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn finished_sessions_are_evicted_on_save() {
        let store = InMemorySessionStore::new(Duration::from_millis(1));
        for index in 0..100 {
            store
                .save(&SessionKey::new("+1555", format!("CA{index}")), &menu_state())
                .await
                .expect("save");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;

        store.save(&SessionKey::new("+1555", "CA-last"), &menu_state()).await.expect("save");

        assert_eq!(store.len().await, 1);
        assert_eq!(
            store.load(&SessionKey::new("+1555", "CA0")).await.expect("load"),
            SessionState::default()
        );
    }

    #[tokio::test]
    async fn eviction_keeps_live_sessions() {
        let store = InMemorySessionStore::new(Duration::from_secs(60));
        store.save(&SessionKey::new("+1555", "CA1"), &menu_state()).await.expect("save");
        store.save(&SessionKey::new("+1555", "CA2"), &menu_state()).await.expect("save");

        let mut sessions = store.sessions.write().await;
        assert_eq!(evict_expired(&mut sessions, Instant::now(), store.ttl), 0);
        assert_eq!(sessions.len(), 2);

        let later = Instant::now() + Duration::from_secs(61);
        assert_eq!(evict_expired(&mut sessions, later, store.ttl), 2);
        assert!(sessions.is_empty());
    }
}
