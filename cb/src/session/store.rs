//! SessionStore - owns the table of live conversations

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use super::id::generate_session_id;
use crate::config::SessionConfig;
use crate::domain::{DiagnosisContext, Turn};

/// Errors from session lookups
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),
}

/// Shared handle to one session; lock it to read or mutate
pub type SessionHandle = Arc<Mutex<Session>>;

/// A locked session, owned for the length of one turn
pub type SessionGuard = OwnedMutexGuard<Session>;

/// A conversation: ordered turns plus the evolving diagnosis context
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    turns: Vec<Turn>,
    context: DiagnosisContext,
    created_at: DateTime<Utc>,
    last_active: DateTime<Utc>,
}

impl Session {
    fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            turns: Vec::new(),
            context: DiagnosisContext::default(),
            created_at: now,
            last_active: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Turns in insertion order
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn context(&self) -> &DiagnosisContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut DiagnosisContext {
        &mut self.context
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        self.last_active
    }

    /// History as it would read with `pending` appended, without committing it
    pub fn history_with(&self, pending: Option<&Turn>) -> Vec<Turn> {
        let mut history = self.turns.clone();
        history.extend(pending.cloned());
        history
    }

    /// Append a completed exchange; the user turn is optional, the reply is not
    pub fn record_exchange(&mut self, user: Option<Turn>, assistant: Turn) {
        debug!(session_id = %self.id, has_user = user.is_some(), "Session::record_exchange: called");
        self.turns.extend(user);
        self.turns.push(assistant);
        self.touch();
    }

    pub fn touch(&mut self) {
        self.last_active = Utc::now();
    }
}

/// Owner of all live sessions
///
/// The table lock is held only for lookups and inserts. Per-session work
/// happens under the session's own mutex, which callers may hold across
/// awaits without blocking other sessions.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    config: SessionConfig,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl SessionStore {
    pub fn new(config: SessionConfig) -> Self {
        debug!(?config, "SessionStore::new: called");
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
        }
    }

    fn read_table(&self) -> RwLockReadGuard<'_, HashMap<String, SessionHandle>> {
        self.sessions.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_table(&self) -> RwLockWriteGuard<'_, HashMap<String, SessionHandle>> {
        self.sessions.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Return the session for `id`, or mint a fresh one when `id` is absent or unknown
    ///
    /// Unknown ids are never adopted; the caller receives the newly minted id.
    pub fn get_or_create(&self, id: Option<&str>) -> (String, SessionHandle) {
        debug!(?id, "get_or_create: called");
        if let Some(id) = id.map(str::trim).filter(|id| !id.is_empty())
            && let Some(handle) = self.read_table().get(id)
        {
            debug!(%id, "get_or_create: existing session");
            return (id.to_string(), handle.clone());
        }

        let mut table = self.write_table();
        let mut new_id = generate_session_id();
        while table.contains_key(&new_id) {
            new_id = generate_session_id();
        }
        let handle: SessionHandle = Arc::new(Mutex::new(Session::new(new_id.clone())));
        table.insert(new_id.clone(), handle.clone());
        let evicted = evict(&mut table, &self.config, Utc::now(), Some(&new_id));
        info!(session_id = %new_id, live = table.len(), evicted, "Created session");

        (new_id, handle)
    }

    /// Look up an existing session
    pub fn get(&self, id: &str) -> Result<SessionHandle, SessionError> {
        debug!(%id, "get: called");
        self.read_table()
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    /// Resolve or mint a session and lock it for one turn
    pub async fn acquire(&self, id: Option<&str>) -> (String, SessionGuard) {
        debug!(?id, "acquire: called");
        let (id, handle) = self.get_or_create(id);
        let guard = self.hold(&id, handle).await;
        (id, guard)
    }

    /// Lock a resolved session handle for one turn
    ///
    /// Eviction skips locked sessions but may run between lookup and lock.
    /// If the table no longer maps `id` to this handle once the lock is
    /// taken, the session goes back in so the turn is not written into an
    /// orphan. The session is touched either way.
    pub async fn hold(&self, id: &str, handle: SessionHandle) -> SessionGuard {
        debug!(%id, "hold: called");
        let mut guard = handle.clone().lock_owned().await;
        guard.touch();

        let live = self.read_table().get(id).is_some_and(|h| Arc::ptr_eq(h, &handle));
        if !live {
            let mut table = self.write_table();
            table.insert(id.to_string(), handle);
            let evicted = evict(&mut table, &self.config, Utc::now(), Some(id));
            info!(session_id = %id, live = table.len(), evicted, "Restored session evicted before its turn");
        }
        guard
    }

    /// Apply `f` to a session under its lock
    pub async fn mutate<F, T>(&self, id: &str, f: F) -> Result<T, SessionError>
    where
        F: FnOnce(&mut Session) -> T,
    {
        debug!(%id, "mutate: called");
        let handle = self.get(id)?;
        let mut session = self.hold(id, handle).await;
        let out = f(&mut session);
        session.touch();
        Ok(out)
    }

    /// Consistent copy of a session, taken under its lock
    pub async fn snapshot(&self, id: &str) -> Result<Session, SessionError> {
        debug!(%id, "snapshot: called");
        let handle = self.get(id)?;
        let session = handle.lock().await;
        Ok(session.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read_table().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.read_table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_table().is_empty()
    }

    /// Evict idle and surplus sessions now
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    /// Evict relative to a given clock reading
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        debug!(%now, "sweep_at: called");
        let mut table = self.write_table();
        evict(&mut table, &self.config, now, None)
    }
}

/// Remove sessions idle past the TTL, then the least recently active ones
/// while the table is over capacity. Sessions with a turn in flight (lock
/// held) and `keep` are never removed.
fn evict(
    table: &mut HashMap<String, SessionHandle>,
    config: &SessionConfig,
    now: DateTime<Utc>,
    keep: Option<&str>,
) -> usize {
    let mut idle: Vec<(DateTime<Utc>, String)> = table
        .iter()
        .filter(|(id, _)| Some(id.as_str()) != keep)
        .filter_map(|(id, handle)| handle.try_lock().ok().map(|s| (s.last_active(), id.clone())))
        .collect();

    let ttl = i64::try_from(config.idle_ttl_secs).ok().and_then(TimeDelta::try_seconds);
    let mut removed = 0;

    if config.idle_ttl_secs > 0
        && let Some(ttl) = ttl
    {
        idle.retain(|(last_active, id)| {
            if now.signed_duration_since(*last_active) > ttl {
                debug!(session_id = %id, "evict: idle past ttl");
                table.remove(id);
                removed += 1;
                false
            } else {
                true
            }
        });
    }

    if table.len() > config.max_sessions {
        idle.sort();
        for (_, id) in idle {
            if table.len() <= config.max_sessions {
                break;
            }
            debug!(session_id = %id, "evict: over capacity");
            table.remove(&id);
            removed += 1;
        }
    }

    if removed > 0 {
        info!(removed, live = table.len(), "Evicted sessions");
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(max_sessions: usize, idle_ttl_secs: u64) -> SessionStore {
        SessionStore::new(SessionConfig {
            max_sessions,
            idle_ttl_secs,
        })
    }

    #[test]
    fn test_get_or_create_mints_id() {
        let store = SessionStore::default();
        let (id, _) = store.get_or_create(None);
        assert!(id.starts_with("session_"));
        assert!(store.contains(&id));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_or_create_returns_existing() {
        let store = SessionStore::default();
        let (id, first) = store.get_or_create(None);
        let (again, second) = store.get_or_create(Some(&id));
        assert_eq!(id, again);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_unknown_id_is_not_adopted() {
        let store = SessionStore::default();
        let (id, _) = store.get_or_create(Some("session_chosen_by_client"));
        assert_ne!(id, "session_chosen_by_client");
        assert!(!store.contains("session_chosen_by_client"));

        let (blank, _) = store.get_or_create(Some("  "));
        assert!(blank.starts_with("session_"));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_get_unknown_fails() {
        let store = SessionStore::default();
        assert!(matches!(store.get("nope"), Err(SessionError::NotFound(id)) if id == "nope"));
    }

    #[tokio::test]
    async fn test_mutate_and_snapshot() {
        let store = SessionStore::default();
        let (id, _) = store.get_or_create(None);

        store
            .mutate(&id, |s| s.record_exchange(Some(Turn::user("spots")), Turn::assistant("Leaf spot.")))
            .await
            .unwrap();

        let snapshot = store.snapshot(&id).await.unwrap();
        assert_eq!(snapshot.turns().len(), 2);
        assert_eq!(snapshot.turns()[0], Turn::user("spots"));
        assert_eq!(snapshot.turns()[1], Turn::assistant("Leaf spot."));
        assert_eq!(snapshot.id(), id);
    }

    #[tokio::test]
    async fn test_mutate_unknown_fails() {
        let store = SessionStore::default();
        let result = store.mutate("missing", |s| s.turns().len()).await;
        assert!(matches!(result, Err(SessionError::NotFound(_))));
    }

    #[test]
    fn test_history_with_pending_does_not_commit() {
        let session = Session::new("s".to_string());
        let pending = Turn::user("hello");
        let view = session.history_with(Some(&pending));
        assert_eq!(view.len(), 1);
        assert!(session.turns().is_empty());
    }

    #[test]
    fn test_sweep_removes_idle_sessions() {
        let store = store_with(100, 60);
        let (a, _) = store.get_or_create(None);
        let (b, _) = store.get_or_create(None);

        assert_eq!(store.sweep_at(Utc::now()), 0);

        let later = Utc::now() + TimeDelta::seconds(120);
        assert_eq!(store.sweep_at(later), 2);
        assert!(!store.contains(&a));
        assert!(!store.contains(&b));
    }

    #[test]
    fn test_zero_ttl_disables_idle_eviction() {
        let store = store_with(100, 0);
        store.get_or_create(None);
        assert_eq!(store.sweep_at(Utc::now() + TimeDelta::days(365)), 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_busy_sessions_are_never_evicted() {
        let store = store_with(100, 60);
        let (id, handle) = store.get_or_create(None);

        let _guard = handle.lock().await;
        assert_eq!(store.sweep_at(Utc::now() + TimeDelta::seconds(120)), 0);
        assert!(store.contains(&id));
    }

    #[tokio::test]
    async fn test_hold_restores_session_evicted_after_lookup() {
        let store = store_with(100, 60);
        let (id, _) = store.get_or_create(None);
        let (again, handle) = store.get_or_create(Some(&id));
        assert_eq!(again, id);

        // Expires between lookup and lock
        assert_eq!(store.sweep_at(Utc::now() + TimeDelta::seconds(120)), 1);
        assert!(!store.contains(&id));

        let mut session = store.hold(&id, handle).await;
        session.record_exchange(Some(Turn::user("spots")), Turn::assistant("Leaf spot."));
        drop(session);

        assert!(store.contains(&id));
        assert_eq!(store.snapshot(&id).await.unwrap().turns().len(), 2);
    }

    #[tokio::test]
    async fn test_hold_survives_capacity_eviction_by_other_caller() {
        let store = store_with(1, 0);
        let (id, handle) = store.get_or_create(None);

        // Another caller's new session pushes this one out before it is locked
        let (other, _) = store.get_or_create(None);
        assert!(!store.contains(&id));

        let mut session = store.hold(&id, handle).await;
        session.record_exchange(None, Turn::assistant("Rust disease."));
        assert!(store.contains(&id));
        assert!(!store.contains(&other));
        assert_eq!(store.len(), 1);
        drop(session);

        assert_eq!(store.snapshot(&id).await.unwrap().turns().len(), 1);
    }

    #[tokio::test]
    async fn test_hold_touches_session() {
        let store = store_with(100, 60);
        let (id, handle) = store.get_or_create(None);
        let before = store.snapshot(&id).await.unwrap().last_active();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let session = store.hold(&id, handle).await;
        assert!(session.last_active() > before);
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recently_active() {
        let store = store_with(2, 0);
        let (oldest, _) = store.get_or_create(None);
        let (middle, _) = store.get_or_create(None);

        // Refresh the oldest so the middle one becomes least recently active
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.mutate(&oldest, |s| s.touch()).await.unwrap();

        let (newest, _) = store.get_or_create(None);
        assert_eq!(store.len(), 2);
        assert!(store.contains(&oldest));
        assert!(!store.contains(&middle));
        assert!(store.contains(&newest));
    }
}
