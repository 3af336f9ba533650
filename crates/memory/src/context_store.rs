//! Context store: append-only, time-ordered log of exchanges.
//!
//! Mutations take a single lock over the log, so `append` and
//! `set_response` are atomic with respect to each other and the
//! at-most-once response rule holds even when the store is shared.
//!
//! Snapshot layout on disk:
//!
//! ```json
//! {"conversations": [{"timestamp": "...", "user_input": "...", "context": {}, "response": "..."}],
//!  "context": {}}
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use parley_core::error::ContextError;
use parley_core::exchange::{ContextMap, Exchange, ExchangeHandle};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Serialized form of the whole store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub conversations: Vec<Exchange>,

    #[serde(default)]
    pub context: ContextMap,
}

#[derive(Default)]
struct Inner {
    exchanges: Vec<Exchange>,
    context: ContextMap,
}

/// The exchange log plus a free-form auxiliary context map.
#[derive(Default)]
pub struct ContextStore {
    inner: Mutex<Inner>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave an exchange half-written,
        // so a poisoned guard is still consistent.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a new input with no response yet.
    ///
    /// The timestamp is never earlier than the previous exchange's, even if
    /// the wall clock steps backwards.
    pub fn append(&self, input: impl Into<String>, context: ContextMap) -> ExchangeHandle {
        let mut inner = self.lock();
        let now = Utc::now();
        let timestamp = match inner.exchanges.last() {
            Some(prev) if prev.timestamp > now => prev.timestamp,
            _ => now,
        };
        let exchange = Exchange::new(input, context, timestamp);
        let handle = exchange.handle();
        inner.exchanges.push(exchange);
        debug!(handle = %handle, len = inner.exchanges.len(), "Exchange appended");
        handle
    }

    /// Assign the response for `handle`. Fails if the exchange is gone or
    /// already has a response; the first value is never overwritten.
    pub fn set_response(
        &self,
        handle: &ExchangeHandle,
        response: impl Into<String>,
    ) -> Result<(), ContextError> {
        let mut inner = self.lock();
        let exchange = inner
            .exchanges
            .iter_mut()
            .find(|e| &e.id == handle)
            .ok_or_else(|| ContextError::InvalidHandle(format!("{handle}: no such exchange")))?;

        if exchange.response.is_some() {
            return Err(ContextError::InvalidHandle(format!(
                "{handle}: response already set"
            )));
        }

        exchange.response = Some(response.into());
        Ok(())
    }

    /// The last `limit` exchanges in chronological order.
    pub fn window(&self, limit: usize) -> Vec<Exchange> {
        let inner = self.lock();
        tail(&inner.exchanges, limit)
    }

    /// The last `limit` exchanges recorded before `handle`, excluding the
    /// exchange itself and anything appended after it.
    ///
    /// An unknown handle yields the window over the whole log.
    pub fn window_before(&self, handle: &ExchangeHandle, limit: usize) -> Vec<Exchange> {
        let inner = self.lock();
        let end = inner
            .exchanges
            .iter()
            .position(|e| &e.id == handle)
            .unwrap_or(inner.exchanges.len());
        tail(&inner.exchanges[..end], limit)
    }

    pub fn get(&self, handle: &ExchangeHandle) -> Option<Exchange> {
        self.lock().exchanges.iter().find(|e| &e.id == handle).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().exchanges.is_empty()
    }

    /// Drop every exchange and the auxiliary context.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.exchanges.clear();
        inner.context.clear();
    }

    // --- Auxiliary context map ---

    pub fn set_context(&self, key: impl Into<String>, value: serde_json::Value) {
        self.lock().context.insert(key.into(), value);
    }

    pub fn context_value(&self, key: &str) -> Option<serde_json::Value> {
        self.lock().context.get(key).cloned()
    }

    pub fn context_map(&self) -> ContextMap {
        self.lock().context.clone()
    }

    // --- Snapshots ---

    pub fn snapshot(&self) -> Snapshot {
        let inner = self.lock();
        Snapshot {
            conversations: inner.exchanges.clone(),
            context: inner.context.clone(),
        }
    }

    /// Replace the whole state with `snapshot`.
    pub fn restore(&self, snapshot: Snapshot) {
        let mut inner = self.lock();
        inner.exchanges = snapshot.conversations;
        inner.context = snapshot.context;
    }

    pub fn to_json(&self) -> Result<String, ContextError> {
        serde_json::to_string_pretty(&self.snapshot())
            .map_err(|e| ContextError::Storage(format!("Failed to serialize state: {e}")))
    }

    /// Restore from a JSON blob, or report why it could not be read. The
    /// store is left unchanged on error.
    pub fn try_restore_json(&self, blob: &str) -> Result<(), ContextError> {
        let snapshot = serde_json::from_str::<Snapshot>(blob)
            .map_err(|e| ContextError::Corrupt(e.to_string()))?;
        self.restore(snapshot);
        Ok(())
    }

    /// Restore from a JSON blob. A corrupt blob leaves the store unchanged
    /// and returns `false`.
    pub fn restore_json(&self, blob: &str) -> bool {
        match self.try_restore_json(blob) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Ignoring conversation snapshot");
                false
            }
        }
    }

    /// Write the snapshot to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ContextError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                ContextError::Storage(format!("Failed to create state directory: {e}"))
            })?;
        }

        let json = self.to_json()?;
        std::fs::write(path, json)
            .map_err(|e| ContextError::Storage(format!("Failed to write state file: {e}")))?;

        debug!(path = %path.display(), "Conversation state saved");
        Ok(())
    }

    /// Load the snapshot at `path`. A missing or corrupt file leaves the
    /// store as it was; returns whether anything was loaded.
    ///
    /// A corrupt file is renamed to `<path>.corrupt` so the next save does
    /// not overwrite it.
    pub fn load_from(&self, path: &Path) -> bool {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No saved state, starting empty");
                return false;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read state file");
                return false;
            }
        };

        match self.try_restore_json(&content) {
            Ok(()) => {
                debug!(path = %path.display(), count = self.len(), "Conversation state loaded");
                true
            }
            Err(e) => {
                let aside = corrupt_path(path);
                warn!(
                    path = %path.display(),
                    moved_to = %aside.display(),
                    error = %e,
                    "Unreadable state file, starting empty"
                );
                if let Err(e) = std::fs::rename(path, &aside) {
                    warn!(path = %path.display(), error = %e, "Failed to move unreadable state file aside");
                }
                false
            }
        }
    }
}

fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".corrupt");
    PathBuf::from(name)
}

fn tail(exchanges: &[Exchange], limit: usize) -> Vec<Exchange> {
    let start = exchanges.len().saturating_sub(limit);
    exchanges[start..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filled(n: usize) -> ContextStore {
        let store = ContextStore::new();
        for i in 0..n {
            let h = store.append(format!("q{i}"), ContextMap::new());
            store.set_response(&h, format!("a{i}")).unwrap();
        }
        store
    }

    #[test]
    fn window_returns_last_k_in_order() {
        let store = filled(7);
        for k in 0..=7 {
            let window = store.window(k);
            assert_eq!(window.len(), k);
            let inputs: Vec<String> = window.iter().map(|e| e.input.clone()).collect();
            let expected: Vec<String> = (7 - k..7).map(|i| format!("q{i}")).collect();
            assert_eq!(inputs, expected);
            assert!(window.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        }
    }

    #[test]
    fn window_larger_than_log_and_empty_log() {
        assert!(ContextStore::new().window(5).is_empty());
        assert_eq!(filled(2).window(5).len(), 2);
    }

    #[test]
    fn response_is_set_at_most_once() {
        let store = ContextStore::new();
        let h = store.append("Hello", ContextMap::new());
        store.set_response(&h, "first").unwrap();

        let err = store.set_response(&h, "second").unwrap_err();
        assert!(matches!(err, ContextError::InvalidHandle(_)));
        assert_eq!(store.get(&h).unwrap().response.as_deref(), Some("first"));
    }

    #[test]
    fn unknown_handle_is_rejected() {
        let store = ContextStore::new();
        let err = store.set_response(&ExchangeHandle::new(), "x").unwrap_err();
        assert!(matches!(err, ContextError::InvalidHandle(_)));
    }

    #[test]
    fn current_exchange_is_excluded_from_prompt_window() {
        let store = ContextStore::new();

        let first = store.append("Hello", ContextMap::new());
        assert!(store.window_before(&first, 5).is_empty());
        store.set_response(&first, "Hi there").unwrap();

        let second = store.append("How are you?", ContextMap::new());
        let window = store.window_before(&second, 5);
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].input, "Hello");
        assert_eq!(window[0].response.as_deref(), Some("Hi there"));
    }

    #[test]
    fn window_before_ignores_later_appends() {
        let store = filled(3);
        let h = store.append("current", ContextMap::new());
        store.append("later", ContextMap::new());
        let inputs: Vec<String> = store
            .window_before(&h, 2)
            .into_iter()
            .map(|e| e.input)
            .collect();
        assert_eq!(inputs, ["q1", "q2"]);
    }

    #[test]
    fn context_is_kept_verbatim() {
        let store = ContextStore::new();
        let mut ctx = ContextMap::new();
        ctx.insert("page".into(), json!("editor"));
        let h = store.append("Hello", ctx.clone());
        store.set_response(&h, "Hi").unwrap();
        let ex = store.get(&h).unwrap();
        assert_eq!(ex.context, ctx);
        assert_eq!(ex.input, "Hello");
    }

    #[test]
    fn auxiliary_context_map() {
        let store = ContextStore::new();
        store.set_context("project", json!("parley"));
        assert_eq!(store.context_value("project"), Some(json!("parley")));
        assert_eq!(store.context_map().len(), 1);
        store.clear();
        assert!(store.context_map().is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn snapshot_layout_matches_state_file() {
        let store = filled(1);
        store.set_context("k", json!(1));
        let value: serde_json::Value = serde_json::from_str(&store.to_json().unwrap()).unwrap();
        assert_eq!(value["conversations"][0]["user_input"], "q0");
        assert_eq!(value["conversations"][0]["response"], "a0");
        assert_eq!(value["context"]["k"], 1);
    }

    #[test]
    fn corrupt_blob_leaves_state_unchanged() {
        let store = filled(2);
        assert!(!store.restore_json("{not json"));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn save_and_load_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let store = filled(3);
        store.set_context("user", json!("ada"));
        store.save_to(&path).unwrap();

        let restored = ContextStore::new();
        assert!(restored.load_from(&path));
        assert_eq!(restored.snapshot(), store.snapshot());
    }

    #[test]
    fn missing_file_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContextStore::new();
        assert!(!store.load_from(&dir.path().join("absent.json")));
        assert!(store.is_empty());
    }

    #[test]
    fn corrupt_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "garbage").unwrap();

        let store = filled(1);
        assert!(!store.load_from(&path));
        assert_eq!(store.len(), 1);

        // Kept aside rather than left to be overwritten
        assert!(!path.exists());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("state.json.corrupt")).unwrap(),
            "garbage"
        );
    }

    #[test]
    fn corrupt_blob_reports_cause() {
        let err = ContextStore::new().try_restore_json("[1, 2]").unwrap_err();
        assert!(matches!(err, ContextError::Corrupt(_)));
    }

    #[test]
    fn loads_state_with_naive_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(
            &path,
            r#"{"conversations": [
                {"timestamp": "2024-05-01T10:00:00.123456", "user_input": "Olá",
                 "context": {}, "response": "Oi!"},
                {"timestamp": "2024-05-01T10:01:00", "user_input": "Tudo bem?",
                 "context": {"page": "home"}, "response": null}
            ], "context": {"user": "ana"}}"#,
        )
        .unwrap();

        let store = ContextStore::new();
        assert!(store.load_from(&path));
        let window = store.window(5);
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].input, "Olá");
        assert_eq!(window[0].response.as_deref(), Some("Oi!"));
        assert!(window[1].response.is_none());
        assert_eq!(store.context_value("user"), Some(json!("ana")));

        // Appends after a legacy load keep time order
        store.append("next", ContextMap::new());
        let all = store.window(3);
        assert!(all.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }
}
