//! Optional persistence hook. Absent, all state lives in memory; present,
//! it hydrates on room construction and receives best-effort checkpoints.
//!
//! A store failure is logged and the room continues in-memory per §7 —
//! callers of `Store` methods never propagate its errors as a room failure.

use async_trait::async_trait;

#[async_trait]
pub trait Store: Send + Sync {
    /// Persist an opaque checkpoint blob under `key` (e.g. `"<room>/tts/<lang>"`).
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), String>;

    /// Load a previously persisted blob, if any.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, String>;

    /// Remove a checkpoint (e.g. after a room shuts down).
    async fn delete(&self, key: &str) -> Result<(), String>;
}

/// No-op store: every write silently succeeds and no reads ever return data.
/// This is the default when no persistence backend is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStore;

#[async_trait]
impl Store for NoopStore {
    async fn put(&self, _key: &str, _value: Vec<u8>) -> Result<(), String> {
        Ok(())
    }

    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, String> {
        Ok(None)
    }

    async fn delete(&self, _key: &str) -> Result<(), String> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_store_round_trips_as_empty() {
        let store = NoopStore;
        store.put("k", vec![1, 2, 3]).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        store.delete("k").await.unwrap();
    }
}
