//! The ordered, write-through conversation log.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::error::StoreError;
use crate::exchange::{new_id, Exchange};
use crate::storage::Storage;

/// Key under which the serialized exchange list is kept.
pub const CONVERSATIONS_KEY: &str = "conversations";

/// Outcome of writing a mutation through to durable storage.
#[must_use]
#[derive(Debug)]
pub enum Persistence {
    Saved,
    /// The in-memory log was updated but storage did not take the write.
    /// A later session may not see this mutation.
    Degraded(StoreError),
}

impl Persistence {
    pub fn is_saved(&self) -> bool {
        matches!(self, Persistence::Saved)
    }

    pub fn warning(&self) -> Option<&StoreError> {
        match self {
            Persistence::Saved => None,
            Persistence::Degraded(err) => Some(err),
        }
    }
}

/// Result of an append: the new full sequence plus how the write went.
#[derive(Debug)]
pub struct Mutation<'a> {
    pub exchanges: &'a [Exchange],
    pub persistence: Persistence,
}

/// Owns the exchange history and keeps storage in step with it.
///
/// Only [`append`](Self::append) and [`clear`](Self::clear) touch storage;
/// reads never do.
pub struct ConversationStore<S: Storage> {
    storage: S,
    exchanges: Vec<Exchange>,
}

impl<S: Storage> ConversationStore<S> {
    /// Build a store from whatever history `storage` already holds.
    pub fn open(storage: S) -> Self {
        let exchanges = load(&storage);
        debug!(count = exchanges.len(), "loaded conversation history");
        Self { storage, exchanges }
    }

    /// Re-read the persisted history. Missing or unreadable data yields an
    /// empty sequence.
    pub fn load(&self) -> Vec<Exchange> {
        load(&self.storage)
    }

    pub fn exchanges(&self) -> &[Exchange] {
        &self.exchanges
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn append(&mut self, mut exchange: Exchange) -> Mutation<'_> {
        while self.exchanges.iter().any(|e| e.id == exchange.id) {
            let fresh = new_id();
            warn!(old = %exchange.id, new = %fresh, "exchange id already in use, re-keying");
            exchange.id = fresh;
        }

        self.exchanges.push(exchange);
        let persistence = self.persist();

        Mutation {
            exchanges: &self.exchanges,
            persistence,
        }
    }

    /// Empty the log and delete the stored entry outright, so the next
    /// session starts exactly as a first run would.
    pub fn clear(&mut self) -> Persistence {
        self.exchanges.clear();
        match self.storage.remove(CONVERSATIONS_KEY) {
            Ok(()) => Persistence::Saved,
            Err(e) => {
                warn!(error = %e, "could not remove stored conversations");
                Persistence::Degraded(e)
            }
        }
    }

    fn persist(&mut self) -> Persistence {
        let payload = match serde_json::to_string(&self.exchanges) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "could not serialize conversations");
                return Persistence::Degraded(StoreError::Malformed(e));
            }
        };

        match self.storage.set(CONVERSATIONS_KEY, &payload) {
            Ok(()) => Persistence::Saved,
            Err(e) => {
                warn!(error = %e, "could not persist conversations");
                Persistence::Degraded(e)
            }
        }
    }
}

fn load<S: Storage>(storage: &S) -> Vec<Exchange> {
    match read(storage) {
        Ok(exchanges) => sanitize(exchanges),
        Err(e) => {
            warn!(error = %e, "discarding stored conversations");
            Vec::new()
        }
    }
}

fn read<S: Storage>(storage: &S) -> Result<Vec<Exchange>, StoreError> {
    match storage.get(CONVERSATIONS_KEY)? {
        Some(payload) => Ok(serde_json::from_str(&payload)?),
        None => Ok(Vec::new()),
    }
}

/// Drop entries with a blank question and re-key repeated ids, so loaded
/// history holds the same invariants as history built through `append`.
fn sanitize(exchanges: Vec<Exchange>) -> Vec<Exchange> {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(exchanges.len());

    for mut exchange in exchanges {
        if exchange.query.trim().is_empty() {
            warn!(id = %exchange.id, "dropping stored exchange with empty query");
            continue;
        }
        while seen.contains(&exchange.id) {
            let fresh = new_id();
            warn!(old = %exchange.id, new = %fresh, "stored exchange id repeated, re-keying");
            exchange.id = fresh;
        }
        seen.insert(exchange.id.clone());
        kept.push(exchange);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileStorage, MemoryStorage};
    use chrono::{Duration, Utc};
    use std::io;

    /// Storage that accepts reads but refuses every write, like a browser
    /// with storage disabled or over quota.
    struct ReadOnlyStorage;

    impl Storage for ReadOnlyStorage {
        fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Ok(None)
        }

        fn set(&mut self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Write(io::Error::other("quota exceeded")))
        }

        fn remove(&mut self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Remove(io::Error::other("storage disabled")))
        }
    }

    fn exchange(n: usize) -> Exchange {
        Exchange::new(format!("question {}", n), format!("answer {}", n), Utc::now())
    }

    #[test]
    fn test_open_on_empty_storage_is_empty() {
        let store = ConversationStore::open(MemoryStorage::new());
        assert!(store.is_empty());
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_append_returns_full_sequence_and_persists() {
        let mut store = ConversationStore::open(MemoryStorage::new());
        let first = exchange(1);
        let _ = store.append(first.clone());

        let second = exchange(2);
        let mutation = store.append(second.clone());
        assert!(mutation.persistence.is_saved());
        assert_eq!(mutation.exchanges, &[first, second][..]);

        assert_eq!(store.load(), store.exchanges().to_vec());
    }

    #[test]
    fn test_append_preserves_order() {
        let mut store = ConversationStore::open(MemoryStorage::new());
        for n in 0..10 {
            let _ = store.append(exchange(n));
        }
        let queries: Vec<_> = store.exchanges().iter().map(|e| e.query.clone()).collect();
        let expected: Vec<_> = (0..10).map(|n| format!("question {}", n)).collect();
        assert_eq!(queries, expected);
    }

    #[test]
    fn test_ids_are_pairwise_distinct() {
        let mut store = ConversationStore::open(MemoryStorage::new());
        for n in 0..200 {
            let _ = store.append(exchange(n));
        }
        let ids: HashSet<_> = store.exchanges().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids.len(), 200);
    }

    #[test]
    fn test_colliding_id_is_rekeyed() {
        let mut store = ConversationStore::open(MemoryStorage::new());
        let first = exchange(1);
        let mut duplicate = exchange(2);
        duplicate.id = first.id.clone();

        let _ = store.append(first.clone());
        let _ = store.append(duplicate);

        let stored = store.exchanges();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].id, first.id);
        assert_ne!(stored[1].id, first.id);
        assert_eq!(stored[1].query, "question 2");
    }

    #[test]
    fn test_round_trip_through_new_session() {
        let dir = tempfile::tempdir().unwrap();
        let base = Utc::now();
        let mut store = ConversationStore::open(FileStorage::new(dir.path()));
        for n in 0..3 {
            let mut e = exchange(n);
            e.timestamp = base + Duration::seconds(n as i64);
            let _ = store.append(e);
        }
        let written = store.exchanges().to_vec();

        let reopened = ConversationStore::open(FileStorage::new(dir.path()));
        assert_eq!(reopened.exchanges(), &written[..]);
    }

    #[test]
    fn test_clear_removes_entry() {
        let mut store = ConversationStore::open(MemoryStorage::new());
        for n in 0..3 {
            let _ = store.append(exchange(n));
        }
        assert!(store.storage().contains(CONVERSATIONS_KEY));

        assert!(store.clear().is_saved());
        assert!(store.is_empty());
        assert!(!store.storage().contains(CONVERSATIONS_KEY));
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_clear_twice_matches_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ConversationStore::open(FileStorage::new(dir.path()));
        let _ = store.append(exchange(1));

        assert!(store.clear().is_saved());
        assert!(store.clear().is_saved());
        assert!(store.is_empty());
        assert!(!store.storage().path_for(CONVERSATIONS_KEY).exists());
        assert!(ConversationStore::open(FileStorage::new(dir.path())).is_empty());
    }

    #[test]
    fn test_corrupt_payload_loads_empty() {
        let mut storage = MemoryStorage::new();
        storage.set(CONVERSATIONS_KEY, "{not json").unwrap();
        let store = ConversationStore::open(storage);
        assert!(store.is_empty());
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_wrong_shape_loads_empty() {
        let mut storage = MemoryStorage::new();
        storage
            .set(CONVERSATIONS_KEY, r#"[{"id":"1","query":"q"}]"#)
            .unwrap();
        assert!(ConversationStore::open(storage).is_empty());

        let mut storage = MemoryStorage::new();
        storage.set(CONVERSATIONS_KEY, r#"{"items":[]}"#).unwrap();
        assert!(ConversationStore::open(storage).is_empty());
    }

    #[test]
    fn test_corrupt_payload_is_replaced_on_next_append() {
        let mut storage = MemoryStorage::new();
        storage.set(CONVERSATIONS_KEY, "garbage").unwrap();
        let mut store = ConversationStore::open(storage);

        let _ = store.append(exchange(1));
        assert_eq!(store.load().len(), 1);
    }

    #[test]
    fn test_write_failure_still_updates_memory() {
        let mut store = ConversationStore::open(ReadOnlyStorage);

        let mutation = store.append(exchange(1));
        assert!(matches!(
            mutation.persistence.warning(),
            Some(StoreError::Write(_))
        ));
        assert_eq!(mutation.exchanges.len(), 1);
        assert_eq!(store.len(), 1);

        let persistence = store.clear();
        assert!(!persistence.is_saved());
        assert!(store.is_empty());
    }

    #[test]
    fn test_duplicate_ids_on_load_are_rekeyed() {
        let payload = r#"[
            {"id":"same","query":"a","response":"1","timestamp":"2024-03-01T09:30:00.000Z"},
            {"id":"same","query":"b","response":"2","timestamp":"2024-03-01T09:31:00.000Z"}
        ]"#;
        let mut storage = MemoryStorage::new();
        storage.set(CONVERSATIONS_KEY, payload).unwrap();

        let store = ConversationStore::open(storage);

        let stored = store.exchanges();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].id, "same");
        assert_ne!(stored[1].id, "same");
        assert_eq!(stored[1].query, "b");
    }

    #[test]
    fn test_blank_query_on_load_is_dropped() {
        let payload = r#"[
            {"id":"1","query":"a","response":"1","timestamp":"2024-03-01T09:30:00.000Z"},
            {"id":"2","query":"  ","response":"2","timestamp":"2024-03-01T09:31:00.000Z"}
        ]"#;
        let mut storage = MemoryStorage::new();
        storage.set(CONVERSATIONS_KEY, payload).unwrap();

        let store = ConversationStore::open(storage);

        let ids: Vec<_> = store.exchanges().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["1"]);
        assert_eq!(store.load().len(), 1);
    }
}
