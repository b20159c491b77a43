use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

struct Entry {
    value: String,
    // 0 means the entry never expires.
    ttl_ms: i64,
    created_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        if self.ttl_ms == 0 {
            return false;
        }
        let elapsed = now.saturating_duration_since(self.created_at).as_millis();
        // A negative TTL is already in the past.
        u128::try_from(self.ttl_ms).map_or(true, |ttl| elapsed > ttl)
    }
}

/// Key-value map with lazy expiry. Expired entries stay in the map until the
/// key is written again; reads simply report them as missing.
pub struct InMemoryDB {
    map: HashMap<String, Entry>,
}

impl InMemoryDB {
    pub fn new() -> Self {
        Self { map: HashMap::new() }
    }

    /// Overwrites `key` unconditionally and restarts its clock.
    pub fn set(&mut self, key: String, value: String, ttl_ms: i64) {
        self.set_at(key, value, ttl_ms, Instant::now());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.get_at(key, Instant::now())
    }

    fn set_at(&mut self, key: String, value: String, ttl_ms: i64, created_at: Instant) {
        let entry = Entry { value, ttl_ms, created_at };
        self.map.insert(key, entry);
    }

    fn get_at(&self, key: &str, now: Instant) -> Option<String> {
        match self.map.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            _ => None,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.map.len()
    }
}

/// Handle to the store shared by every connection task.
#[derive(Clone)]
pub struct Db {
    shared: Arc<Mutex<InMemoryDB>>,
}

impl Db {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(InMemoryDB::new())),
        }
    }

    /// Locks the store for the duration of one command. Never hold the guard
    /// across an `.await`.
    pub fn lock(&self) -> MutexGuard<'_, InMemoryDB> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn missing_key_is_none() {
        let db = InMemoryDB::new();
        assert_eq!(db.get("nope"), None);
    }

    #[test]
    fn set_overwrites() {
        let mut db = InMemoryDB::new();
        db.set("k".into(), "v1".into(), 0);
        db.set("k".into(), "v2".into(), 0);
        assert_eq!(db.get("k"), Some("v2".to_string()));
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn zero_ttl_never_expires() {
        let mut db = InMemoryDB::new();
        let t0 = Instant::now();
        db.set_at("k".into(), "v".into(), 0, t0);
        assert_eq!(db.get_at("k", t0 + Duration::from_secs(3600)), Some("v".to_string()));
    }

    #[test]
    fn negative_ttl_is_expired_at_once() {
        let mut db = InMemoryDB::new();
        let t0 = Instant::now();
        db.set_at("k".into(), "v".into(), -5, t0);
        assert_eq!(db.get_at("k", t0), None);
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn expiry_boundary_is_strictly_greater() {
        let mut db = InMemoryDB::new();
        let t0 = Instant::now();
        db.set_at("k".into(), "v".into(), 100, t0);

        assert_eq!(db.get_at("k", t0 + Duration::from_millis(99)), Some("v".to_string()));
        assert_eq!(db.get_at("k", t0 + Duration::from_millis(100)), Some("v".to_string()));
        assert_eq!(db.get_at("k", t0 + Duration::from_micros(100_999)), Some("v".to_string()));
        assert_eq!(db.get_at("k", t0 + Duration::from_millis(101)), None);
    }

    #[test]
    fn expired_entry_stays_until_overwritten() {
        let mut db = InMemoryDB::new();
        let t0 = Instant::now();
        db.set_at("k".into(), "old".into(), 10, t0);

        let later = t0 + Duration::from_millis(50);
        assert_eq!(db.get_at("k", later), None);
        assert_eq!(db.get_at("k", later), None);
        assert_eq!(db.len(), 1);

        db.set_at("k".into(), "new".into(), 10, later);
        assert_eq!(db.get_at("k", later + Duration::from_millis(5)), Some("new".to_string()));
    }

    #[test]
    fn shared_handle_sees_writes() {
        let db = Db::new();
        let other = db.clone();
        db.lock().set("k".into(), "v".into(), 0);
        assert_eq!(other.lock().get("k"), Some("v".to_string()));
    }
}
