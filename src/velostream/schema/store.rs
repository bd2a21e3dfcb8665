//! In-memory schema store
//!
//! Holds the two caches a catalog serves from: schema text by schema id, and the
//! resolved schema id (with retry/staleness bookkeeping) by subject/version. The
//! store performs no I/O; the registry client decides when entries are refreshed.

use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::{SchemaId, NO_SCHEMA_ID};

/// Default number of entries each cache keeps before evicting the oldest
pub const DEFAULT_STORE_CAPACITY: usize = 1024;

/// Cache key for a (subject, version) pair.
///
/// Hashes by the CRC32C of `subject + version` so lookups never hash the strings
/// again; equality checks the checksum before comparing the strings.
#[derive(Debug, Clone)]
pub struct SubjectVersionKey {
    checksum: u32,
    subject: Arc<str>,
    version: Arc<str>,
}

impl SubjectVersionKey {
    pub fn new(subject: &str, version: &str) -> Self {
        let checksum = crc32c::crc32c_append(crc32c::crc32c(subject.as_bytes()), version.as_bytes());
        Self {
            checksum,
            subject: Arc::from(subject),
            version: Arc::from(version),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }
}

impl PartialEq for SubjectVersionKey {
    fn eq(&self, other: &Self) -> bool {
        self.checksum == other.checksum
            && self.subject == other.subject
            && self.version == other.version
    }
}

impl Eq for SubjectVersionKey {}

impl Hash for SubjectVersionKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.checksum);
    }
}

/// Raw schema text with the CRC32C checksum computed when it was stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedSchemaText {
    text: Arc<str>,
    checksum: u32,
}

impl CachedSchemaText {
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        let text = text.into();
        let checksum = crc32c::crc32c(text.as_bytes());
        Self { text, checksum }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }
}

/// Schema id resolved for a subject/version, plus the state of its refresh cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CachedSchemaId {
    /// When the last fetch attempt completed
    pub timestamp: Instant,
    /// When the id was last confirmed by the registry
    pub resolved_at: Option<Instant>,
    pub id: SchemaId,
    /// Delay before a failing entry may be fetched again; zero while healthy
    pub retry_delay: Duration,
    /// Consecutive failed fetches; zero while healthy
    pub event_state: u32,
    /// Whether the stale-schema event has fired for the current failure streak
    pub stale_notified: bool,
}

impl CachedSchemaId {
    /// Entry for a successful fetch
    pub fn resolved(now: Instant, id: SchemaId) -> Self {
        Self {
            timestamp: now,
            resolved_at: Some(now),
            id,
            retry_delay: Duration::ZERO,
            event_state: 0,
            stale_notified: false,
        }
    }

    pub fn expired(&self, now: Instant, max_age: Duration) -> bool {
        now.saturating_duration_since(self.timestamp) > max_age
    }

    /// True while the last attempt failed
    pub fn retry(&self) -> bool {
        self.event_state > 0
    }

    /// Whether a lookup at `now` should go back to the registry.
    ///
    /// Healthy entries refresh once they exceed `max_age`; failing entries once
    /// their back-off delay has elapsed.
    pub fn needs_refresh(&self, now: Instant, max_age: Duration) -> bool {
        if self.retry() {
            now.saturating_duration_since(self.timestamp) >= self.retry_delay
        } else {
            self.expired(now, max_age)
        }
    }

    /// The id callers may use at `now`, honouring the staleness limit
    pub fn served_id(&self, now: Instant, max_staleness: Option<Duration>) -> SchemaId {
        match (self.retry(), self.resolved_at, max_staleness) {
            (true, Some(resolved_at), Some(limit))
                if now.saturating_duration_since(resolved_at) > limit =>
            {
                NO_SCHEMA_ID
            }
            _ => self.id,
        }
    }
}

/// Map with a fixed capacity that evicts entries in insertion order
#[derive(Debug)]
struct BoundedCache<K, V> {
    entries: HashMap<K, V>,
    order: VecDeque<K>,
    capacity: usize,
}

impl<K: Eq + Hash + Clone, V: Clone> BoundedCache<K, V> {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity.min(DEFAULT_STORE_CAPACITY)),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).cloned()
    }

    fn put(&mut self, key: K, value: V) {
        if self.entries.insert(key.clone(), value).is_none() {
            self.order.push_back(key);
            while self.entries.len() > self.capacity {
                match self.order.pop_front() {
                    Some(oldest) => {
                        self.entries.remove(&oldest);
                    }
                    None => break,
                }
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Shared schema caches for one catalog instance
#[derive(Debug)]
pub struct SchemaStore {
    schemas: RwLock<BoundedCache<SchemaId, CachedSchemaText>>,
    schema_ids: RwLock<BoundedCache<SubjectVersionKey, CachedSchemaId>>,
    id_failures: RwLock<HashMap<SchemaId, u32>>,
}

impl SchemaStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            schemas: RwLock::new(BoundedCache::new(capacity)),
            schema_ids: RwLock::new(BoundedCache::new(capacity)),
            id_failures: RwLock::new(HashMap::new()),
        }
    }

    pub async fn schema(&self, schema_id: SchemaId) -> Option<CachedSchemaText> {
        self.schemas.read().await.get(&schema_id)
    }

    pub async fn put_schema(&self, schema_id: SchemaId, schema: CachedSchemaText) {
        self.schemas.write().await.put(schema_id, schema);
    }

    pub async fn schema_id(&self, key: &SubjectVersionKey) -> Option<CachedSchemaId> {
        self.schema_ids.read().await.get(key)
    }

    pub async fn put_schema_id(&self, key: SubjectVersionKey, entry: CachedSchemaId) {
        self.schema_ids.write().await.put(key, entry);
    }

    /// Count a failed fetch for `schema_id`, returning the streak length before it
    pub async fn record_id_failure(&self, schema_id: SchemaId) -> u32 {
        let mut failures = self.id_failures.write().await;
        let streak = failures.entry(schema_id).or_insert(0);
        let previous = *streak;
        *streak = streak.saturating_add(1);
        previous
    }

    /// End the failure streak for `schema_id`, returning its length
    pub async fn clear_id_failures(&self, schema_id: SchemaId) -> u32 {
        self.id_failures
            .write()
            .await
            .remove(&schema_id)
            .unwrap_or(0)
    }

    pub async fn schema_count(&self) -> usize {
        self.schemas.read().await.len()
    }

    pub async fn schema_id_count(&self) -> usize {
        self.schema_ids.read().await.len()
    }
}

impl Default for SchemaStore {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_CAPACITY)
    }
}
