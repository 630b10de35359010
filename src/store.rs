//! Keyed record store shared by the control plane and the background loops.
//!
//! The store is the only long-lived shared state. Callers are not serialized
//! against each other: an API-driven route update and a watchdog withdrawal
//! of the same route may interleave, and the last writer wins.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use fs2::FileExt;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{
    AlertRecord, BlockedPacketRecord, EventRecord, FirewallRule, NatConfig, RouteEntry, RuleGroup,
};

/// Key of the NAT configuration singleton.
pub const NAT_CONFIG_KEY: &str = "main";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Rules,
    RuleGroups,
    Routes,
    NatConfig,
    BlockedPackets,
    Alerts,
    Events,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Rules => "rules",
            Collection::RuleGroups => "rule_groups",
            Collection::Routes => "routes",
            Collection::NatConfig => "nat_config",
            Collection::BlockedPackets => "blocked_packets",
            Collection::Alerts => "alerts",
            Collection::Events => "events",
        }
    }
}

/// Generic keyed document store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn put(&self, collection: Collection, key: &str, value: Value) -> Result<(), StoreError>;

    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>, StoreError>;

    /// Returns whether a record was removed.
    async fn delete(&self, collection: Collection, key: &str) -> Result<bool, StoreError>;

    async fn list(&self, collection: Collection) -> Result<Vec<(String, Value)>, StoreError>;

    /// Insert under a fresh key and return it.
    async fn append(&self, collection: Collection, value: Value) -> Result<String, StoreError> {
        let key = Uuid::new_v4().to_string();
        self.put(collection, &key, value).await?;
        Ok(key)
    }

    /// Append `value` and drop every document whose `timestamp` is before
    /// `cutoff`, as one operation. Returns the number of documents left.
    async fn append_pruned(
        &self,
        collection: Collection,
        value: Value,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError>;
}

/// Collection name -> key -> document.
type Snapshot = BTreeMap<String, BTreeMap<String, Value>>;

fn snapshot_put(data: &mut Snapshot, collection: Collection, key: &str, value: Value) {
    data.entry(collection.as_str().to_string())
        .or_default()
        .insert(key.to_string(), value);
}

fn snapshot_get(data: &Snapshot, collection: Collection, key: &str) -> Option<Value> {
    data.get(collection.as_str()).and_then(|c| c.get(key)).cloned()
}

fn snapshot_delete(data: &mut Snapshot, collection: Collection, key: &str) -> bool {
    data.get_mut(collection.as_str())
        .map(|c| c.remove(key).is_some())
        .unwrap_or(false)
}

fn snapshot_append_pruned(
    data: &mut Snapshot,
    collection: Collection,
    value: Value,
    cutoff: DateTime<Utc>,
) -> usize {
    let docs = data.entry(collection.as_str().to_string()).or_default();
    docs.retain(|_, doc| !stamped_before(doc, cutoff));
    docs.insert(Uuid::new_v4().to_string(), value);
    docs.len()
}

/// Documents without a readable `timestamp` are never pruned.
fn stamped_before(doc: &Value, cutoff: DateTime<Utc>) -> bool {
    doc.get("timestamp")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .is_some_and(|t| t < cutoff)
}

fn snapshot_list(data: &Snapshot, collection: Collection) -> Vec<(String, Value)> {
    data.get(collection.as_str())
        .map(|c| c.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}

/// In-process store for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn put(&self, collection: Collection, key: &str, value: Value) -> Result<(), StoreError> {
        snapshot_put(&mut *self.data.write().await, collection, key, value);
        Ok(())
    }

    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(snapshot_get(&*self.data.read().await, collection, key))
    }

    async fn delete(&self, collection: Collection, key: &str) -> Result<bool, StoreError> {
        Ok(snapshot_delete(&mut *self.data.write().await, collection, key))
    }

    async fn list(&self, collection: Collection) -> Result<Vec<(String, Value)>, StoreError> {
        Ok(snapshot_list(&*self.data.read().await, collection))
    }

    async fn append_pruned(
        &self,
        collection: Collection,
        value: Value,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        Ok(snapshot_append_pruned(&mut *self.data.write().await, collection, value, cutoff))
    }
}

/// Store persisted as one JSON document.
///
/// Every operation re-reads the file under an exclusive `fs2` lock on a
/// sibling `.lock` file, and mutations rewrite it atomically (tempfile +
/// rename), so the CLI and a running daemon see each other's writes.
pub struct JsonFileStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl JsonFileStore {
    /// Open the store, checking that an existing file parses.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut lock_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);

        std::fs::create_dir_all(parent_dir(&path))?;
        load_snapshot(&path)?;

        Ok(Self { path, lock_path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `op` against the current file contents under the store lock.
    /// `op` returns its result and whether the snapshot must be written back.
    async fn transact<R, F>(&self, op: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Snapshot) -> (R, bool) + Send + 'static,
        R: Send + 'static,
    {
        let path = self.path.clone();
        let lock_path = self.lock_path.clone();

        tokio::task::spawn_blocking(move || {
            let lock = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&lock_path)?;
            lock.lock_exclusive()?;

            let mut snapshot = load_snapshot(&path)?;
            let (result, dirty) = op(&mut snapshot);
            if dirty {
                write_atomic(&path, &serde_json::to_vec_pretty(&snapshot)?)?;
                debug!("Store written to {:?}", path);
            }
            // lock released when `lock` is dropped
            Ok(result)
        })
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

fn load_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
    match std::fs::read_to_string(path) {
        Ok(content) if content.trim().is_empty() => Ok(Snapshot::new()),
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Snapshot::new()),
        Err(e) => Err(e.into()),
    }
}

fn write_atomic(path: &Path, content: &[u8]) -> Result<(), StoreError> {
    let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir(path))?;
    temp_file.write_all(content)?;
    temp_file.as_file().sync_all()?;
    temp_file.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

#[async_trait]
impl RecordStore for JsonFileStore {
    async fn put(&self, collection: Collection, key: &str, value: Value) -> Result<(), StoreError> {
        let key = key.to_string();
        self.transact(move |data| {
            snapshot_put(data, collection, &key, value);
            ((), true)
        })
        .await
    }

    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>, StoreError> {
        let key = key.to_string();
        self.transact(move |data| (snapshot_get(data, collection, &key), false))
            .await
    }

    async fn delete(&self, collection: Collection, key: &str) -> Result<bool, StoreError> {
        let key = key.to_string();
        self.transact(move |data| {
            let removed = snapshot_delete(data, collection, &key);
            (removed, removed)
        })
        .await
    }

    async fn list(&self, collection: Collection) -> Result<Vec<(String, Value)>, StoreError> {
        self.transact(move |data| (snapshot_list(data, collection), false))
            .await
    }

    async fn append_pruned(
        &self,
        collection: Collection,
        value: Value,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        self.transact(move |data| (snapshot_append_pruned(data, collection, value, cutoff), true))
            .await
    }
}

/// Typed access to the collections.
#[derive(Clone)]
pub struct Records {
    store: Arc<dyn RecordStore>,
}

fn decode<T: DeserializeOwned>(collection: Collection, value: Value) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|e| StoreError::Malformed {
        collection: collection.as_str().to_string(),
        message: e.to_string(),
    })
}

fn encode<T: Serialize>(value: &T) -> Result<Value, StoreError> {
    Ok(serde_json::to_value(value)?)
}

impl Records {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub fn raw(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    async fn decode_all<T: DeserializeOwned>(
        &self,
        collection: Collection,
    ) -> Result<Vec<(String, T)>, StoreError> {
        self.store
            .list(collection)
            .await?
            .into_iter()
            .map(|(k, v)| decode(collection, v).map(|t| (k, t)))
            .collect()
    }

    // --- rules (keyed by rule_name) ---

    pub async fn rule(&self, name: &str) -> Result<Option<FirewallRule>, StoreError> {
        match self.store.get(Collection::Rules, name).await? {
            Some(v) => decode(Collection::Rules, v).map(Some),
            None => Ok(None),
        }
    }

    pub async fn save_rule(&self, rule: &FirewallRule) -> Result<(), StoreError> {
        self.store
            .put(Collection::Rules, &rule.rule_name, encode(rule)?)
            .await
    }

    pub async fn delete_rule(&self, name: &str) -> Result<bool, StoreError> {
        self.store.delete(Collection::Rules, name).await
    }

    pub async fn rules(&self) -> Result<Vec<FirewallRule>, StoreError> {
        Ok(self
            .decode_all(Collection::Rules)
            .await?
            .into_iter()
            .map(|(_, r)| r)
            .collect())
    }

    // --- rule groups ---

    pub async fn insert_group(&self, group: &RuleGroup) -> Result<String, StoreError> {
        self.store.append(Collection::RuleGroups, encode(group)?).await
    }

    pub async fn group(&self, id: &str) -> Result<Option<RuleGroup>, StoreError> {
        match self.store.get(Collection::RuleGroups, id).await? {
            Some(v) => decode(Collection::RuleGroups, v).map(Some),
            None => Ok(None),
        }
    }

    pub async fn groups(&self) -> Result<Vec<(String, RuleGroup)>, StoreError> {
        self.decode_all(Collection::RuleGroups).await
    }

    pub async fn delete_group(&self, id: &str) -> Result<bool, StoreError> {
        self.store.delete(Collection::RuleGroups, id).await
    }

    // --- routes (keyed by generated id) ---

    pub async fn insert_route(&self, route: &RouteEntry) -> Result<String, StoreError> {
        self.store.append(Collection::Routes, encode(route)?).await
    }

    pub async fn save_route(&self, id: &str, route: &RouteEntry) -> Result<(), StoreError> {
        self.store.put(Collection::Routes, id, encode(route)?).await
    }

    pub async fn route(&self, id: &str) -> Result<Option<RouteEntry>, StoreError> {
        match self.store.get(Collection::Routes, id).await? {
            Some(v) => decode(Collection::Routes, v).map(Some),
            None => Ok(None),
        }
    }

    pub async fn routes(&self) -> Result<Vec<(String, RouteEntry)>, StoreError> {
        self.decode_all(Collection::Routes).await
    }

    pub async fn delete_route(&self, id: &str) -> Result<bool, StoreError> {
        self.store.delete(Collection::Routes, id).await
    }

    // --- NAT singleton ---

    pub async fn nat_config(&self) -> Result<Option<NatConfig>, StoreError> {
        match self.store.get(Collection::NatConfig, NAT_CONFIG_KEY).await? {
            Some(v) => decode(Collection::NatConfig, v).map(Some),
            None => Ok(None),
        }
    }

    pub async fn save_nat_config(&self, config: &NatConfig) -> Result<(), StoreError> {
        self.store
            .put(Collection::NatConfig, NAT_CONFIG_KEY, encode(config)?)
            .await
    }

    // --- append-only logs ---

    pub async fn append_blocked(&self, record: &BlockedPacketRecord) -> Result<String, StoreError> {
        self.store
            .append(Collection::BlockedPackets, encode(record)?)
            .await
    }

    /// Store a blocked packet, discard those older than `cutoff`, and
    /// return how many remain (the count inside the window).
    pub async fn record_blocked(
        &self,
        record: &BlockedPacketRecord,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        self.store
            .append_pruned(Collection::BlockedPackets, encode(record)?, cutoff)
            .await
    }

    pub async fn count_blocked_since(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        Ok(self
            .decode_all::<BlockedPacketRecord>(Collection::BlockedPackets)
            .await?
            .iter()
            .filter(|(_, r)| r.timestamp >= cutoff)
            .count())
    }

    pub async fn recent_blocked(&self, limit: usize) -> Result<Vec<BlockedPacketRecord>, StoreError> {
        let mut records: Vec<BlockedPacketRecord> = self
            .decode_all(Collection::BlockedPackets)
            .await?
            .into_iter()
            .map(|(_, r)| r)
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(limit);
        Ok(records)
    }

    pub async fn append_alert(&self, record: &AlertRecord) -> Result<String, StoreError> {
        self.store.append(Collection::Alerts, encode(record)?).await
    }

    pub async fn recent_alerts(&self, limit: usize) -> Result<Vec<AlertRecord>, StoreError> {
        let mut records: Vec<AlertRecord> = self
            .decode_all(Collection::Alerts)
            .await?
            .into_iter()
            .map(|(_, r)| r)
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(limit);
        Ok(records)
    }

    pub async fn append_event(&self, record: &EventRecord) -> Result<String, StoreError> {
        self.store.append(Collection::Events, encode(record)?).await
    }

    /// INFO-level events mentioning DENY or DROP at or after `cutoff`.
    pub async fn count_deny_events_since(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        Ok(self
            .decode_all::<EventRecord>(Collection::Events)
            .await?
            .iter()
            .filter(|(_, e)| {
                e.timestamp >= cutoff
                    && e.level == crate::model::AlertLevel::Info
                    && is_deny_message(&e.message)
            })
            .count())
    }
}

/// Case-sensitive match on DENY|DROP.
pub fn is_deny_message(message: &str) -> bool {
    message.contains("DENY") || message.contains("DROP")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, AlertLevel, Direction};
    use chrono::Duration;

    fn records() -> Records {
        Records::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_memory_put_get_delete() {
        let store = MemoryStore::new();
        store
            .put(Collection::Rules, "a", serde_json::json!({"x": 1}))
            .await
            .unwrap();
        assert_eq!(
            store.get(Collection::Rules, "a").await.unwrap(),
            Some(serde_json::json!({"x": 1}))
        );
        assert!(store.get(Collection::Routes, "a").await.unwrap().is_none());
        assert!(store.delete(Collection::Rules, "a").await.unwrap());
        assert!(!store.delete(Collection::Rules, "a").await.unwrap());
    }

    #[tokio::test]
    async fn test_append_generates_distinct_keys() {
        let store = MemoryStore::new();
        let k1 = store.append(Collection::Alerts, Value::Null).await.unwrap();
        let k2 = store.append(Collection::Alerts, Value::Null).await.unwrap();
        assert_ne!(k1, k2);
        assert_eq!(store.list(Collection::Alerts).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rule_roundtrip_by_name() {
        let r = records();
        let rule = FirewallRule::new("ssh", Direction::In, Action::Deny);
        r.save_rule(&rule).await.unwrap();
        assert_eq!(r.rule("ssh").await.unwrap(), Some(rule));
        assert_eq!(r.rules().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_record_reported() {
        let r = records();
        r.raw()
            .put(Collection::Rules, "bad", serde_json::json!({"nope": true}))
            .await
            .unwrap();
        let err = r.rule("bad").await.unwrap_err();
        assert!(matches!(err, StoreError::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_count_blocked_since_is_inclusive() {
        let r = records();
        let now = Utc::now();
        for offset in [0, 60, 299, 300, 301, 3600] {
            r.append_blocked(&BlockedPacketRecord {
                timestamp: now - Duration::seconds(offset),
                raw_log_line: "FWDROP: x".to_string(),
            })
            .await
            .unwrap();
        }
        assert_eq!(
            r.count_blocked_since(now - Duration::seconds(300)).await.unwrap(),
            4
        );
    }

    #[tokio::test]
    async fn test_record_blocked_prunes_outside_window() {
        let r = records();
        let now = Utc::now();
        for offset in [3600, 301, 120] {
            r.append_blocked(&BlockedPacketRecord {
                timestamp: now - Duration::seconds(offset),
                raw_log_line: "FWDROP: old".to_string(),
            })
            .await
            .unwrap();
        }

        let fresh = BlockedPacketRecord {
            timestamp: now,
            raw_log_line: "FWDROP: new".to_string(),
        };
        let count = r.record_blocked(&fresh, now - Duration::seconds(300)).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(r.recent_blocked(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_append_pruned_keeps_untimestamped_documents() {
        let store = MemoryStore::new();
        store.append(Collection::Events, serde_json::json!({"message": "x"})).await.unwrap();
        let left = store
            .append_pruned(Collection::Events, serde_json::json!({"message": "y"}), Utc::now())
            .await
            .unwrap();
        assert_eq!(left, 2);
    }

    #[tokio::test]
    async fn test_count_deny_events_filters_level_and_pattern() {
        let r = records();
        let now = Utc::now();
        let mk = |level, message: &str, age| EventRecord {
            timestamp: now - Duration::seconds(age),
            level,
            message: message.to_string(),
            source_ip: None,
        };
        r.append_event(&mk(AlertLevel::Info, "rule x DENY applied", 10)).await.unwrap();
        r.append_event(&mk(AlertLevel::Info, "packet DROP", 20)).await.unwrap();
        r.append_event(&mk(AlertLevel::Info, "rule y ALLOW", 20)).await.unwrap();
        r.append_event(&mk(AlertLevel::Warning, "DENY", 20)).await.unwrap();
        r.append_event(&mk(AlertLevel::Info, "old DENY", 3600)).await.unwrap();
        r.append_event(&mk(AlertLevel::Info, "lowercase deny", 5)).await.unwrap();

        let cutoff = now - Duration::minutes(10);
        assert_eq!(r.count_deny_events_since(cutoff).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_recent_alerts_newest_first() {
        let r = records();
        let now = Utc::now();
        for age in [30, 10, 20] {
            r.append_alert(&AlertRecord {
                timestamp: now - Duration::seconds(age),
                level: AlertLevel::Alert,
                message: format!("{age}"),
            })
            .await
            .unwrap();
        }
        let recent = r.recent_alerts(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "10");
        assert_eq!(recent[1].message, "20");
    }

    #[tokio::test]
    async fn test_json_file_store_persists_across_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("store.json");

        {
            let store = JsonFileStore::open(&path).unwrap();
            let r = Records::new(Arc::new(store));
            r.save_nat_config(&NatConfig {
                enabled: true,
                wan: "Ethernet".to_string(),
                lan: "Wi-Fi".to_string(),
            })
            .await
            .unwrap();
        }

        let reopened = Records::new(Arc::new(JsonFileStore::open(&path).unwrap()));
        let nat = reopened.nat_config().await.unwrap().unwrap();
        assert!(nat.enabled);
        assert_eq!(nat.wan, "Ethernet");
    }

    #[tokio::test]
    async fn test_json_file_store_sees_other_writers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let daemon = Records::new(Arc::new(JsonFileStore::open(&path).unwrap()));
        let cli = Records::new(Arc::new(JsonFileStore::open(&path).unwrap()));

        cli.save_rule(&FirewallRule::new("a", Direction::In, Action::Allow))
            .await
            .unwrap();
        daemon
            .append_alert(&AlertRecord {
                timestamp: Utc::now(),
                level: AlertLevel::Alert,
                message: "x".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(cli.recent_alerts(5).await.unwrap().len(), 1);
        assert_eq!(daemon.rules().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_json_file_store_blocked_log_stays_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let r = Records::new(Arc::new(JsonFileStore::open(dir.path().join("store.json")).unwrap()));
        let start = Utc::now();

        // one drop every 10s for ~33 minutes against a 5-minute window
        for i in 0..200 {
            let at = start + Duration::seconds(i * 10);
            let record = BlockedPacketRecord {
                timestamp: at,
                raw_log_line: "FWDROP: x".to_string(),
            };
            let count = r.record_blocked(&record, at - Duration::seconds(300)).await.unwrap();
            assert!(count <= 31);
        }
        assert_eq!(r.recent_blocked(1000).await.unwrap().len(), 31);
    }

    #[tokio::test]
    async fn test_json_file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            JsonFileStore::open(&path),
            Err(StoreError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_json_file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("none.json")).unwrap();
        assert!(store.list(Collection::Rules).await.unwrap().is_empty());
    }
}
