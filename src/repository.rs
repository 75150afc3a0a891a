//! Record repository: remote-preferred, local-fallback persistence for one
//! entity collection.
//!
//! Writes try the remote store first and fall back to the local store on any
//! failure. Reads do the same and always re-sort newest first, so callers see
//! the same order whichever store answered. Updates and deletes are mirrored
//! to the local copy unconditionally. The two stores are never reconciled and
//! may diverge after a partial failure.

use std::marker::PhantomData;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{StoreError, SubmitError};
use crate::guard::SubmitGuard;
use crate::local::LocalStore;
use crate::ordering::{merge_patch, sort_newest_first};
use crate::record::Entity;
use crate::remote::{ListQuery, RemoteStore};

/// Produces opaque, collision-resistant record ids.
pub type IdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Default id generator: a simple-format UUID v4.
pub fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Where a created record ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Remote,
    Local,
    /// Both stores failed; the record was not persisted.
    Dropped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt {
    pub id: String,
    pub location: Location,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateReceipt {
    pub remote: bool,
    /// A local copy existed and was patched.
    pub local: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteReceipt {
    pub remote: bool,
    /// A local copy existed and was removed.
    pub local: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// Emitted after every write so views can refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub collection: &'static str,
    pub id: String,
    pub kind: ChangeKind,
}

pub struct Repository<T: Entity> {
    remote: Option<Arc<dyn RemoteStore>>,
    local: LocalStore,
    pet_id: String,
    id_gen: IdGenerator,
    changes: broadcast::Sender<Change>,
    guard: SubmitGuard,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            remote: self.remote.clone(),
            local: self.local.clone(),
            pet_id: self.pet_id.clone(),
            id_gen: Arc::clone(&self.id_gen),
            changes: self.changes.clone(),
            guard: self.guard.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> Repository<T> {
    pub fn new(
        remote: Option<Arc<dyn RemoteStore>>,
        local: LocalStore,
        pet_id: impl Into<String>,
    ) -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            remote,
            local,
            pet_id: pet_id.into(),
            id_gen: Arc::new(new_id),
            changes,
            guard: SubmitGuard::new(),
            _entity: PhantomData,
        }
    }

    pub fn with_id_generator(mut self, id_gen: IdGenerator) -> Self {
        self.id_gen = id_gen;
        self
    }

    /// Share a change channel with other repositories.
    pub fn with_changes(mut self, changes: broadcast::Sender<Change>) -> Self {
        self.changes = changes;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.changes.subscribe()
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Persist a new record. Only validation and double-submit errors are
    /// returned; store failures degrade to local persistence.
    pub async fn create(&self, mut record: T) -> Result<WriteReceipt, SubmitError> {
        record.validate()?;
        let _ticket = self.guard.try_begin().ok_or(SubmitError::InFlight)?;

        record.set_pet_id(self.pet_id.clone());
        if record.id().is_empty() {
            record.set_id((self.id_gen)());
        }
        if record.timestamp().trim().is_empty() {
            record.set_timestamp(Utc::now().to_rfc3339());
        }
        let id = record.id().to_string();

        let location = match serde_json::to_value(&record) {
            Ok(doc) => match self.remote_insert(&doc).await {
                Ok(()) => Location::Remote,
                Err(e) => {
                    self.log_fallback("create", &e);
                    match self.local_insert(doc) {
                        Ok(()) => Location::Local,
                        Err(e) => {
                            warn!(collection = T::COLLECTION, id = %id, error = %e, "local fallback write failed, record dropped");
                            Location::Dropped
                        }
                    }
                }
            },
            Err(e) => {
                warn!(collection = T::COLLECTION, id = %id, error = %e, "record not serializable, dropped");
                Location::Dropped
            }
        };

        self.notify(&id, ChangeKind::Created);
        Ok(WriteReceipt { id, location })
    }

    pub async fn list(&self, limit: Option<usize>) -> Vec<T> {
        self.list_where(&[], limit).await
    }

    /// List records in this pet's scope matching extra equality filters,
    /// newest first.
    pub async fn list_where(&self, filter: &[(&str, &str)], limit: Option<usize>) -> Vec<T> {
        let mut conditions = vec![("pet_id".to_string(), self.pet_id.clone())];
        conditions.extend(filter.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        let query = ListQuery {
            filter: conditions,
            order_by: Some(T::TIMESTAMP_FIELD.to_string()),
            limit,
        };

        let rows = match self.remote_list(&query).await {
            Ok(rows) => rows,
            Err(e) => {
                self.log_fallback("list", &e);
                let rows: Vec<Value> = self.local.get(T::COLLECTION, Vec::new());
                rows.into_iter()
                    .filter(|row| matches_filter(row, &query.filter))
                    .collect()
            }
        };

        let mut records: Vec<T> = rows
            .into_iter()
            .filter_map(|row| match serde_json::from_value::<T>(row) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(collection = T::COLLECTION, error = %e, "skipping malformed record");
                    None
                }
            })
            .collect();
        sort_newest_first(&mut records, |r| r.timestamp());
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        records
    }

    pub async fn get(&self, id: &str) -> Option<T> {
        self.list_where(&[("id", id)], Some(1)).await.into_iter().next()
    }

    /// Apply `patch` remotely, and to the local copy regardless of the
    /// remote outcome.
    pub async fn update(&self, id: &str, patch: &Map<String, Value>) -> UpdateReceipt {
        let remote = match self.remote_call().map(|r| r.update(T::COLLECTION, id, patch)) {
            Ok(call) => call.await,
            Err(e) => Err(e),
        };
        let remote = match remote {
            Ok(()) => true,
            Err(e) => {
                self.log_fallback("update", &e);
                false
            }
        };

        let local = self.local_update(id, patch).unwrap_or_else(|e| {
            warn!(collection = T::COLLECTION, id, error = %e, "local update failed");
            false
        });

        self.notify(id, ChangeKind::Updated);
        UpdateReceipt { remote, local }
    }

    /// Delete remotely, and from the local collection regardless of the
    /// remote outcome.
    pub async fn delete(&self, id: &str) -> DeleteReceipt {
        let remote = match self.remote_call().map(|r| r.delete(T::COLLECTION, id)) {
            Ok(call) => call.await,
            Err(e) => Err(e),
        };
        let remote = match remote {
            Ok(()) => true,
            Err(e) => {
                self.log_fallback("delete", &e);
                false
            }
        };

        let local = self.local_delete(id).unwrap_or_else(|e| {
            warn!(collection = T::COLLECTION, id, error = %e, "local delete failed");
            false
        });

        self.notify(id, ChangeKind::Deleted);
        DeleteReceipt { remote, local }
    }

    // ------------------------------------------------------------------
    // Remote side
    // ------------------------------------------------------------------

    fn remote_call(&self) -> Result<&dyn RemoteStore, StoreError> {
        self.remote.as_deref().ok_or(StoreError::NotConfigured)
    }

    async fn remote_insert(&self, doc: &Value) -> Result<(), StoreError> {
        self.remote_call()?.insert(T::COLLECTION, doc).await
    }

    async fn remote_list(&self, query: &ListQuery) -> Result<Vec<Value>, StoreError> {
        self.remote_call()?.list(T::COLLECTION, query).await
    }

    fn log_fallback(&self, op: &'static str, err: &StoreError) {
        if err.is_soft() {
            debug!(collection = T::COLLECTION, op, reason = %err, "remote store unavailable, using local");
        } else {
            warn!(collection = T::COLLECTION, op, error = %err, "remote store failed, using local");
        }
    }

    // ------------------------------------------------------------------
    // Local side
    // ------------------------------------------------------------------

    fn local_rows(&self) -> Result<Vec<Value>, StoreError> {
        Ok(self.local.try_get(T::COLLECTION)?.unwrap_or_default())
    }

    fn store_rows(&self, rows: &mut [Value]) -> Result<(), StoreError> {
        sort_newest_first(rows, |row| {
            row.get(T::TIMESTAMP_FIELD)
                .and_then(Value::as_str)
                .unwrap_or("")
        });
        self.local.set(T::COLLECTION, &*rows)
    }

    fn local_insert(&self, doc: Value) -> Result<(), StoreError> {
        let mut rows = self.local_rows()?;
        rows.push(doc);
        self.store_rows(&mut rows)
    }

    fn local_update(&self, id: &str, patch: &Map<String, Value>) -> Result<bool, StoreError> {
        let mut rows = self.local_rows()?;
        let Some(row) = rows.iter_mut().find(|row| row_id(row) == Some(id)) else {
            return Ok(false);
        };

        let mut patched = row.clone();
        merge_patch(&mut patched, patch);
        // Keep the stored copy readable as `T`.
        serde_json::from_value::<T>(patched.clone())?;
        *row = patched;

        self.store_rows(&mut rows)?;
        Ok(true)
    }

    fn local_delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut rows = self.local_rows()?;
        let before = rows.len();
        rows.retain(|row| row_id(row) != Some(id));
        let removed = rows.len() != before;
        if removed {
            self.store_rows(&mut rows)?;
        }
        Ok(removed)
    }

    fn notify(&self, id: &str, kind: ChangeKind) {
        // No subscribers is fine.
        let _ = self.changes.send(Change {
            collection: T::COLLECTION,
            id: id.to_string(),
            kind,
        });
    }
}

fn row_id(row: &Value) -> Option<&str> {
    row.get("id").and_then(Value::as_str)
}

fn matches_filter(row: &Value, filter: &[(String, String)]) -> bool {
    filter.iter().all(|(field, expected)| match row.get(field) {
        Some(Value::String(s)) => s == expected,
        Some(Value::Null) | None => false,
        Some(other) => other.to_string() == *expected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{DietRecord, Photo};
    use crate::remote::MockRemote;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn diet(food: &str, feed_time: &str) -> DietRecord {
        DietRecord {
            food_type: food.into(),
            amount: 100.0,
            feed_time: feed_time.into(),
            ..Default::default()
        }
    }

    fn sequential_ids() -> IdGenerator {
        let counter = Arc::new(AtomicUsize::new(0));
        Arc::new(move || format!("id-{}", counter.fetch_add(1, Ordering::SeqCst)))
    }

    fn local_repo<T: Entity>() -> (Repository<T>, LocalStore) {
        let local = LocalStore::in_memory();
        let repo = Repository::new(None, local.clone(), "1").with_id_generator(sequential_ids());
        (repo, local)
    }

    fn remote_repo<T: Entity>(remote: Arc<MockRemote>) -> (Repository<T>, LocalStore) {
        let local = LocalStore::in_memory();
        let remote: Arc<dyn RemoteStore> = remote;
        let repo =
            Repository::new(Some(remote), local.clone(), "1").with_id_generator(sequential_ids());
        (repo, local)
    }

    fn transient(_: &str) -> StoreError {
        StoreError::Transient("connection refused".into())
    }

    fn missing(collection: &str) -> StoreError {
        StoreError::NotProvisioned(collection.to_string())
    }

    #[tokio::test]
    async fn test_diet_record_from_hosted_table_json() {
        let (repo, _local) = local_repo::<DietRecord>();
        let first: DietRecord = serde_json::from_value(serde_json::json!({
            "food_type": "kibble",
            "amount": 100,
            "feeding_time": "2024-01-01T08:00"
        }))
        .unwrap();
        let second: DietRecord = serde_json::from_value(serde_json::json!({
            "food_type": "kibble",
            "amount": 100,
            "feeding_time": "2024-01-02T08:00"
        }))
        .unwrap();
        repo.create(first).await.unwrap();
        repo.create(second).await.unwrap();

        let listed = repo.list(None).await;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].feed_time, "2024-01-02T08:00");
        assert_eq!(listed[1].feed_time, "2024-01-01T08:00");
        assert_eq!(listed[0].amount, 100.0);
    }

    #[tokio::test]
    async fn test_diet_scenario_without_remote() {
        let (repo, _local) = local_repo::<DietRecord>();

        let receipt = repo.create(diet("kibble", "2024-01-01T08:00")).await.unwrap();
        assert_eq!(receipt.location, Location::Local);
        let listed = repo.list(None).await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].amount, 100.0);
        assert_eq!(listed[0].food_type, "kibble");

        repo.create(diet("kibble", "2024-01-02T08:00")).await.unwrap();
        let listed = repo.list(None).await;
        assert_eq!(listed[0].feed_time, "2024-01-02T08:00");
        assert_eq!(listed[1].feed_time, "2024-01-01T08:00");
    }

    #[tokio::test]
    async fn test_create_assigns_id_scope_and_timestamp() {
        let (repo, _local) = local_repo::<DietRecord>();
        let receipt = repo.create(diet("wet food", "")).await.unwrap();
        assert_eq!(receipt.id, "id-0");

        let stored = repo.get("id-0").await.unwrap();
        assert_eq!(stored.pet_id, "1");
        assert!(crate::ordering::parse_timestamp(&stored.feed_time).is_some());
    }

    #[tokio::test]
    async fn test_create_keeps_caller_id() {
        let (repo, _local) = local_repo::<DietRecord>();
        let mut record = diet("kibble", "2024-01-01T08:00");
        record.id = "mine".into();
        assert_eq!(repo.create(record).await.unwrap().id, "mine");
    }

    #[tokio::test]
    async fn test_create_round_trip_through_remote() {
        let remote = Arc::new(MockRemote::new());
        let (repo, local) = remote_repo::<DietRecord>(remote.clone());

        let receipt = repo.create(diet("kibble", "2024-01-01T08:00")).await.unwrap();
        assert_eq!(receipt.location, Location::Remote);
        assert_eq!(remote.rows("diet_records").len(), 1);
        // Remote success does not write locally.
        assert!(local.get::<Vec<Value>>("diet_records", vec![]).is_empty());

        let listed = repo.list(None).await;
        let matching: Vec<_> = listed.iter().filter(|r| r.id == receipt.id).collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].food_type, "kibble");
        assert_eq!(matching[0].feed_time, "2024-01-01T08:00");
    }

    #[tokio::test]
    async fn test_validation_blocks_store_calls() {
        let remote = Arc::new(MockRemote::new());
        let (repo, _local) = remote_repo::<DietRecord>(remote.clone());

        let err = repo.create(diet("", "2024-01-01T08:00")).await.unwrap_err();
        assert!(matches!(err, SubmitError::Validation(ref v) if v.field == "food_type"));
        assert_eq!(remote.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_not_provisioned_falls_back_silently() {
        let remote = Arc::new(MockRemote::failing(missing));
        let (repo, local) = remote_repo::<DietRecord>(remote);

        let receipt = repo.create(diet("kibble", "2024-01-01T08:00")).await.unwrap();
        assert_eq!(receipt.location, Location::Local);
        assert_eq!(local.get::<Vec<Value>>("diet_records", vec![]).len(), 1);
        assert_eq!(repo.list(None).await.len(), 1);
    }

    #[tokio::test]
    async fn test_remote_results_are_resorted_with_stable_ties() {
        let remote = Arc::new(MockRemote::new());
        let (repo, _local) = remote_repo::<DietRecord>(remote);

        for (food, ts) in [
            ("a", "2024-01-01T08:00"),
            ("b", "2024-01-03T08:00"),
            ("c", "2024-01-01T08:00"),
            ("d", "2024-01-02T08:00"),
        ] {
            repo.create(diet(food, ts)).await.unwrap();
        }
        let foods: Vec<String> = repo.list(None).await.into_iter().map(|r| r.food_type).collect();
        assert_eq!(foods, vec!["b", "d", "a", "c"]);
    }

    #[tokio::test]
    async fn test_local_sort_is_stable_for_same_minute() {
        let (repo, local) = local_repo::<DietRecord>();
        for food in ["first", "second", "third"] {
            repo.create(diet(food, "2024-01-01T08:00")).await.unwrap();
        }
        let foods: Vec<String> = repo.list(None).await.into_iter().map(|r| r.food_type).collect();
        assert_eq!(foods, vec!["first", "second", "third"]);

        // Stored newest first as well.
        repo.create(diet("later", "2024-01-01T09:00")).await.unwrap();
        let stored: Vec<Value> = local.get("diet_records", vec![]);
        assert_eq!(stored[0]["food_type"], "later");
    }

    #[tokio::test]
    async fn test_list_limit_applies_on_both_paths() {
        let (local_only, _) = local_repo::<DietRecord>();
        let (with_remote, _) = remote_repo::<DietRecord>(Arc::new(MockRemote::new()));
        for repo in [&local_only, &with_remote] {
            for day in 1..=5 {
                repo.create(diet("kibble", &format!("2024-01-0{day}T08:00")))
                    .await
                    .unwrap();
            }
            let listed = repo.list(Some(2)).await;
            assert_eq!(listed.len(), 2);
        }
        // The mock truncates before sorting, like a store without ordering.
        assert_eq!(local_only.list(Some(2)).await[0].feed_time, "2024-01-05T08:00");
    }

    #[tokio::test]
    async fn test_list_is_scoped_to_pet() {
        let local = LocalStore::in_memory();
        let koala: Repository<DietRecord> = Repository::new(None, local.clone(), "1");
        let mochi: Repository<DietRecord> = Repository::new(None, local, "2");

        koala.create(diet("kibble", "2024-01-01T08:00")).await.unwrap();
        mochi.create(diet("raw", "2024-01-01T08:00")).await.unwrap();

        let listed = koala.list(None).await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].food_type, "kibble");
    }

    #[tokio::test]
    async fn test_update_is_idempotent_and_mirrors_locally() {
        let (repo, _local) = local_repo::<Photo>();
        let receipt = repo
            .create(Photo {
                image: "data:image/png;base64,AA==".into(),
                taken_at: "2024-05-01T10:00".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        let patch = serde_json::json!({"description": "beach day", "tags": ["beach"]});
        let patch = patch.as_object().unwrap();

        let first = repo.update(&receipt.id, patch).await;
        assert_eq!(first, UpdateReceipt { remote: false, local: true });
        let once = repo.get(&receipt.id).await.unwrap();

        repo.update(&receipt.id, patch).await;
        let twice = repo.get(&receipt.id).await.unwrap();
        assert_eq!(once, twice);
        assert_eq!(twice.description.as_deref(), Some("beach day"));
        assert_eq!(twice.tags, vec!["beach".to_string()]);
    }

    #[tokio::test]
    async fn test_update_rejects_patch_that_breaks_record() {
        let (repo, _local) = local_repo::<DietRecord>();
        let receipt = repo.create(diet("kibble", "2024-01-01T08:00")).await.unwrap();

        let patch = serde_json::json!({"amount": "lots"});
        let result = repo.update(&receipt.id, patch.as_object().unwrap()).await;
        assert!(!result.local);
        assert_eq!(repo.get(&receipt.id).await.unwrap().amount, 100.0);
    }

    #[tokio::test]
    async fn test_update_mirrors_local_even_when_remote_succeeds() {
        let remote = Arc::new(MockRemote::new());
        let (repo, local) = remote_repo::<DietRecord>(remote.clone());

        // Written locally during an outage.
        *remote.failure.lock().unwrap() = Some(transient);
        let receipt = repo.create(diet("kibble", "2024-01-01T08:00")).await.unwrap();
        assert_eq!(receipt.location, Location::Local);

        *remote.failure.lock().unwrap() = None;
        let patch = serde_json::json!({"notes": "ate slowly"});
        let result = repo.update(&receipt.id, patch.as_object().unwrap()).await;
        assert_eq!(result, UpdateReceipt { remote: true, local: true });

        let stored: Vec<Value> = local.get("diet_records", vec![]);
        assert_eq!(stored[0]["notes"], "ate slowly");
    }

    #[tokio::test]
    async fn test_delete_removes_local_only_record() {
        let remote = Arc::new(MockRemote::failing(transient));
        let (repo, _local) = remote_repo::<DietRecord>(remote);

        let receipt = repo.create(diet("kibble", "2024-01-01T08:00")).await.unwrap();
        let result = repo.delete(&receipt.id).await;
        assert_eq!(result, DeleteReceipt { remote: false, local: true });
        assert!(repo.list(None).await.iter().all(|r| r.id != receipt.id));
    }

    #[tokio::test]
    async fn test_delete_from_remote() {
        let remote = Arc::new(MockRemote::new());
        let (repo, _local) = remote_repo::<DietRecord>(remote.clone());

        let receipt = repo.create(diet("kibble", "2024-01-01T08:00")).await.unwrap();
        let result = repo.delete(&receipt.id).await;
        assert!(result.remote);
        assert!(!result.local);
        assert!(repo.list(None).await.is_empty());
    }

    async fn exercise(repo: &Repository<DietRecord>) -> Vec<DietRecord> {
        let a = repo.create(diet("kibble", "2024-01-01T08:00")).await.unwrap();
        let b = repo.create(diet("chicken", "2024-01-02T08:00")).await.unwrap();
        repo.create(diet("rice", "2024-01-03T08:00")).await.unwrap();
        let patch = serde_json::json!({"notes": "half portion"});
        repo.update(&a.id, patch.as_object().unwrap()).await;
        repo.delete(&b.id).await;
        repo.list(None).await
    }

    #[tokio::test]
    async fn test_failing_remote_matches_healthy_remote() {
        let (healthy, _) = remote_repo::<DietRecord>(Arc::new(MockRemote::new()));
        let (failing, _) = remote_repo::<DietRecord>(Arc::new(MockRemote::failing(transient)));
        let (absent, _) = local_repo::<DietRecord>();

        let expected = exercise(&healthy).await;
        assert_eq!(expected.len(), 2);
        assert_eq!(expected[1].notes.as_deref(), Some("half portion"));
        assert_eq!(exercise(&failing).await, expected);
        assert_eq!(exercise(&absent).await, expected);
    }

    #[tokio::test]
    async fn test_double_submit_is_rejected() {
        let mut mock = MockRemote::new();
        mock.delay = Some(Duration::from_millis(50));
        let (repo, _local) = remote_repo::<DietRecord>(Arc::new(mock));

        let (first, second) = tokio::join!(
            repo.create(diet("kibble", "2024-01-01T08:00")),
            repo.create(diet("kibble", "2024-01-01T08:00")),
        );
        assert!(first.is_ok());
        assert_eq!(second.unwrap_err(), SubmitError::InFlight);

        // Guard is released once the first write finishes.
        assert!(repo.create(diet("kibble", "2024-01-01T08:01")).await.is_ok());
    }

    #[tokio::test]
    async fn test_local_failure_reports_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let local = LocalStore::open(dir.path(), "default").unwrap();
        // A directory where the collection file should be makes writes fail.
        std::fs::create_dir(dir.path().join("default").join("diet_records.json")).unwrap();
        let repo: Repository<DietRecord> = Repository::new(None, local, "1");

        let receipt = repo.create(diet("kibble", "2024-01-01T08:00")).await.unwrap();
        assert_eq!(receipt.location, Location::Dropped);
        assert!(repo.list(None).await.is_empty());
    }

    #[tokio::test]
    async fn test_writes_emit_changes() {
        let (repo, _local) = local_repo::<DietRecord>();
        let mut rx = repo.subscribe();

        let receipt = repo.create(diet("kibble", "2024-01-01T08:00")).await.unwrap();
        repo.delete(&receipt.id).await;

        let created = rx.recv().await.unwrap();
        assert_eq!(created.kind, ChangeKind::Created);
        assert_eq!(created.collection, "diet_records");
        assert_eq!(rx.recv().await.unwrap().kind, ChangeKind::Deleted);
    }

    #[test]
    fn test_matches_filter_handles_non_strings() {
        let row = serde_json::json!({"pet_id": "1", "resolved": false, "n": 3});
        assert!(matches_filter(&row, &[("resolved".into(), "false".into())]));
        assert!(matches_filter(&row, &[("n".into(), "3".into())]));
        assert!(!matches_filter(&row, &[("missing".into(), "x".into())]));
    }
}
