// End-to-end tests: primary store mutations flowing into the shadow index and
// back out through search.
use serde_json::{json, Map, Value};
use shadowvec::{
    AccessContext, AccessRule, CollectionDescriptor, Deadline, Error, EventBus, FieldKind,
    FieldSpec, FilterCondition, ListQuery, MemoryRecordStore, MutationSynchronizer, QueryEngine,
    QueryEngineConfig, Record, RecordId, RecordStore, RowId, SearchCriteria, SearchRequest,
    ShadowIndex, ShadowPool, ShadowPoolConfig, Vector, MAX_SEARCH_RESULTS,
};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Harness {
    _dir: tempfile::TempDir,
    pool: Arc<ShadowPool>,
    index: ShadowIndex,
    store: Arc<MemoryRecordStore>,
    engine: QueryEngine,
}

fn pool_config() -> ShadowPoolConfig {
    ShadowPoolConfig {
        max_readers: 8,
        map_size: 256 * 1024 * 1024,
        max_tables: 32,
        ..ShadowPoolConfig::default()
    }
}

fn wire(store: Arc<MemoryRecordStore>, bus: &EventBus, index: &ShadowIndex) -> QueryEngine {
    Arc::new(MutationSynchronizer::new(
        store.clone(),
        index.clone(),
        Duration::from_secs(10),
    ))
    .register(bus);
    QueryEngine::new(store, index.clone(), QueryEngineConfig::default())
}

fn open(dir: &Path) -> (Arc<ShadowPool>, ShadowIndex) {
    open_with(dir, pool_config())
}

fn open_with(dir: &Path, config: ShadowPoolConfig) -> (Arc<ShadowPool>, ShadowIndex) {
    let pool = Arc::new(ShadowPool::open(dir, config).unwrap());
    let index = ShadowIndex::new(pool.clone());
    (pool, index)
}

fn harness() -> Harness {
    harness_in(tempfile::tempdir().unwrap(), pool_config())
}

fn harness_in(dir: tempfile::TempDir, config: ShadowPoolConfig) -> Harness {
    let (pool, index) = open_with(dir.path(), config);
    let bus = Arc::new(EventBus::new());
    let store = Arc::new(MemoryRecordStore::new(bus.clone()));
    let engine = wire(store.clone(), &bus, &index);

    store
        .create_collection(
            CollectionDescriptor::builder("articles")
                .field(FieldSpec::new("title", FieldKind::Text))
                .field(FieldSpec::new("published", FieldKind::Bool))
                .field(FieldSpec::new("notes", FieldKind::Text).hidden())
                .vector_field("embedding")
                .dimensionality(4)
                .list_rule(AccessRule::Filter(FilterCondition::equals("published", true)))
                .build()
                .unwrap(),
        )
        .unwrap();

    Harness {
        _dir: dir,
        pool,
        index,
        store,
        engine,
    }
}

fn data(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

fn search(vector: &[f32], access: AccessContext) -> SearchRequest {
    let criteria = SearchCriteria::from_value(json!({ "embedding": vector })).unwrap();
    SearchRequest::new("articles", criteria, access)
}

fn ids(set: &shadowvec::SearchResultSet) -> Vec<String> {
    set.items
        .iter()
        .map(|i| i.item["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_round_trip_self_match() {
    let h = harness();
    for (id, v) in [
        ("one", [1.0, 0.0, 0.0, 0.0]),
        ("two", [0.0, 1.0, 0.0, 0.0]),
        ("three", [0.0, 0.0, 1.0, 0.0]),
    ] {
        let outcome = h
            .store
            .create(
                "articles",
                Some(RecordId::new(id)),
                data(json!({"title": id, "published": true, "embedding": v})),
            )
            .await
            .unwrap();
        assert!(outcome.hook_errors.is_empty());
    }

    let set = h
        .engine
        .search(search(&[0.0, 1.0, 0.0, 0.0], AccessContext::guest()))
        .await
        .unwrap();
    assert_eq!(set.total_items, 3);
    assert_eq!(ids(&set)[0], "two");
    assert_eq!(set.items[0].distance, 0.0);
    assert!(set.items.windows(2).all(|w| w[0].distance <= w[1].distance));
}

#[tokio::test]
async fn test_update_and_delete_are_reflected() {
    let h = harness();
    h.store
        .create(
            "articles",
            Some(RecordId::new("a")),
            data(json!({"published": true, "embedding": [1.0, 0.0, 0.0, 0.0]})),
        )
        .await
        .unwrap();

    let outcome = h
        .store
        .update(
            "articles",
            &RecordId::new("a"),
            data(json!({"embedding": [0.0, 0.0, 0.0, 1.0]})),
        )
        .await
        .unwrap();
    assert!(outcome.hook_errors.is_empty());

    let set = h
        .engine
        .search(search(&[0.0, 0.0, 0.0, 1.0], AccessContext::guest()))
        .await
        .unwrap();
    assert_eq!(ids(&set), vec!["a"]);
    assert_eq!(set.items[0].distance, 0.0);

    h.store.delete("articles", &RecordId::new("a")).await.unwrap();
    let set = h
        .engine
        .search(search(&[0.0, 0.0, 0.0, 1.0], AccessContext::guest()))
        .await
        .unwrap();
    assert_eq!(set.total_items, 0);
    assert!(set.items.is_empty());
}

#[tokio::test]
async fn test_limit_is_clamped_to_ceiling() {
    let h = harness();
    for i in 0..(MAX_SEARCH_RESULTS + 20) {
        h.store
            .create(
                "articles",
                None,
                data(json!({"published": true, "embedding": [i as f32, 0.0, 0.0, 0.0]})),
            )
            .await
            .unwrap();
    }

    let set = h
        .engine
        .search(search(&[0.0, 0.0, 0.0, 0.0], AccessContext::guest()).with_limit(1000))
        .await
        .unwrap();
    assert_eq!(set.total_items, MAX_SEARCH_RESULTS);
    assert_eq!(set.items.len(), MAX_SEARCH_RESULTS);
    assert_eq!(set.items.last().unwrap().distance, (MAX_SEARCH_RESULTS - 1) as f32);
}

#[tokio::test]
async fn test_access_filtering_keeps_total() {
    let h = harness();
    for (id, published, x) in [("p1", true, 0.0), ("d1", false, 0.5), ("p2", true, 1.0)] {
        h.store
            .create(
                "articles",
                Some(RecordId::new(id)),
                data(json!({"published": published, "notes": "internal", "embedding": [x, 0.0, 0.0, 0.0]})),
            )
            .await
            .unwrap();
    }

    let guest = h
        .engine
        .search(search(&[0.0; 4], AccessContext::guest()))
        .await
        .unwrap();
    assert_eq!(guest.total_items, 3);
    assert_eq!(ids(&guest), vec!["p1", "p2"]);
    assert!(guest.items.iter().all(|i| i.item.get("notes").is_none()));

    let admin = h
        .engine
        .search(search(&[0.0; 4], AccessContext::admin()))
        .await
        .unwrap();
    assert_eq!(ids(&admin), vec!["p1", "d1", "p2"]);
    assert_eq!(admin.items[0].item["notes"], "internal");
}

#[tokio::test]
async fn test_multiple_criteria_rejected_before_storage() {
    let h = harness();
    h.pool.close().await;

    let err = SearchCriteria::from_value(json!({
        "embedding": [0.0, 0.0, 0.0, 0.0],
        "other": [1.0]
    }))
    .unwrap_err();
    assert!(matches!(err, Error::Validation(ref m) if m.contains("one field")));

    // The closed pool shows up only once a valid search reaches storage.
    let err = h
        .engine
        .search(search(&[0.0; 4], AccessContext::guest()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Storage(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_writes_create_one_table() {
    let h = harness();
    let store = h.store.clone();

    let mut tasks = Vec::new();
    for i in 0..16 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            store
                .create(
                    "articles",
                    None,
                    data(json!({"published": true, "embedding": [i as f32, 1.0, 0.0, 0.0]})),
                )
                .await
        }));
    }
    for task in tasks {
        let outcome = task.await.unwrap().unwrap();
        assert!(outcome.hook_errors.is_empty(), "{:?}", outcome.hook_errors);
    }

    assert_eq!(h.pool.stats().tables, 1);
    assert_eq!(h.pool.stats().peak_writers, 1);
    let stats = h.index.describe("articles", Deadline::none()).await.unwrap().unwrap();
    assert_eq!(stats.rows, 16);
    assert_eq!(stats.schema.columns, vec!["embedding"]);
}

#[tokio::test]
async fn test_dimension_mismatch_writes_no_row() {
    let h = harness();
    let outcome = h
        .store
        .create(
            "articles",
            None,
            data(json!({"published": true, "embedding": [1.0, 2.0, 3.0]})),
        )
        .await
        .unwrap();
    assert!(matches!(
        outcome.hook_errors.as_slice(),
        [Error::InvalidDimension { expected: 4, actual: 3 }]
    ));

    let stats = h.index.describe("articles", Deadline::none()).await.unwrap().unwrap();
    assert_eq!(stats.rows, 0);

    let err = h
        .engine
        .search(search(&[1.0, 2.0, 3.0], AccessContext::guest()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidDimension { .. }));
}

#[tokio::test]
async fn test_non_vector_collection_has_no_shadow_table() {
    let h = harness();
    h.store
        .create_collection(
            CollectionDescriptor::builder("comments")
                .field(FieldSpec::new("body", FieldKind::Text))
                .build()
                .unwrap(),
        )
        .unwrap();
    let outcome = h
        .store
        .create("comments", None, data(json!({"body": "hi"})))
        .await
        .unwrap();
    assert!(outcome.hook_errors.is_empty());
    assert!(h.index.describe("comments", Deadline::none()).await.unwrap().is_none());

    let criteria = SearchCriteria::from_value(json!({"body": [1.0]})).unwrap();
    let err = h
        .engine
        .search(SearchRequest::new("comments", criteria, AccessContext::admin()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Schema(_)));
}

#[tokio::test]
async fn test_shadow_tables_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let (pool, index) = open(dir.path());
        let schema = shadowvec::ShadowTableSchema {
            table: "vss_articles".to_string(),
            collection: "articles".to_string(),
            dimensionality: 2,
            columns: vec!["embedding".to_string()],
        };
        let schema = index.create_table(schema, Deadline::none()).await.unwrap();
        index
            .insert(
                &schema,
                RowId(42),
                shadowvec::ShadowRow::new().with("embedding", Vector::from_slice(&[3.0, 4.0])),
                Deadline::none(),
            )
            .await
            .unwrap();
        pool.close().await;
    }

    let (pool, index) = open(dir.path());
    assert_eq!(pool.stats().tables, 1);
    let hits = index
        .knn("articles", "embedding", Vector::from_slice(&[0.0, 0.0]), 5, Deadline::none())
        .await
        .unwrap();
    assert_eq!(hits, vec![(RowId(42), 5.0)]);
    pool.close().await;
}

#[tokio::test]
async fn test_failed_update_is_reported_and_keeps_old_row() {
    let h = harness();
    h.store
        .create(
            "articles",
            Some(RecordId::new("a")),
            data(json!({"published": true, "embedding": [1.0, 0.0, 0.0, 0.0]})),
        )
        .await
        .unwrap();

    let outcome = h
        .store
        .update(
            "articles",
            &RecordId::new("a"),
            data(json!({"embedding": [0.0, 1.0, 0.0]})),
        )
        .await
        .unwrap();
    assert!(matches!(
        outcome.hook_errors.as_slice(),
        [Error::InvalidDimension { expected: 4, actual: 3 }]
    ));

    let set = h
        .engine
        .search(search(&[1.0, 0.0, 0.0, 0.0], AccessContext::guest()))
        .await
        .unwrap();
    assert_eq!(ids(&set), vec!["a"]);
    assert_eq!(set.items[0].distance, 0.0);
}

#[tokio::test]
async fn test_restart_with_fresh_store_drops_stale_rows() {
    let dir = tempfile::tempdir().unwrap();
    let (pool, index) = open(dir.path());
    let bus = Arc::new(EventBus::new());
    let store = Arc::new(MemoryRecordStore::new(bus.clone()));
    wire(store.clone(), &bus, &index);
    store
        .create_collection(
            CollectionDescriptor::builder("articles")
                .vector_field("embedding")
                .dimensionality(4)
                .build()
                .unwrap(),
        )
        .unwrap();
    let outcome = store
        .create(
            "articles",
            Some(RecordId::new("old")),
            data(json!({"embedding": [1.0, 0.0, 0.0, 0.0]})),
        )
        .await
        .unwrap();
    assert!(outcome.hook_errors.is_empty());
    pool.close().await;

    // Same directory, new process: the record store starts empty again.
    let h = harness_in(
        dir,
        ShadowPoolConfig {
            reset_on_open: true,
            ..pool_config()
        },
    );
    let outcome = h
        .store
        .create(
            "articles",
            Some(RecordId::new("new")),
            data(json!({"published": true, "embedding": [0.0, 0.0, 0.0, 9.0]})),
        )
        .await
        .unwrap();
    assert!(outcome.hook_errors.is_empty(), "{:?}", outcome.hook_errors);

    let set = h
        .engine
        .search(search(&[1.0, 0.0, 0.0, 0.0], AccessContext::guest()))
        .await
        .unwrap();
    assert_eq!(set.total_items, 1);
    assert_eq!(ids(&set), vec!["new"]);
    assert!((set.items[0].distance - 82f32.sqrt()).abs() < 1e-5);
}

/// Deletes one record the first time the engine resolves search hits.
struct DeletingStore {
    inner: Arc<MemoryRecordStore>,
    victim: Mutex<Option<RecordId>>,
}

impl DeletingStore {
    fn delete_victim(&self, collection: &str) {
        let victim = self.victim.lock().unwrap().take();
        if let Some(id) = victim {
            let store = self.inner.clone();
            let collection = collection.to_string();
            tokio::task::block_in_place(|| {
                tokio::runtime::Handle::current()
                    .block_on(async move { store.delete(&collection, &id).await })
            })
            .unwrap();
        }
    }
}

impl RecordStore for DeletingStore {
    fn collection(&self, name: &str) -> shadowvec::Result<Arc<CollectionDescriptor>> {
        self.inner.collection(name)
    }

    fn row_id(&self, collection: &str, id: &RecordId) -> shadowvec::Result<RowId> {
        self.inner.row_id(collection, id)
    }

    fn record_ids_for_rows(
        &self,
        collection: &str,
        rows: &[RowId],
    ) -> shadowvec::Result<Vec<(RecordId, RowId)>> {
        let resolved = self.inner.record_ids_for_rows(collection, rows)?;
        self.delete_victim(collection);
        Ok(resolved)
    }

    fn list(&self, collection: &str, query: &ListQuery) -> shadowvec::Result<Vec<Record>> {
        self.inner.list(collection, query)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_delete_during_search_leaves_no_dangling_item() {
    let h = harness();
    for (id, x) in [("a", 0.0), ("b", 1.0), ("c", 2.0)] {
        h.store
            .create(
                "articles",
                Some(RecordId::new(id)),
                data(json!({"published": true, "embedding": [x, 0.0, 0.0, 0.0]})),
            )
            .await
            .unwrap();
    }

    let racing = Arc::new(DeletingStore {
        inner: h.store.clone(),
        victim: Mutex::new(Some(RecordId::new("b"))),
    });
    let engine = QueryEngine::new(racing.clone(), h.index.clone(), QueryEngineConfig::default());

    let set = engine
        .search(search(&[0.0; 4], AccessContext::admin()))
        .await
        .unwrap();
    assert!(racing.victim.lock().unwrap().is_none());
    assert_eq!(set.total_items, 3);
    assert_eq!(ids(&set), vec!["a", "c"]);
    for item in &set.items {
        let id = RecordId::new(item.item["id"].as_str().unwrap());
        assert!(h.store.get("articles", &id).is_ok());
    }

    let after = h
        .engine
        .search(search(&[0.0; 4], AccessContext::admin()))
        .await
        .unwrap();
    assert_eq!(after.total_items, 2);
    assert_eq!(ids(&after), vec!["a", "c"]);
}
