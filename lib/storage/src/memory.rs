// In-memory primary record store.
//
// Collections hold records in row-id order. Mutations commit under the table
// lock and publish lifecycle events on the shared EventBus: AfterCreate and
// AfterUpdate once committed, BeforeDelete while the record still exists.
use crate::primary::RecordStore;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use shadowvec_core::{
    CollectionDescriptor, Error, EventBus, EventKind, FieldKind, ListQuery, Record, RecordId,
    Result, RowId, Vector, SHADOW_TABLE_PREFIX,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone)]
struct StoredRow {
    id: RecordId,
    data: Map<String, Value>,
    created: chrono::DateTime<Utc>,
    updated: chrono::DateTime<Utc>,
}

struct CollectionTable {
    descriptor: Arc<CollectionDescriptor>,
    rows: BTreeMap<RowId, StoredRow>,
    by_id: HashMap<RecordId, RowId>,
    next_row: u64,
}

impl CollectionTable {
    fn new(descriptor: Arc<CollectionDescriptor>) -> Self {
        Self {
            descriptor,
            rows: BTreeMap::new(),
            by_id: HashMap::new(),
            next_row: 1,
        }
    }

    fn materialize(&self, row: &StoredRow) -> Record {
        Record::new(
            row.id.clone(),
            self.descriptor.clone(),
            row.data.clone(),
            row.created,
            row.updated,
        )
    }

    fn lookup(&self, id: &RecordId) -> Result<(RowId, &StoredRow)> {
        self.by_id
            .get(id)
            .and_then(|row_id| self.rows.get(row_id).map(|row| (*row_id, row)))
            .ok_or_else(|| {
                Error::NotFound(format!("record {} in {}", id, self.descriptor.name()))
            })
    }
}

/// Result of a mutation: the record as committed plus whatever the lifecycle
/// handlers reported. Handler failures never undo the mutation.
#[derive(Debug)]
pub struct MutationOutcome {
    pub record: Arc<Record>,
    pub hook_errors: Vec<Error>,
}

pub struct MemoryRecordStore {
    collections: RwLock<HashMap<String, CollectionTable>>,
    events: Arc<EventBus>,
}

impl MemoryRecordStore {
    pub fn new(events: Arc<EventBus>) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            events,
        }
    }

    #[inline]
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn create_collection(&self, descriptor: CollectionDescriptor) -> Result<Arc<CollectionDescriptor>> {
        if descriptor.name().starts_with(SHADOW_TABLE_PREFIX) {
            return Err(Error::Schema(format!(
                "collection names starting with {} are reserved",
                SHADOW_TABLE_PREFIX
            )));
        }

        let mut collections = self.collections.write();
        if collections.contains_key(descriptor.name()) {
            return Err(Error::CollectionExists(descriptor.name().to_string()));
        }
        let descriptor = Arc::new(descriptor);
        collections.insert(
            descriptor.name().to_string(),
            CollectionTable::new(descriptor.clone()),
        );
        Ok(descriptor)
    }

    pub fn list_collections(&self) -> Vec<Arc<CollectionDescriptor>> {
        let mut all: Vec<_> = self
            .collections
            .read()
            .values()
            .map(|t| t.descriptor.clone())
            .collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    pub fn get(&self, collection: &str, id: &RecordId) -> Result<Record> {
        let collections = self.collections.read();
        let table = table(&collections, collection)?;
        let (_, row) = table.lookup(id)?;
        Ok(table.materialize(row))
    }

    pub fn count(&self, collection: &str) -> Result<usize> {
        Ok(table(&self.collections.read(), collection)?.rows.len())
    }

    pub async fn create(
        &self,
        collection: &str,
        id: Option<RecordId>,
        data: Map<String, Value>,
    ) -> Result<MutationOutcome> {
        let record = {
            let mut collections = self.collections.write();
            let table = table_mut(&mut collections, collection)?;
            validate_data(&table.descriptor, &data)?;

            let id = id.unwrap_or_else(RecordId::generate);
            if table.by_id.contains_key(&id) {
                return Err(Error::Validation(format!(
                    "record {} already exists in {}",
                    id, collection
                )));
            }

            let row_id = RowId(table.next_row);
            table.next_row += 1;
            let now = Utc::now();
            let row = StoredRow {
                id: id.clone(),
                data,
                created: now,
                updated: now,
            };
            let record = Arc::new(table.materialize(&row));
            table.rows.insert(row_id, row);
            table.by_id.insert(id, row_id);
            record
        };

        let hook_errors = self.publish(EventKind::AfterCreate, record.clone()).await;
        Ok(MutationOutcome { record, hook_errors })
    }

    /// Merge `patch` into the record. A `null` value clears a field.
    pub async fn update(
        &self,
        collection: &str,
        id: &RecordId,
        patch: Map<String, Value>,
    ) -> Result<MutationOutcome> {
        let record = {
            let mut collections = self.collections.write();
            let table = table_mut(&mut collections, collection)?;
            validate_data(&table.descriptor, &patch)?;

            let (row_id, _) = table.lookup(id)?;
            let descriptor = table.descriptor.clone();
            let row = table
                .rows
                .get_mut(&row_id)
                .ok_or_else(|| Error::NotFound(format!("record {} in {}", id, collection)))?;
            row.data.extend(patch);
            row.updated = Utc::now();
            Arc::new(Record::new(
                row.id.clone(),
                descriptor,
                row.data.clone(),
                row.created,
                row.updated,
            ))
        };

        let hook_errors = self.publish(EventKind::AfterUpdate, record.clone()).await;
        Ok(MutationOutcome { record, hook_errors })
    }

    pub async fn delete(&self, collection: &str, id: &RecordId) -> Result<MutationOutcome> {
        let record = Arc::new(self.get(collection, id)?);

        let hook_errors = self.publish(EventKind::BeforeDelete, record.clone()).await;

        let mut collections = self.collections.write();
        let table = table_mut(&mut collections, collection)?;
        if let Some(row_id) = table.by_id.remove(id) {
            table.rows.remove(&row_id);
        }
        Ok(MutationOutcome { record, hook_errors })
    }

    async fn publish(&self, kind: EventKind, record: Arc<Record>) -> Vec<Error> {
        let id = record.id().clone();
        let collection = record.collection().name().to_string();
        self.events
            .dispatch(kind, record)
            .await
            .into_iter()
            .filter_map(|result| result.err())
            .inspect(|error| {
                warn!(
                    collection = %collection,
                    record = %id,
                    event = ?kind,
                    error = %error,
                    "record hook failed"
                );
            })
            .collect()
    }
}

impl RecordStore for MemoryRecordStore {
    fn collection(&self, name: &str) -> Result<Arc<CollectionDescriptor>> {
        Ok(table(&self.collections.read(), name)?.descriptor.clone())
    }

    fn row_id(&self, collection: &str, id: &RecordId) -> Result<RowId> {
        let collections = self.collections.read();
        let (row_id, _) = table(&collections, collection)?.lookup(id)?;
        Ok(row_id)
    }

    fn record_ids_for_rows(&self, collection: &str, rows: &[RowId]) -> Result<Vec<(RecordId, RowId)>> {
        let collections = self.collections.read();
        let table = table(&collections, collection)?;
        Ok(rows
            .iter()
            .filter_map(|row_id| table.rows.get(row_id).map(|row| (row.id.clone(), *row_id)))
            .collect())
    }

    fn list(&self, collection: &str, query: &ListQuery) -> Result<Vec<Record>> {
        let collections = self.collections.read();
        let table = table(&collections, collection)?;
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(table
            .rows
            .values()
            .map(|row| table.materialize(row))
            .filter(|record| query.admits(record))
            .take(limit)
            .collect())
    }
}

fn table<'a>(collections: &'a HashMap<String, CollectionTable>, name: &str) -> Result<&'a CollectionTable> {
    collections
        .get(name)
        .ok_or_else(|| Error::CollectionNotFound(name.to_string()))
}

fn table_mut<'a>(
    collections: &'a mut HashMap<String, CollectionTable>,
    name: &str,
) -> Result<&'a mut CollectionTable> {
    collections
        .get_mut(name)
        .ok_or_else(|| Error::CollectionNotFound(name.to_string()))
}

fn validate_data(descriptor: &CollectionDescriptor, data: &Map<String, Value>) -> Result<()> {
    for (name, value) in data {
        let spec = descriptor.field(name).ok_or_else(|| {
            Error::Validation(format!("unknown field {} in {}", name, descriptor.name()))
        })?;
        if value.is_null() {
            continue;
        }
        let valid = match spec.kind {
            FieldKind::Text => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::Json => true,
            FieldKind::Vector => {
                Vector::from_json(name, value)?;
                true
            }
        };
        if !valid {
            return Err(Error::Validation(format!(
                "invalid value for field {} ({:?})",
                name, spec.kind
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;
    use serde_json::json;
    use shadowvec_core::{AccessContext, AccessRule, FieldSpec, FilterCondition};
    use std::sync::Mutex;

    fn data(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn store() -> MemoryRecordStore {
        let store = MemoryRecordStore::new(Arc::new(EventBus::new()));
        store
            .create_collection(
                CollectionDescriptor::builder("docs")
                    .field(FieldSpec::new("title", FieldKind::Text))
                    .vector_field("embedding")
                    .dimensionality(2)
                    .list_rule(AccessRule::Public)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_crud_assigns_row_ids() {
        let store = store();
        let a = store.create("docs", None, data(json!({"title": "a"}))).await.unwrap();
        let b = store
            .create("docs", Some(RecordId::new("b")), data(json!({"title": "b"})))
            .await
            .unwrap();
        assert!(a.hook_errors.is_empty());
        assert_eq!(store.row_id("docs", a.record.id()).unwrap(), RowId(1));
        assert_eq!(store.row_id("docs", b.record.id()).unwrap(), RowId(2));

        let updated = store
            .update("docs", b.record.id(), data(json!({"title": "bb"})))
            .await
            .unwrap();
        assert_eq!(updated.record.get("title"), Some(json!("bb")));

        store.delete("docs", a.record.id()).await.unwrap();
        assert!(matches!(store.row_id("docs", a.record.id()), Err(Error::NotFound(_))));
        assert_eq!(store.count("docs").unwrap(), 1);

        let ids = store
            .record_ids_for_rows("docs", &[RowId(1), RowId(2), RowId(3)])
            .unwrap();
        assert_eq!(ids, vec![(RecordId::new("b"), RowId(2))]);
    }

    #[tokio::test]
    async fn test_rejects_invalid_data() {
        let store = store();
        let unknown = store.create("docs", None, data(json!({"nope": 1}))).await;
        assert!(matches!(unknown, Err(Error::Validation(_))));
        let wrong = store.create("docs", None, data(json!({"title": 3}))).await;
        assert!(matches!(wrong, Err(Error::Validation(_))));
        let vector = store.create("docs", None, data(json!({"embedding": "x"}))).await;
        assert!(matches!(vector, Err(Error::Validation(_))));
        let missing = store.create("nope", None, Map::new()).await;
        assert!(matches!(missing, Err(Error::CollectionNotFound(_))));
    }

    #[test]
    fn test_reserved_prefix_and_duplicates() {
        let store = store();
        let shadow = CollectionDescriptor::builder("vss_docs").build().unwrap();
        assert!(matches!(store.create_collection(shadow), Err(Error::Schema(_))));
        let dup = CollectionDescriptor::builder("docs").build().unwrap();
        assert!(matches!(store.create_collection(dup), Err(Error::CollectionExists(_))));
    }

    #[tokio::test]
    async fn test_list_applies_query() {
        let store = store();
        for title in ["a", "b", "c"] {
            store.create("docs", Some(RecordId::new(title)), data(json!({"title": title}))).await.unwrap();
        }
        let query = ListQuery::new(AccessContext::guest()).with_filter(FilterCondition::id_in(["a", "c"]));
        let ids: Vec<String> = store
            .list("docs", &query)
            .unwrap()
            .iter()
            .map(|r| r.id().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "c"]);

        let limited = store.list("docs", &ListQuery::new(AccessContext::guest()).with_limit(1)).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_event_order() {
        let bus = Arc::new(EventBus::new());
        let store = Arc::new(MemoryRecordStore::new(bus.clone()));
        store
            .create_collection(CollectionDescriptor::builder("docs").build().unwrap())
            .unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        for kind in [EventKind::AfterCreate, EventKind::AfterUpdate, EventKind::BeforeDelete] {
            let seen = seen.clone();
            let store = store.clone();
            bus.subscribe(kind, move |event| {
                // The record must still exist for BeforeDelete and already exist otherwise.
                let exists = store.row_id("docs", event.record.id()).is_ok();
                seen.lock().unwrap().push((event.kind, exists));
                async { Err(Error::Storage("hook".into())) }.boxed()
            });
        }

        let created = store.create("docs", None, Map::new()).await.unwrap();
        assert_eq!(created.hook_errors.len(), 1);
        let id = created.record.id().clone();
        store.update("docs", &id, Map::new()).await.unwrap();
        let deleted = store.delete("docs", &id).await.unwrap();
        assert_eq!(deleted.hook_errors.len(), 1);
        assert!(store.get("docs", &id).is_err());

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (EventKind::AfterCreate, true),
                (EventKind::AfterUpdate, true),
                (EventKind::BeforeDelete, true),
            ]
        );
    }
}
