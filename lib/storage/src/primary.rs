// Boundary to the primary record store that owns collections and records.
use shadowvec_core::{CollectionDescriptor, ListQuery, Record, RecordId, Result, RowId};
use std::sync::Arc;

/// Read access the shadow index needs from the primary store.
///
/// Calls are synchronous and expected to be cheap; implementations backed by
/// a remote engine should keep their own connection handling behind this trait.
pub trait RecordStore: Send + Sync {
    /// Descriptor of a collection, `CollectionNotFound` if it does not exist.
    fn collection(&self, name: &str) -> Result<Arc<CollectionDescriptor>>;

    /// Current row id of a record, `NotFound` if the record does not exist.
    fn row_id(&self, collection: &str, id: &RecordId) -> Result<RowId>;

    /// External ids of the given rows in one round trip. Rows that no longer
    /// exist are left out.
    fn record_ids_for_rows(&self, collection: &str, rows: &[RowId]) -> Result<Vec<(RecordId, RowId)>>;

    /// Records admitted by `query` (read rule and filter), in row order.
    fn list(&self, collection: &str, query: &ListQuery) -> Result<Vec<Record>>;
}
