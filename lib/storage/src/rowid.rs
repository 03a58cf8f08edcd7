use crate::primary::RecordStore;
use shadowvec_core::{RecordId, Result, RowId};
use std::collections::HashMap;
use std::sync::Arc;

/// Translates between external record ids and primary-store row ids.
///
/// Row ids are re-read on every call, never cached: the primary store may
/// renumber rows between operations.
#[derive(Clone)]
pub struct RowIdentityMapper {
    store: Arc<dyn RecordStore>,
}

impl RowIdentityMapper {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub fn row_id_for(&self, collection: &str, id: &RecordId) -> Result<RowId> {
        self.store.row_id(collection, id)
    }

    /// Batched reverse lookup. Rows without a record are absent from the map.
    pub fn record_ids_for(&self, collection: &str, rows: &[RowId]) -> Result<HashMap<RowId, RecordId>> {
        if rows.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(self
            .store
            .record_ids_for_rows(collection, rows)?
            .into_iter()
            .map(|(id, row)| (row, id))
            .collect())
    }
}
