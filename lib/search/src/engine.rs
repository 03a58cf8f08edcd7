use crate::assembler::{assemble, SearchResultSet};
use crate::criteria::SearchCriteria;
use ahash::AHashMap;
use shadowvec_core::{
    AccessContext, Deadline, Error, FilterCondition, ListQuery, RecordId, Result, RowId, Vector,
};
use shadowvec_storage::{RecordStore, RowIdentityMapper, ShadowIndex};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Hard ceiling on the number of results a single search may return.
pub const MAX_SEARCH_RESULTS: usize = 100;

#[derive(Debug, Clone)]
pub struct QueryEngineConfig {
    /// Requested limits are clamped to this value.
    pub max_results: usize,
    /// Deadline applied when a request carries none.
    pub timeout: Duration,
}

impl Default for QueryEngineConfig {
    fn default() -> Self {
        Self {
            max_results: MAX_SEARCH_RESULTS,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub collection: String,
    pub field: String,
    pub vector: Vector,
    pub access: AccessContext,
    pub limit: Option<usize>,
    pub deadline: Option<Deadline>,
}

impl SearchRequest {
    pub fn new(collection: impl Into<String>, criteria: SearchCriteria, access: AccessContext) -> Self {
        Self {
            collection: collection.into(),
            field: criteria.field,
            vector: criteria.vector,
            access,
            limit: None,
            deadline: None,
        }
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Runs nearest-neighbor searches against shadow tables and resolves the
/// hits into primary records the caller is allowed to read.
pub struct QueryEngine {
    store: Arc<dyn RecordStore>,
    index: ShadowIndex,
    mapper: RowIdentityMapper,
    config: QueryEngineConfig,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn RecordStore>, index: ShadowIndex, config: QueryEngineConfig) -> Self {
        Self {
            mapper: RowIdentityMapper::new(store.clone()),
            store,
            index,
            config,
        }
    }

    #[inline]
    pub fn config(&self) -> &QueryEngineConfig {
        &self.config
    }

    pub fn clamp_limit(&self, limit: Option<usize>) -> usize {
        limit
            .unwrap_or(self.config.max_results)
            .min(self.config.max_results)
    }

    /// Ranked by ascending distance. `total_items` counts index candidates
    /// before access filtering, so `items` may be shorter than the limit.
    pub async fn search(&self, request: SearchRequest) -> Result<SearchResultSet> {
        let started = Instant::now();
        let SearchRequest {
            collection,
            field,
            vector,
            access,
            limit,
            deadline,
        } = request;

        let descriptor = self.store.collection(&collection)?;
        let config = descriptor.vector_config().ok_or_else(|| {
            Error::Schema(format!("collection {} is not vector-enabled", collection))
        })?;
        if !config.has_field(&field) {
            return Err(Error::Validation(format!(
                "{} is not a vector field of {}",
                field, collection
            )));
        }
        vector.check_dimension(config.dim())?;
        vector.check_finite(&field)?;

        let limit = self.clamp_limit(limit);
        let deadline = deadline.unwrap_or_else(|| Deadline::after(self.config.timeout));

        let candidates = self
            .index
            .knn(&collection, &field, vector, limit, deadline)
            .await?;
        if candidates.is_empty() {
            return Ok(SearchResultSet::empty());
        }

        let rows: Vec<RowId> = candidates.iter().map(|(row_id, _)| *row_id).collect();
        let ids = self.mapper.record_ids_for(&collection, &rows)?;

        let resolved = if ids.is_empty() {
            Vec::new()
        } else {
            let query = ListQuery::new(access.clone())
                .with_filter(FilterCondition::id_in(ids.values().map(RecordId::to_string)));
            let records = self.store.list(&collection, &query)?;
            deadline.check()?;

            let rows_by_id: AHashMap<&RecordId, RowId> =
                ids.iter().map(|(row_id, id)| (id, *row_id)).collect();
            records
                .into_iter()
                .filter_map(|record| rows_by_id.get(record.id()).map(|row_id| (*row_id, record)))
                .collect()
        };

        let set = assemble(&candidates, resolved, &access);
        debug!(
            collection = %collection,
            field = %field,
            limit,
            candidates = set.total_items,
            items = set.items.len(),
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "vector search"
        );
        Ok(set)
    }
}
