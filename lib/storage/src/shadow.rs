// Shadow index tables: one LMDB database per vector-enabled collection,
// keyed by the primary store's row id.
use crate::pool::{ShadowPool, TableDb};
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use shadowvec_core::simd::l2_distance_simd;
use shadowvec_core::{shadow_table_name, Deadline, Error, Result, RowId, Vector, VectorCollectionConfig};
use std::collections::{BTreeMap, BinaryHeap};
use std::sync::Arc;
use tracing::info;

/// Row count above which KNN scoring is spread over the rayon pool.
const PARALLEL_SCAN_THRESHOLD: usize = 4096;

/// Rows decoded and scored between two deadline checks.
const SCAN_CHUNK: usize = 16 * 1024;

/// Catalog entry of a shadow table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowTableSchema {
    pub table: String,
    pub collection: String,
    pub dimensionality: u32,
    /// One vector column per declared vector field, in declaration order.
    pub columns: Vec<String>,
}

impl ShadowTableSchema {
    pub fn from_config(collection: &str, config: &VectorCollectionConfig) -> Self {
        Self {
            table: shadow_table_name(collection),
            collection: collection.to_string(),
            dimensionality: config.dimensionality,
            columns: config.fields.clone(),
        }
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dimensionality as usize
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// Vector values of one shadow row. Columns without a value are absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShadowRow {
    columns: BTreeMap<String, Vec<f32>>,
}

impl ShadowRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, vector: Vector) {
        self.columns.insert(column.into(), vector.into_inner());
    }

    #[must_use]
    pub fn with(mut self, column: impl Into<String>, vector: Vector) -> Self {
        self.insert(column, vector);
        self
    }

    pub fn get(&self, column: &str) -> Option<&[f32]> {
        self.columns.get(column).map(|v| v.as_slice())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|k| k.as_str())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Every value must belong to a declared column and match the table's
    /// dimensionality.
    pub fn validate(&self, schema: &ShadowTableSchema) -> Result<()> {
        for (column, values) in &self.columns {
            if !schema.has_column(column) {
                return Err(Error::Validation(format!(
                    "{} has no vector column {}",
                    schema.table, column
                )));
            }
            if values.len() != schema.dim() {
                return Err(Error::InvalidDimension {
                    expected: schema.dim(),
                    actual: values.len(),
                });
            }
        }
        Ok(())
    }

    fn encode(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Serialization(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowTableStats {
    pub schema: ShadowTableSchema,
    pub rows: u64,
}

fn storage(e: heed::Error) -> Error {
    Error::Storage(e.to_string())
}

/// Typed operations over the shadow tables. Cheap to clone.
#[derive(Clone)]
pub struct ShadowIndex {
    pool: Arc<ShadowPool>,
}

impl ShadowIndex {
    pub fn new(pool: Arc<ShadowPool>) -> Self {
        Self { pool }
    }

    #[inline]
    pub fn pool(&self) -> &Arc<ShadowPool> {
        &self.pool
    }

    /// Catalog entry of a collection's shadow table, if it exists.
    pub async fn table_schema(
        &self,
        collection: &str,
        deadline: Deadline,
    ) -> Result<Option<ShadowTableSchema>> {
        let table = shadow_table_name(collection);
        self.pool
            .read("table_schema", deadline, move |conn| {
                let rtxn = conn.env().read_txn().map_err(storage)?;
                match conn.catalog().get(&rtxn, &table).map_err(storage)? {
                    Some(bytes) => ShadowTableSchema::decode(bytes).map(Some),
                    None => Ok(None),
                }
            })
            .await
    }

    /// Create the table unless it already exists. Returns the schema on
    /// record, which is the existing one if another writer got there first.
    pub async fn create_table(
        &self,
        schema: ShadowTableSchema,
        deadline: Deadline,
    ) -> Result<ShadowTableSchema> {
        self.pool
            .write("create_table", deadline, move |conn| {
                let mut wtxn = conn.env().write_txn().map_err(storage)?;

                let existing = match conn.catalog().get(&wtxn, &schema.table).map_err(storage)? {
                    Some(bytes) => Some(ShadowTableSchema::decode(bytes)?),
                    None => None,
                };
                if let Some(existing) = existing {
                    return Ok(existing);
                }

                let db: TableDb = conn
                    .env()
                    .create_database(&mut wtxn, Some(&schema.table))
                    .map_err(storage)?;
                conn.catalog()
                    .put(&mut wtxn, &schema.table, &schema.encode()?)
                    .map_err(storage)?;
                conn.commit(wtxn)?;
                conn.register_table(&schema.table, db);

                info!(
                    table = %schema.table,
                    columns = ?schema.columns,
                    dimensionality = schema.dimensionality,
                    "created shadow table"
                );
                Ok(schema)
            })
            .await
    }

    /// Insert a new row. Fails if the row id is already present.
    pub async fn insert(
        &self,
        schema: &ShadowTableSchema,
        row_id: RowId,
        row: ShadowRow,
        deadline: Deadline,
    ) -> Result<()> {
        row.validate(schema)?;
        let table = schema.table.clone();
        self.pool
            .write("insert", deadline, move |conn| {
                let db = conn
                    .table(&table)
                    .ok_or_else(|| Error::NotFound(format!("shadow table {}", table)))?;
                let mut wtxn = conn.env().write_txn().map_err(storage)?;
                if db.get(&wtxn, &row_id.0).map_err(storage)?.is_some() {
                    return Err(Error::Storage(format!(
                        "row {} already exists in {}",
                        row_id, table
                    )));
                }
                db.put(&mut wtxn, &row_id.0, &row.encode()?).map_err(storage)?;
                conn.commit(wtxn)
            })
            .await
    }

    /// Replace a row's vector columns with `row`, creating the row if it is
    /// missing. An empty `row` removes the row.
    pub async fn upsert(
        &self,
        schema: &ShadowTableSchema,
        row_id: RowId,
        row: ShadowRow,
        deadline: Deadline,
    ) -> Result<()> {
        row.validate(schema)?;
        let table = schema.table.clone();
        self.pool
            .write("upsert", deadline, move |conn| {
                let db = conn
                    .table(&table)
                    .ok_or_else(|| Error::NotFound(format!("shadow table {}", table)))?;
                let mut wtxn = conn.env().write_txn().map_err(storage)?;
                if row.is_empty() {
                    db.delete(&mut wtxn, &row_id.0).map_err(storage)?;
                } else {
                    db.put(&mut wtxn, &row_id.0, &row.encode()?).map_err(storage)?;
                }
                conn.commit(wtxn)
            })
            .await
    }

    /// Remove a row. Returns whether it existed.
    pub async fn delete(&self, collection: &str, row_id: RowId, deadline: Deadline) -> Result<bool> {
        let table = shadow_table_name(collection);
        self.pool
            .write("delete", deadline, move |conn| {
                let Some(db) = conn.table(&table) else {
                    return Ok(false);
                };
                let mut wtxn = conn.env().write_txn().map_err(storage)?;
                let existed = db.delete(&mut wtxn, &row_id.0).map_err(storage)?;
                conn.commit(wtxn)?;
                Ok(existed)
            })
            .await
    }

    pub async fn get(
        &self,
        collection: &str,
        row_id: RowId,
        deadline: Deadline,
    ) -> Result<Option<ShadowRow>> {
        let table = shadow_table_name(collection);
        self.pool
            .read("get", deadline, move |conn| {
                let Some(db) = conn.table(&table) else {
                    return Ok(None);
                };
                let rtxn = conn.env().read_txn().map_err(storage)?;
                match db.get(&rtxn, &row_id.0).map_err(storage)? {
                    Some(bytes) => ShadowRow::decode(bytes).map(Some),
                    None => Ok(None),
                }
            })
            .await
    }

    /// The `limit` rows whose `column` is nearest to `query` by L2 distance,
    /// ascending, ties broken by row id. Rows without a value in `column`
    /// are skipped.
    pub async fn knn(
        &self,
        collection: &str,
        column: &str,
        query: Vector,
        limit: usize,
        deadline: Deadline,
    ) -> Result<Vec<(RowId, f32)>> {
        let table = shadow_table_name(collection);
        let column = column.to_string();
        self.pool
            .read("knn", deadline, move |conn| {
                let rtxn = conn.env().read_txn().map_err(storage)?;
                let schema = match conn.catalog().get(&rtxn, &table).map_err(storage)? {
                    Some(bytes) => ShadowTableSchema::decode(bytes)?,
                    None => return Err(Error::NotFound(format!("shadow table {}", table))),
                };
                if !schema.has_column(&column) {
                    return Err(Error::Validation(format!(
                        "{} has no vector column {}",
                        table, column
                    )));
                }
                query.check_dimension(schema.dim())?;

                let db = conn
                    .table(&table)
                    .ok_or_else(|| Error::NotFound(format!("shadow table {}", table)))?;
                if limit == 0 {
                    return Ok(Vec::new());
                }

                let rows = db.iter(&rtxn).map_err(storage)?.map(|entry| entry.map_err(storage));
                scan_nearest(rows, &column, query.as_slice(), limit, deadline)
            })
            .await
    }

    /// Catalog schema and row count of a collection's shadow table.
    pub async fn describe(&self, collection: &str, deadline: Deadline) -> Result<Option<ShadowTableStats>> {
        let table = shadow_table_name(collection);
        self.pool
            .read("describe", deadline, move |conn| {
                let rtxn = conn.env().read_txn().map_err(storage)?;
                let schema = match conn.catalog().get(&rtxn, &table).map_err(storage)? {
                    Some(bytes) => ShadowTableSchema::decode(bytes)?,
                    None => return Ok(None),
                };
                let rows = match conn.table(&table) {
                    Some(db) => db.len(&rtxn).map_err(storage)?,
                    None => 0,
                };
                Ok(Some(ShadowTableStats { schema, rows }))
            })
            .await
    }
}

type Scored = (OrderedFloat<f32>, u64);

/// Bounded max-heap keeping the `limit` smallest (distance, row id) pairs.
struct TopK {
    limit: usize,
    heap: BinaryHeap<Scored>,
}

impl TopK {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            heap: BinaryHeap::new(),
        }
    }

    fn score(&mut self, rows: &[(u64, &[u8])], column: &str, query: &[f32]) -> Result<()> {
        let score = |(row_id, bytes): &(u64, &[u8])| -> Result<Option<Scored>> {
            let row = ShadowRow::decode(bytes)?;
            Ok(row
                .get(column)
                .map(|values| (OrderedFloat(l2_distance_simd(query, values)), *row_id)))
        };

        let scored: Vec<Option<Scored>> = if rows.len() >= PARALLEL_SCAN_THRESHOLD {
            rows.par_iter().map(score).collect::<Result<_>>()?
        } else {
            rows.iter().map(score).collect::<Result<_>>()?
        };

        for candidate in scored.into_iter().flatten() {
            self.heap.push(candidate);
            if self.heap.len() > self.limit {
                self.heap.pop();
            }
        }
        Ok(())
    }

    fn into_sorted(self) -> Vec<(RowId, f32)> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|(distance, row_id)| (RowId(row_id), distance.into_inner()))
            .collect()
    }
}

/// Stream rows chunk by chunk, checking `deadline` before each chunk is scored.
fn scan_nearest<'a, I>(
    rows: I,
    column: &str,
    query: &[f32],
    limit: usize,
    deadline: Deadline,
) -> Result<Vec<(RowId, f32)>>
where
    I: Iterator<Item = Result<(u64, &'a [u8])>>,
{
    let mut top = TopK::new(limit);
    let mut chunk = Vec::with_capacity(SCAN_CHUNK);
    for entry in rows {
        chunk.push(entry?);
        if chunk.len() == SCAN_CHUNK {
            deadline.check()?;
            top.score(&chunk, column, query)?;
            chunk.clear();
        }
    }
    deadline.check()?;
    top.score(&chunk, column, query)?;
    Ok(top.into_sorted())
}

#[cfg(test)]
fn nearest(rows: &[(u64, &[u8])], column: &str, query: &[f32], limit: usize) -> Result<Vec<(RowId, f32)>> {
    let mut top = TopK::new(limit);
    top.score(rows, column, query)?;
    Ok(top.into_sorted())
}
