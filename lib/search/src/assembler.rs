// Merges ranked shadow index candidates with the records that survived access
// filtering. Pure: no storage access.
use ahash::AHashMap;
use serde::Serialize;
use serde_json::Value;
use shadowvec_core::{AccessContext, Record, RowId};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResultItem {
    pub distance: f32,
    pub item: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultSet {
    /// Candidates returned by the index, before access filtering.
    pub total_items: usize,
    pub items: Vec<SearchResultItem>,
}

impl SearchResultSet {
    pub fn empty() -> Self {
        Self {
            total_items: 0,
            items: Vec::new(),
        }
    }
}

/// Emit resolved records in candidate order, each with its distance.
/// Candidates without a resolved record are dropped; `total_items` still
/// counts them.
pub fn assemble(
    candidates: &[(RowId, f32)],
    resolved: Vec<(RowId, Record)>,
    access: &AccessContext,
) -> SearchResultSet {
    let mut by_row: AHashMap<RowId, Record> = resolved.into_iter().collect();

    let items = candidates
        .iter()
        .filter_map(|(row_id, distance)| {
            by_row.remove(row_id).map(|record| SearchResultItem {
                distance: *distance,
                item: record.export(access),
            })
        })
        .collect();

    SearchResultSet {
        total_items: candidates.len(),
        items,
    }
}
