// Record filters shared by collection read rules and listing queries
use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::{AccessContext, AccessRule, Record};

/// Rule values equal to this string resolve to the caller's auth record id.
pub const AUTH_ID_PLACEHOLDER: &str = "@request.auth.id";

pub trait Filter {
    fn matches(&self, record: &Record, access: &AccessContext) -> bool;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FilterCondition {
    Equals { field: String, value: Value },
    NotEquals { field: String, value: Value },
    GreaterThan { field: String, value: f64 },
    LessThan { field: String, value: f64 },
    GreaterEqual { field: String, value: f64 },
    LessEqual { field: String, value: f64 },
    Contains { field: String, value: String },
    In { field: String, values: Vec<Value> },
    /// Any authenticated caller.
    Authenticated,
    And { all: Vec<FilterCondition> },
    Or { any: Vec<FilterCondition> },
    Not { condition: Box<FilterCondition> },
}

impl FilterCondition {
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        FilterCondition::Equals {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Record id membership.
    pub fn id_in<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FilterCondition::In {
            field: "id".to_string(),
            values: ids.into_iter().map(|s| Value::String(s.into())).collect(),
        }
    }

    /// Conjunction, flattening nested `And`s.
    #[must_use]
    pub fn and(self, other: FilterCondition) -> Self {
        match (self, other) {
            (FilterCondition::And { mut all }, FilterCondition::And { all: rest }) => {
                all.extend(rest);
                FilterCondition::And { all }
            }
            (FilterCondition::And { mut all }, other) => {
                all.push(other);
                FilterCondition::And { all }
            }
            (this, other) => FilterCondition::And {
                all: vec![this, other],
            },
        }
    }

    fn resolve(value: &Value, access: &AccessContext) -> Option<Value> {
        match value {
            Value::String(s) if s == AUTH_ID_PLACEHOLDER => {
                access.auth_id.as_ref().map(|id| Value::String(id.clone()))
            }
            other => Some(other.clone()),
        }
    }

    fn numeric(record: &Record, field: &str) -> Option<f64> {
        record.get(field).and_then(|v| v.as_f64())
    }

    fn matches_condition(condition: &FilterCondition, record: &Record, access: &AccessContext) -> bool {
        match condition {
            FilterCondition::Equals { field, value } => {
                match (record.get(field), Self::resolve(value, access)) {
                    (Some(actual), Some(expected)) => actual == expected,
                    _ => false,
                }
            }
            FilterCondition::NotEquals { field, value } => {
                match (record.get(field), Self::resolve(value, access)) {
                    (Some(actual), Some(expected)) => actual != expected,
                    _ => true,
                }
            }
            FilterCondition::GreaterThan { field, value } => {
                Self::numeric(record, field).map(|v| v > *value).unwrap_or(false)
            }
            FilterCondition::LessThan { field, value } => {
                Self::numeric(record, field).map(|v| v < *value).unwrap_or(false)
            }
            FilterCondition::GreaterEqual { field, value } => {
                Self::numeric(record, field).map(|v| v >= *value).unwrap_or(false)
            }
            FilterCondition::LessEqual { field, value } => {
                Self::numeric(record, field).map(|v| v <= *value).unwrap_or(false)
            }
            FilterCondition::Contains { field, value } => record
                .get(field)
                .and_then(|v| v.as_str().map(|s| s.contains(value.as_str())))
                .unwrap_or(false),
            FilterCondition::In { field, values } => match record.get(field) {
                Some(actual) => values
                    .iter()
                    .filter_map(|v| Self::resolve(v, access))
                    .any(|v| v == actual),
                None => false,
            },
            FilterCondition::Authenticated => access.is_authenticated(),
            FilterCondition::And { all } => {
                all.iter().all(|c| Self::matches_condition(c, record, access))
            }
            FilterCondition::Or { any } => {
                any.iter().any(|c| Self::matches_condition(c, record, access))
            }
            FilterCondition::Not { condition } => {
                !Self::matches_condition(condition, record, access)
            }
        }
    }
}

impl Filter for FilterCondition {
    fn matches(&self, record: &Record, access: &AccessContext) -> bool {
        Self::matches_condition(self, record, access)
    }
}

impl Filter for AccessRule {
    fn matches(&self, record: &Record, access: &AccessContext) -> bool {
        if access.is_admin() {
            return true;
        }
        match self {
            AccessRule::Locked => false,
            AccessRule::Public => true,
            AccessRule::Filter(condition) => condition.matches(record, access),
        }
    }
}

/// A listing request against a primary-store collection.
///
/// Every listing path (ordinary record listing and nearest-neighbor
/// resolution alike) goes through [`ListQuery::admits`], so the collection's
/// read rule is applied the same way everywhere.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub access: AccessContext,
    pub filter: Option<FilterCondition>,
    pub limit: Option<usize>,
}

impl ListQuery {
    #[must_use]
    pub fn new(access: AccessContext) -> Self {
        Self {
            access,
            filter: None,
            limit: None,
        }
    }

    /// Conjoin another condition with the current filter.
    #[must_use]
    pub fn with_filter(mut self, condition: FilterCondition) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Read rule (skipped for administrators) and the query filter.
    pub fn admits(&self, record: &Record) -> bool {
        record.collection().list_rule().matches(record, &self.access)
            && self
                .filter
                .as_ref()
                .map(|f| f.matches(record, &self.access))
                .unwrap_or(true)
    }
}
