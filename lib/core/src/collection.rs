use crate::{Error, FilterCondition, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Shadow index tables are named `vss_<collection>`; the prefix is reserved.
pub const SHADOW_TABLE_PREFIX: &str = "vss_";

/// Canonical shadow table name for a collection.
#[inline]
pub fn shadow_table_name(collection: &str) -> String {
    format!("{}{}", SHADOW_TABLE_PREFIX, collection)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    Bool,
    Json,
    Vector,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    /// Hidden fields are only exported to administrators.
    #[serde(default)]
    pub hidden: bool,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            hidden: false,
        }
    }

    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionOptions {
    /// Vector dimensionality shared by every vector field. Absent means the
    /// collection is not vector-enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensionality: Option<u32>,
}

/// Who may list records of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "filter", rename_all = "snake_case")]
pub enum AccessRule {
    /// Administrators only.
    Locked,
    /// Everyone.
    Public,
    /// Records matching the condition.
    Filter(FilterCondition),
}

impl Default for AccessRule {
    fn default() -> Self {
        AccessRule::Locked
    }
}

/// Typed vector configuration of a collection, resolved once when the
/// descriptor is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorCollectionConfig {
    pub dimensionality: u32,
    pub fields: Vec<String>,
}

impl VectorCollectionConfig {
    #[inline]
    pub fn dim(&self) -> usize {
        self.dimensionality as usize
    }

    #[inline]
    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }
}

/// Schema of a primary-store collection as seen by the shadow index core.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionDescriptor {
    name: String,
    fields: Vec<FieldSpec>,
    options: CollectionOptions,
    list_rule: AccessRule,
    vector: Option<VectorCollectionConfig>,
}

impl CollectionDescriptor {
    pub fn builder(name: impl Into<String>) -> CollectionBuilder {
        CollectionBuilder {
            name: name.into(),
            fields: Vec::new(),
            options: CollectionOptions::default(),
            list_rule: AccessRule::default(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    #[inline]
    pub fn options(&self) -> &CollectionOptions {
        &self.options
    }

    #[inline]
    pub fn list_rule(&self) -> &AccessRule {
        &self.list_rule
    }

    /// `None` when the collection declares no dimensionality.
    #[inline]
    pub fn vector_config(&self) -> Option<&VectorCollectionConfig> {
        self.vector.as_ref()
    }

    #[inline]
    pub fn is_vector_enabled(&self) -> bool {
        self.vector.is_some()
    }

    #[inline]
    pub fn shadow_table_name(&self) -> String {
        shadow_table_name(&self.name)
    }

    pub fn to_definition(&self) -> CollectionDefinition {
        CollectionDefinition {
            name: self.name.clone(),
            fields: self.fields.clone(),
            options: self.options.clone(),
            list_rule: self.list_rule.clone(),
        }
    }
}

pub struct CollectionBuilder {
    name: String,
    fields: Vec<FieldSpec>,
    options: CollectionOptions,
    list_rule: AccessRule,
}

impl CollectionBuilder {
    #[must_use]
    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn vector_field(self, name: impl Into<String>) -> Self {
        self.field(FieldSpec::new(name, FieldKind::Vector))
    }

    #[must_use]
    pub fn dimensionality(mut self, dim: u32) -> Self {
        self.options.dimensionality = Some(dim);
        self
    }

    #[must_use]
    pub fn options(mut self, options: CollectionOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn list_rule(mut self, rule: AccessRule) -> Self {
        self.list_rule = rule;
        self
    }

    pub fn build(self) -> Result<CollectionDescriptor> {
        if self.name.is_empty()
            || !self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(Error::Schema(format!(
                "invalid collection name {:?}",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.is_empty() || field.name == "id" {
                return Err(Error::Schema(format!(
                    "invalid field name {:?} in collection {}",
                    field.name, self.name
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(Error::Schema(format!(
                    "duplicate field {} in collection {}",
                    field.name, self.name
                )));
            }
        }

        let vector = match self.options.dimensionality {
            None => None,
            Some(0) => {
                return Err(Error::Schema(format!(
                    "collection {} declares a vector dimensionality of 0",
                    self.name
                )))
            }
            Some(dimensionality) => Some(VectorCollectionConfig {
                dimensionality,
                fields: self
                    .fields
                    .iter()
                    .filter(|f| f.kind == FieldKind::Vector)
                    .map(|f| f.name.clone())
                    .collect(),
            }),
        };

        Ok(CollectionDescriptor {
            name: self.name,
            fields: self.fields,
            options: self.options,
            list_rule: self.list_rule,
            vector,
        })
    }
}

/// Serializable form of a collection, as accepted by the administration surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionDefinition {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    #[serde(default)]
    pub options: CollectionOptions,
    #[serde(default)]
    pub list_rule: AccessRule,
}

impl CollectionDefinition {
    pub fn into_descriptor(self) -> Result<CollectionDescriptor> {
        let mut builder = CollectionDescriptor::builder(self.name)
            .options(self.options)
            .list_rule(self.list_rule);
        for field in self.fields {
            builder = builder.field(field);
        }
        builder.build()
    }
}
