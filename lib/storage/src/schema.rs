use crate::shadow::{ShadowIndex, ShadowTableSchema};
use shadowvec_core::{CollectionDescriptor, Deadline, Error, Result};
use tracing::error;

/// Derives and lazily creates the shadow table of a collection.
#[derive(Clone)]
pub struct SchemaManager {
    index: ShadowIndex,
}

impl SchemaManager {
    pub fn new(index: ShadowIndex) -> Self {
        Self { index }
    }

    /// Schema a collection's shadow table should have.
    pub fn derive(descriptor: &CollectionDescriptor) -> Result<ShadowTableSchema> {
        let config = descriptor.vector_config().ok_or_else(|| {
            Error::Schema(format!(
                "collection {} does not declare a dimensionality",
                descriptor.name()
            ))
        })?;
        if config.fields.is_empty() {
            return Err(Error::Schema(format!(
                "collection {} declares a dimensionality but no vector fields",
                descriptor.name()
            )));
        }
        Ok(ShadowTableSchema::from_config(descriptor.name(), config))
    }

    pub async fn table_exists(&self, collection: &str, deadline: Deadline) -> Result<bool> {
        Ok(self.index.table_schema(collection, deadline).await?.is_some())
    }

    /// Make sure the shadow table exists and return its schema on record.
    /// A stored schema that disagrees with the collection declaration is a
    /// [`Error::Schema`] failure.
    ///
    /// The existence check runs on the shared path; creation goes through the
    /// exclusive path with create-if-absent, so concurrent first writers all
    /// succeed against the same table.
    pub async fn ensure_table(
        &self,
        descriptor: &CollectionDescriptor,
        deadline: Deadline,
    ) -> Result<ShadowTableSchema> {
        let wanted = Self::derive(descriptor)?;

        let current = match self.index.table_schema(descriptor.name(), deadline).await? {
            Some(existing) => existing,
            None => self.index.create_table(wanted.clone(), deadline).await?,
        };

        if current.dimensionality != wanted.dimensionality || current.columns != wanted.columns {
            error!(
                table = %current.table,
                stored_dimensionality = current.dimensionality,
                declared_dimensionality = wanted.dimensionality,
                stored_columns = ?current.columns,
                declared_columns = ?wanted.columns,
                "shadow table schema differs from the collection declaration"
            );
            return Err(Error::Schema(format!(
                "shadow table {} holds {} columns of dimensionality {}, collection declares {} of dimensionality {}",
                current.table,
                current.columns.len(),
                current.dimensionality,
                wanted.columns.len(),
                wanted.dimensionality
            )));
        }
        Ok(current)
    }
}
