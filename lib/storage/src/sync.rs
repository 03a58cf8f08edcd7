// Keeps shadow tables in step with primary-store mutations.
use crate::primary::RecordStore;
use crate::rowid::RowIdentityMapper;
use crate::schema::SchemaManager;
use crate::shadow::{ShadowIndex, ShadowRow};
use futures_util::FutureExt;
use shadowvec_core::{Deadline, Error, EventBus, EventKind, Record, Result, SubscriptionId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

pub struct MutationSynchronizer {
    schema: SchemaManager,
    index: ShadowIndex,
    mapper: RowIdentityMapper,
    op_timeout: Duration,
}

impl MutationSynchronizer {
    pub fn new(store: Arc<dyn RecordStore>, index: ShadowIndex, op_timeout: Duration) -> Self {
        Self {
            schema: SchemaManager::new(index.clone()),
            index,
            mapper: RowIdentityMapper::new(store),
            op_timeout,
        }
    }

    fn deadline(&self) -> Deadline {
        Deadline::after(self.op_timeout)
    }

    /// Present vector values of a record. Unset fields are left out.
    fn shadow_row(record: &Record) -> Result<ShadowRow> {
        let mut row = ShadowRow::new();
        if let Some(config) = record.collection().vector_config() {
            for field in &config.fields {
                if let Some(vector) = record.vector(field)? {
                    row.insert(field.as_str(), vector);
                }
            }
        }
        Ok(row)
    }

    /// Runs after the primary create has committed.
    pub async fn on_create(&self, record: &Record) -> Result<()> {
        let descriptor = record.collection();
        if !descriptor.is_vector_enabled() {
            return Ok(());
        }
        let deadline = self.deadline();

        let schema = self.schema.ensure_table(descriptor, deadline).await?;
        let row_id = self.mapper.row_id_for(descriptor.name(), record.id())?;
        let row = Self::shadow_row(record)?;
        if row.is_empty() {
            debug!(collection = %descriptor.name(), record = %record.id(), "no vector values to index");
            return Ok(());
        }
        self.index.insert(&schema, row_id, row, deadline).await
    }

    /// Runs after the primary update has committed. The shadow row ends up
    /// holding exactly the record's current vector values.
    pub async fn on_update(&self, record: &Record) -> Result<()> {
        let descriptor = record.collection();
        if !descriptor.is_vector_enabled() {
            return Ok(());
        }
        let deadline = self.deadline();

        let Some(schema) = self.index.table_schema(descriptor.name(), deadline).await? else {
            return self.on_create(record).await;
        };
        let row_id = self.mapper.row_id_for(descriptor.name(), record.id())?;
        let row = Self::shadow_row(record)?;
        self.index.upsert(&schema, row_id, row, deadline).await
    }

    /// Runs before the primary delete commits, while the row id still resolves.
    pub async fn on_delete(&self, record: &Record) -> Result<()> {
        let descriptor = record.collection();
        if !descriptor.is_vector_enabled() {
            return Ok(());
        }
        let deadline = self.deadline();

        if !self.schema.table_exists(descriptor.name(), deadline).await? {
            return Ok(());
        }
        let row_id = self.mapper.row_id_for(descriptor.name(), record.id())?;
        self.index.delete(descriptor.name(), row_id, deadline).await?;
        Ok(())
    }

    /// Apply one lifecycle event. A record that vanished between the primary
    /// commit and the lookup is skipped; other failures are reported.
    pub async fn handle(&self, kind: EventKind, record: &Record) -> Result<()> {
        let result = match kind {
            EventKind::AfterCreate => self.on_create(record).await,
            EventKind::AfterUpdate => self.on_update(record).await,
            EventKind::BeforeDelete => self.on_delete(record).await,
        };

        match result {
            Err(Error::NotFound(what)) => {
                warn!(
                    collection = %record.collection().name(),
                    record = %record.id(),
                    event = ?kind,
                    missing = %what,
                    "skipping shadow sync for vanished record"
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    collection = %record.collection().name(),
                    record = %record.id(),
                    event = ?kind,
                    error = %e,
                    "shadow sync failed"
                );
                Err(e)
            }
            Ok(()) => Ok(()),
        }
    }

    /// Subscribe the create, update and delete handlers.
    pub fn register(self: Arc<Self>, bus: &EventBus) -> Vec<SubscriptionId> {
        [EventKind::AfterCreate, EventKind::AfterUpdate, EventKind::BeforeDelete]
            .into_iter()
            .map(|kind| {
                let sync = self.clone();
                bus.subscribe(kind, move |event| {
                    let sync = sync.clone();
                    async move { sync.handle(event.kind, &event.record).await }.boxed()
                })
            })
            .collect()
    }
}
