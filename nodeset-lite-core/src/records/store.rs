use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, RwLock};

use super::{
    AttributeRecord, CompositionRecord, ExistingKey, ModelRecord, RecordId, TypeDefinitionRecord,
};
use crate::error::{ModelError, Result};

pub type RecordPredicate<'a> = &'a (dyn Fn(&TypeDefinitionRecord) -> bool + Send + Sync);

/// Persistence port for the relational projection.
///
/// A batch runs between `begin` and `commit`; `rollback` discards every
/// write made since `begin`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_by_id(&self, id: RecordId) -> Result<Option<TypeDefinitionRecord>>;

    async fn get_existing(&self, key: &ExistingKey) -> Result<Option<TypeDefinitionRecord>>;

    /// Inserts the record, or overwrites the one with the same id (or the
    /// same namespace and wire id when no id is set). An existing record is
    /// only overwritten when `update_existing` is set. Returns the record id
    /// and whether a new record was created.
    async fn upsert(
        &self,
        record: TypeDefinitionRecord,
        update_existing: bool,
    ) -> Result<(RecordId, bool)>;

    async fn find(&self, predicate: RecordPredicate<'_>) -> Result<Vec<TypeDefinitionRecord>>;

    async fn upsert_composition(&self, record: CompositionRecord) -> Result<RecordId>;

    async fn upsert_attribute(&self, record: AttributeRecord) -> Result<RecordId>;

    /// Ordered by ordinal.
    async fn compositions_of(&self, owner: RecordId) -> Result<Vec<CompositionRecord>>;

    /// Ordered by ordinal.
    async fn attributes_of(&self, owner: RecordId) -> Result<Vec<AttributeRecord>>;

    /// Removes the compositions and attributes owned by `owner`.
    async fn clear_owned(&self, owner: RecordId) -> Result<()>;

    async fn save_model(&self, model: ModelRecord) -> Result<()>;

    async fn load_model(&self, namespace: &str) -> Result<Option<ModelRecord>>;

    async fn begin(&self) -> Result<()>;

    async fn commit(&self) -> Result<()>;

    async fn rollback(&self) -> Result<()>;
}

// ── MemoryRecordStore ──

#[derive(Debug, Clone, Default)]
struct Tables {
    next_id: RecordId,
    types: BTreeMap<RecordId, TypeDefinitionRecord>,
    compositions: BTreeMap<RecordId, CompositionRecord>,
    attributes: BTreeMap<RecordId, AttributeRecord>,
    models: BTreeMap<String, ModelRecord>,
}

impl Tables {
    fn allocate(&mut self) -> RecordId {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory RecordStore for tests and the CLI.
///
/// `begin` snapshots every table; `rollback` restores the snapshot. Only
/// one transaction may be open at a time.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    inner: RwLock<Tables>,
    snapshot: Mutex<Option<Tables>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn type_count(&self) -> usize {
        self.inner.read().map(|t| t.types.len()).unwrap_or(0)
    }

    pub fn composition_count(&self) -> usize {
        self.inner.read().map(|t| t.compositions.len()).unwrap_or(0)
    }

    pub fn attribute_count(&self) -> usize {
        self.inner.read().map(|t| t.attributes.len()).unwrap_or(0)
    }

    pub fn in_transaction(&self) -> bool {
        self.snapshot.lock().map(|s| s.is_some()).unwrap_or(false)
    }
}

fn lock_err(e: impl std::fmt::Display) -> ModelError {
    ModelError::Store(format!("Lock: {}", e))
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get_by_id(&self, id: RecordId) -> Result<Option<TypeDefinitionRecord>> {
        let tables = self.inner.read().map_err(lock_err)?;
        Ok(tables.types.get(&id).cloned())
    }

    async fn get_existing(&self, key: &ExistingKey) -> Result<Option<TypeDefinitionRecord>> {
        let tables = self.inner.read().map_err(lock_err)?;
        Ok(tables.types.values().find(|r| key.matches(r)).cloned())
    }

    async fn upsert(
        &self,
        mut record: TypeDefinitionRecord,
        update_existing: bool,
    ) -> Result<(RecordId, bool)> {
        let mut tables = self.inner.write().map_err(lock_err)?;

        let existing = match (record.id, &record.wire_id) {
            (Some(id), _) => tables.types.contains_key(&id).then_some(id),
            (None, Some(wire_id)) => {
                let key = ExistingKey::WireId {
                    namespace: record.namespace.clone(),
                    wire_id: wire_id.clone(),
                };
                tables.types.values().find(|r| key.matches(r)).and_then(|r| r.id)
            }
            (None, None) => None,
        };

        if let Some(id) = existing {
            if update_existing {
                record.id = Some(id);
                tables.types.insert(id, record);
            }
            return Ok((id, false));
        }

        // A caller-chosen id that does not exist yet is honoured.
        let id = match record.id {
            Some(id) => {
                tables.next_id = tables.next_id.max(id);
                id
            }
            None => tables.allocate(),
        };
        record.id = Some(id);
        tables.types.insert(id, record);
        Ok((id, true))
    }

    async fn find(&self, predicate: RecordPredicate<'_>) -> Result<Vec<TypeDefinitionRecord>> {
        let tables = self.inner.read().map_err(lock_err)?;
        Ok(tables
            .types
            .values()
            .filter(|r| predicate(r))
            .cloned()
            .collect())
    }

    async fn upsert_composition(&self, mut record: CompositionRecord) -> Result<RecordId> {
        let mut tables = self.inner.write().map_err(lock_err)?;
        let id = match record.id {
            Some(id) => id,
            None => tables.allocate(),
        };
        record.id = Some(id);
        tables.compositions.insert(id, record);
        Ok(id)
    }

    async fn upsert_attribute(&self, mut record: AttributeRecord) -> Result<RecordId> {
        let mut tables = self.inner.write().map_err(lock_err)?;
        let id = match record.id {
            Some(id) => id,
            None => tables.allocate(),
        };
        record.id = Some(id);
        tables.attributes.insert(id, record);
        Ok(id)
    }

    async fn compositions_of(&self, owner: RecordId) -> Result<Vec<CompositionRecord>> {
        let tables = self.inner.read().map_err(lock_err)?;
        let mut out: Vec<_> = tables
            .compositions
            .values()
            .filter(|c| c.owner_id == owner)
            .cloned()
            .collect();
        out.sort_by_key(|c| c.ordinal);
        Ok(out)
    }

    async fn attributes_of(&self, owner: RecordId) -> Result<Vec<AttributeRecord>> {
        let tables = self.inner.read().map_err(lock_err)?;
        let mut out: Vec<_> = tables
            .attributes
            .values()
            .filter(|a| a.owner_id == owner)
            .cloned()
            .collect();
        out.sort_by_key(|a| a.ordinal);
        Ok(out)
    }

    async fn clear_owned(&self, owner: RecordId) -> Result<()> {
        let mut tables = self.inner.write().map_err(lock_err)?;
        tables.compositions.retain(|_, c| c.owner_id != owner);
        tables.attributes.retain(|_, a| a.owner_id != owner);
        Ok(())
    }

    async fn save_model(&self, model: ModelRecord) -> Result<()> {
        let mut tables = self.inner.write().map_err(lock_err)?;
        tables.models.insert(model.namespace.clone(), model);
        Ok(())
    }

    async fn load_model(&self, namespace: &str) -> Result<Option<ModelRecord>> {
        let tables = self.inner.read().map_err(lock_err)?;
        Ok(tables.models.get(namespace).cloned())
    }

    async fn begin(&self) -> Result<()> {
        let mut snapshot = self.snapshot.lock().map_err(lock_err)?;
        if snapshot.is_some() {
            return Err(ModelError::Store("transaction already open".to_string()));
        }
        let tables = self.inner.read().map_err(lock_err)?;
        *snapshot = Some(tables.clone());
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let mut snapshot = self.snapshot.lock().map_err(lock_err)?;
        if snapshot.take().is_none() {
            return Err(ModelError::Store("no open transaction".to_string()));
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let mut snapshot = self.snapshot.lock().map_err(lock_err)?;
        let saved = snapshot
            .take()
            .ok_or_else(|| ModelError::Store("no open transaction".to_string()))?;
        let mut tables = self.inner.write().map_err(lock_err)?;
        *tables = saved;
        Ok(())
    }
}
