//! Menu items, inventory and users: plain CRUD with create-time validation
//! and SKU/username uniqueness. Nothing here touches room or booking state.

use tracing::debug;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

fn require_text(value: &str, field: &'static str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::InvalidInput(field));
    }
    if value.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("text field too long"));
    }
    Ok(())
}

fn validate_record(record: &CatalogRecord) -> Result<(), EngineError> {
    match record {
        CatalogRecord::MenuItem(m) => {
            require_text(&m.name, "name is required")?;
            require_text(&m.category, "category is required")?;
            if !m.price.is_finite() || m.price <= 0.0 {
                return Err(EngineError::InvalidInput("price must be a positive number"));
            }
        }
        CatalogRecord::InventoryItem(i) => {
            require_text(&i.sku, "sku is required")?;
            require_text(&i.name, "name is required")?;
            if i.quantity < 0 {
                return Err(EngineError::InvalidInput("quantity must not be negative"));
            }
            if !i.unit_cost.is_finite() || i.unit_cost < 0.0 {
                return Err(EngineError::InvalidInput("unit_cost must not be negative"));
            }
        }
        CatalogRecord::User(u) => {
            require_text(&u.username, "username is required")?;
            require_text(&u.role, "role is required")?;
        }
    }
    Ok(())
}

impl Engine {
    /// Reject `record` if another entry of its kind holds the same unique key.
    fn check_unique(&self, record: &CatalogRecord) -> Result<(), EngineError> {
        let Some(key) = record.unique_key() else {
            return Ok(());
        };
        let taken = self.catalog.iter().any(|e| {
            let other = e.value();
            other.kind() == record.kind() && other.id() != record.id() && other.unique_key() == Some(key)
        });
        if taken {
            return Err(EngineError::AlreadyExists {
                kind: record.kind().table(),
                key: key.to_string(),
            });
        }
        Ok(())
    }

    /// Create a catalog entry. Any id on `record` is replaced by a fresh one.
    pub async fn create_catalog_item(&self, record: CatalogRecord) -> Result<CatalogRecord, EngineError> {
        validate_record(&record)?;
        let _catalog = self.catalog_lock.lock().await;
        if self.catalog.len() >= MAX_CATALOG_ENTRIES_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many catalog entries"));
        }
        let record = record.with_id(0);
        self.check_unique(&record)?;

        let id = self.sequences.catalog(record.kind()).next();
        let record = record.with_id(id);
        self.wal_append(&Event::CatalogUpserted {
            record: record.clone(),
        })
        .await?;
        self.catalog.insert((record.kind(), record.id()), record.clone());
        debug!("{} {} created", record.kind(), record.id());
        Ok(record)
    }

    pub fn get_catalog_item(&self, kind: CatalogKind, id: Id) -> Result<CatalogRecord, EngineError> {
        self.catalog
            .get(&(kind, id))
            .map(|e| e.value().clone())
            .ok_or_else(|| EngineError::catalog_not_found(kind, id))
    }

    /// All entries of one kind, by id.
    pub fn list_catalog(&self, kind: CatalogKind) -> Vec<CatalogRecord> {
        let mut records: Vec<CatalogRecord> = self
            .catalog
            .iter()
            .filter(|e| e.key().0 == kind)
            .map(|e| e.value().clone())
            .collect();
        records.sort_by_key(CatalogRecord::id);
        records
    }

    pub async fn update_catalog_item(&self, id: Id, patch: CatalogPatch) -> Result<CatalogRecord, EngineError> {
        let kind = patch.kind();
        let _catalog = self.catalog_lock.lock().await;
        let current = self.get_catalog_item(kind, id)?;
        let updated = patch
            .apply(&current)
            .ok_or(EngineError::InvalidInput("patch does not match entry kind"))?;
        if updated == current {
            return Ok(current);
        }
        validate_record(&updated)?;
        self.check_unique(&updated)?;

        self.wal_append(&Event::CatalogUpserted {
            record: updated.clone(),
        })
        .await?;
        self.catalog.insert((kind, id), updated.clone());
        Ok(updated)
    }

    /// Delete an entry. Deleting something that isn't there is `NotFound`.
    pub async fn delete_catalog_item(&self, kind: CatalogKind, id: Id) -> Result<(), EngineError> {
        let _catalog = self.catalog_lock.lock().await;
        if !self.catalog.contains_key(&(kind, id)) {
            return Err(EngineError::catalog_not_found(kind, id));
        }
        self.wal_append(&Event::CatalogDeleted { kind, id }).await?;
        self.catalog.remove(&(kind, id));
        Ok(())
    }
}
