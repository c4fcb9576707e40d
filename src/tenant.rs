use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use tracing::info;

use crate::compactor;
use crate::engine::Engine;
use crate::limits::*;

#[derive(Debug, Error)]
pub enum TenantError {
    #[error("tenant name too long ({0} bytes)")]
    NameTooLong(usize),
    #[error("tenant name {0:?} has no usable characters")]
    EmptyName(String),
    #[error("too many tenants")]
    TooManyTenants,
    #[error("cannot open tenant {tenant}: {source}")]
    Open {
        tenant: String,
        #[source]
        source: io::Error,
    },
}

/// WAL file name for a tenant. Only alphanumerics, `_` and `-` survive, so a
/// database name can never escape the data directory.
fn wal_file_name(tenant: &str) -> Result<String, TenantError> {
    if tenant.len() > MAX_TENANT_NAME_LEN {
        return Err(TenantError::NameTooLong(tenant.len()));
    }
    let stem: String = tenant
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if stem.is_empty() {
        return Err(TenantError::EmptyName(tenant.to_string()));
    }
    Ok(format!("{stem}.wal"))
}

/// One hotel per database name. Each tenant owns an `Engine`, its WAL file
/// and a compactor task, created on first connection.
pub struct TenantManager {
    engines: DashMap<String, Arc<Engine>>,
    data_dir: PathBuf,
    compact_threshold: u64,
}

impl TenantManager {
    pub fn new(data_dir: PathBuf, compact_threshold: u64) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir,
            compact_threshold,
        }
    }

    pub fn get_or_create(&self, tenant: &str) -> Result<Arc<Engine>, TenantError> {
        if let Some(engine) = self.engines.get(tenant) {
            return Ok(engine.value().clone());
        }
        let file_name = wal_file_name(tenant)?;
        // Checked before taking the entry: len() would block on the shard it holds.
        if self.engines.len() >= MAX_TENANTS {
            return Err(TenantError::TooManyTenants);
        }

        // Racing connections for a new tenant: the vacant entry keeps its
        // shard locked, so exactly one engine and one WAL writer get built.
        let engine = match self.engines.entry(tenant.to_string()) {
            Entry::Occupied(existing) => return Ok(existing.get().clone()),
            Entry::Vacant(slot) => {
                let engine = Engine::new(self.data_dir.join(&file_name))
                    .map(Arc::new)
                    .map_err(|source| TenantError::Open {
                        tenant: tenant.to_string(),
                        source,
                    })?;
                tokio::spawn(compactor::run_compactor(engine.clone(), self.compact_threshold));
                slot.insert(engine.clone());
                engine
            }
        };

        metrics::gauge!(crate::observability::TENANTS_ACTIVE).set(self.engines.len() as f64);
        info!("tenant {tenant} loaded from {file_name}");
        Ok(engine)
    }

    pub fn tenant_count(&self) -> usize {
        self.engines.len()
    }
}
