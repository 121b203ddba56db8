use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;

use crate::compactor;
use crate::engine::Engine;
use crate::limits::*;
use crate::notify::NotifyHub;
use crate::sidecar::SideChannel;

/// Manages per-organization engines. Each organization gets its own Engine +
/// WAL + notify hub + compactor, so tenants never see each other's
/// workspaces, bookings, or notifications. Organization membership is an
/// explicit structural boundary here — never an attribute smuggled into a
/// workspace's amenity flags.
pub struct OrgManager {
    engines: DashMap<String, Arc<Engine>>,
    data_dir: PathBuf,
    compact_threshold: u64,
    sidecar: Arc<dyn SideChannel>,
}

impl OrgManager {
    pub fn new(data_dir: PathBuf, compact_threshold: u64, sidecar: Arc<dyn SideChannel>) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir,
            compact_threshold,
            sidecar,
        }
    }

    /// Get or lazily create an engine for the given organization.
    pub fn get_or_create(&self, org: &str) -> std::io::Result<Arc<Engine>> {
        if let Some(engine) = self.engines.get(org) {
            return Ok(engine.value().clone());
        }
        if org.len() > MAX_ORG_NAME_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "organization name too long",
            ));
        }
        if self.engines.len() >= MAX_ORGS {
            return Err(std::io::Error::other("too many organizations"));
        }

        // Sanitize the name to prevent path traversal
        let safe_name: String = org
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if safe_name.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty organization name",
            ));
        }

        let wal_path = self.data_dir.join(format!("{safe_name}.wal"));
        let notify = Arc::new(NotifyHub::new());
        let engine = Arc::new(Engine::new(wal_path, notify, self.sidecar.clone())?);

        let compactor_engine = engine.clone();
        let threshold = self.compact_threshold;
        tokio::spawn(async move {
            compactor::run_compactor(compactor_engine, threshold).await;
        });

        self.engines.insert(org.to_string(), engine.clone());
        metrics::gauge!(crate::observability::ORGS_ACTIVE).set(self.engines.len() as f64);
        Ok(engine)
    }
}
