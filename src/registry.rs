//! Target registry
//!
//! Holds the monitored targets as an immutable snapshot that is replaced
//! wholesale on reload, a status board with the latest status of every
//! target, and the effective runtime settings.
//!
//! Readers clone the `Arc` of the current snapshot and keep using it for as
//! long as they like; a reload never mutates a snapshot in place.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::config::Settings;
use crate::storage::{StorageBackend, StorageResult};
use crate::{DeviceStatus, MonitoredTarget, TargetKey};

/// One consistent view of every monitored target
#[derive(Debug, Default)]
pub struct Snapshot {
    targets: HashMap<TargetKey, MonitoredTarget>,
    by_address: HashMap<String, Vec<TargetKey>>,
    pub loaded_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn new(targets: Vec<MonitoredTarget>, loaded_at: DateTime<Utc>) -> Self {
        let mut by_address: HashMap<String, Vec<TargetKey>> = HashMap::new();
        for target in &targets {
            by_address
                .entry(target.address.clone())
                .or_default()
                .push(target.key);
        }

        Self {
            targets: targets.into_iter().map(|t| (t.key, t)).collect(),
            by_address,
            loaded_at: Some(loaded_at),
        }
    }

    pub fn get(&self, key: &TargetKey) -> Option<&MonitoredTarget> {
        self.targets.get(key)
    }

    /// Targets probed at `address`. Several targets may share one address.
    pub fn by_address(&self, address: &str) -> impl Iterator<Item = &MonitoredTarget> {
        self.by_address
            .get(address)
            .into_iter()
            .flatten()
            .filter_map(|key| self.targets.get(key))
    }

    /// Distinct probe addresses, sorted
    pub fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self
            .by_address
            .keys()
            .filter(|address| !address.is_empty())
            .cloned()
            .collect();
        addresses.sort();
        addresses
    }

    pub fn targets(&self) -> impl Iterator<Item = &MonitoredTarget> {
        self.targets.values()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

struct Inner {
    snapshot: RwLock<Arc<Snapshot>>,
    status: RwLock<HashMap<TargetKey, DeviceStatus>>,
    settings: watch::Sender<Arc<Settings>>,
}

/// Shared handle to the registry. Cloning is cheap.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Inner>,
}

impl Registry {
    pub fn new(settings: Settings) -> Self {
        let (settings, _) = watch::channel(Arc::new(settings));
        Self {
            inner: Arc::new(Inner {
                snapshot: RwLock::new(Arc::new(Snapshot::default())),
                status: RwLock::new(HashMap::new()),
                settings,
            }),
        }
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner
            .snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in a new target set. Status board entries are seeded from the
    /// stored status for targets not seen before and dropped for targets
    /// that disappeared; existing entries are left to the writer.
    pub fn replace(&self, targets: Vec<MonitoredTarget>) {
        let snapshot = Arc::new(Snapshot::new(targets, Utc::now()));

        {
            let mut status = self
                .inner
                .status
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            status.retain(|key, _| snapshot.get(key).is_some());
            for target in snapshot.targets() {
                status
                    .entry(target.key)
                    .or_insert(target.last_known_status);
            }
        }

        *self
            .inner
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    /// Copy-on-write edit of one target, visible to the next reader
    pub fn update_target(&self, key: TargetKey, edit: impl FnOnce(&mut MonitoredTarget)) -> bool {
        let mut guard = self
            .inner
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let Some(current) = guard.get(&key) else {
            return false;
        };
        let mut edited = current.clone();
        edit(&mut edited);

        let mut targets: Vec<MonitoredTarget> = guard
            .targets()
            .filter(|t| t.key != key)
            .cloned()
            .collect();
        targets.push(edited);
        let loaded_at = guard.loaded_at.unwrap_or_else(Utc::now);
        *guard = Arc::new(Snapshot::new(targets, loaded_at));
        true
    }

    pub fn status(&self, key: &TargetKey) -> DeviceStatus {
        self.inner
            .status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
            .unwrap_or_default()
    }

    /// Only the probe writer calls this
    pub fn set_status(&self, key: TargetKey, status: DeviceStatus) {
        self.inner
            .status
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, status);
    }

    pub fn status_board(&self) -> HashMap<TargetKey, DeviceStatus> {
        self.inner
            .status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Keys of targets currently online
    pub fn online(&self) -> Vec<TargetKey> {
        self.inner
            .status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, status)| **status == DeviceStatus::Online)
            .map(|(key, _)| *key)
            .collect()
    }

    pub fn settings(&self) -> Arc<Settings> {
        self.inner.settings.borrow().clone()
    }

    pub fn subscribe_settings(&self) -> watch::Receiver<Arc<Settings>> {
        self.inner.settings.subscribe()
    }

    pub fn publish_settings(&self, settings: Settings) {
        self.inner.settings.send_replace(Arc::new(settings));
    }

    /// Reload targets and settings from the store. The settings layers are
    /// documented defaults, then `file_settings`, then the store's table.
    #[instrument(skip_all)]
    pub async fn reload(
        &self,
        store: &dyn StorageBackend,
        file_settings: &HashMap<String, String>,
    ) -> StorageResult<usize> {
        let targets = store.load_targets().await?;
        let count = targets.len();
        self.replace(targets);

        match store.load_settings().await {
            Ok(stored) => {
                let settings = Settings::from_layers(&[file_settings, &stored]);
                if *self.settings() != settings {
                    info!("runtime settings changed");
                    self.publish_settings(settings);
                }
            }
            Err(e) => warn!("failed to load settings, keeping current values: {e}"),
        }

        debug!("registry reloaded with {count} targets");
        Ok(count)
    }
}
