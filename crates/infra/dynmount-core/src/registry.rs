use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::debug;

/// Key prefix of ad-hoc entries for unconfigured removable devices.
pub const REMOVABLE_PREFIX: &str = "removable:";

/// Live health of a tracked mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DynHealth {
    Online,
    Offline,
    /// Left to the OS automounter.
    Auto,
    Degraded,
    /// Pool imported but its datasets are not mounted.
    Unmounted,
    Hostfail,
    Unavail,
}

impl DynHealth {
    /// Map a pool health reported by the ZFS watcher.
    pub fn from_pool(health: &str) -> Self {
        match health {
            "ONLINE" => DynHealth::Online,
            "DEGRADED" => DynHealth::Degraded,
            "UNMOUNTED" => DynHealth::Unmounted,
            _ => DynHealth::Unavail,
        }
    }
}

impl std::fmt::Display for DynHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DynHealth::Online => "ONLINE",
            DynHealth::Offline => "OFFLINE",
            DynHealth::Auto => "AUTO",
            DynHealth::Degraded => "DEGRADED",
            DynHealth::Unmounted => "UNMOUNTED",
            DynHealth::Hostfail => "HOSTFAIL",
            DynHealth::Unavail => "UNAVAIL",
        };
        write!(f, "{s}")
    }
}

/// One registry entry, as written to the run file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynMountState {
    pub name: String,
    pub mountpoint: PathBuf,
    pub health: DynHealth,
    /// Shares sourcing this mount.
    pub references: Vec<String>,
    /// Parallel to `references`.
    pub references_enabled: Vec<bool>,
}

impl DynMountState {
    pub fn new(name: impl Into<String>, mountpoint: impl Into<PathBuf>, health: DynHealth) -> Self {
        Self {
            name: name.into(),
            mountpoint: mountpoint.into(),
            health,
            references: Vec::new(),
            references_enabled: Vec::new(),
        }
    }

    pub fn with_references(mut self, references: Vec<(String, bool)>) -> Self {
        (self.references, self.references_enabled) = references.into_iter().unzip();
        self
    }

    pub fn is_removable(&self) -> bool {
        self.name.starts_with(REMOVABLE_PREFIX)
    }
}

/// Table of tracked mounts keyed by logical name.
///
/// Only `auto`/`dynmount` entries and ad-hoc removable devices are ever
/// present. Every change publishes a fresh snapshot to subscribers.
pub struct DynMountRegistry {
    entries: BTreeMap<String, DynMountState>,
    snapshots: watch::Sender<Vec<DynMountState>>,
}

impl Default for DynMountRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DynMountRegistry {
    pub fn new() -> Self {
        let (snapshots, _) = watch::channel(Vec::new());
        Self {
            entries: BTreeMap::new(),
            snapshots,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<DynMountState>> {
        self.snapshots.subscribe()
    }

    pub fn get(&self, name: &str) -> Option<&DynMountState> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn snapshot(&self) -> Vec<DynMountState> {
        self.entries.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or replace an entry.
    pub fn record(&mut self, state: DynMountState) {
        if self.entries.get(&state.name) == Some(&state) {
            return;
        }
        debug!("Registry: {} -> {}", state.name, state.health);
        self.entries.insert(state.name.clone(), state);
        self.publish();
    }

    pub fn set_health(&mut self, name: &str, health: DynHealth) -> bool {
        match self.entries.get_mut(name) {
            Some(state) if state.health != health => {
                debug!("Registry: {} {} -> {}", name, state.health, health);
                state.health = health;
                self.publish();
                true
            }
            Some(_) => true,
            None => false,
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<DynMountState> {
        let removed = self.entries.remove(name);
        if removed.is_some() {
            debug!("Registry: removed {}", name);
            self.publish();
        }
        removed
    }

    /// Replace all configured entries with `desired`, keeping ad-hoc
    /// removable entries. Publishes once.
    pub fn replace_configured(&mut self, desired: Vec<DynMountState>) {
        let mut next: BTreeMap<String, DynMountState> = self
            .entries
            .iter()
            .filter(|(_, s)| s.is_removable())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        next.extend(desired.into_iter().map(|s| (s.name.clone(), s)));
        if next != self.entries {
            self.entries = next;
            self.publish();
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }
}
