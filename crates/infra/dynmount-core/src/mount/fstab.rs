use super::types::MountEntry;
use super::utils::{normalize, parse_table};
use crate::probe::DeviceIdentity;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Read-only view of the static mount table. The file is re-read on every
/// lookup since other tools edit it.
#[derive(Debug, Clone)]
pub struct Fstab {
    path: PathBuf,
}

impl Fstab {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn entries(&self) -> Vec<MountEntry> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => parse_table(&content),
            Err(e) => {
                debug!("Cannot read {}: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }

    /// Entry whose source names this device by UUID, label or path.
    pub fn find_for_device(&self, identity: &DeviceIdentity, device: &Path) -> Option<MountEntry> {
        let device = device.to_string_lossy();
        self.entries().into_iter().find(|e| {
            let source = e.source.as_str();
            source == device
                || identity
                    .uuid
                    .as_deref()
                    .is_some_and(|u| source == format!("UUID={u}"))
                || identity
                    .label
                    .as_deref()
                    .is_some_and(|l| source == format!("LABEL={l}"))
        })
    }

    pub fn find_for_source(&self, source: &str) -> Option<MountEntry> {
        self.entries().into_iter().find(|e| e.source == source)
    }

    pub fn find_for_mountpoint(&self, point: &Path) -> Option<MountEntry> {
        let point = normalize(point);
        self.entries()
            .into_iter()
            .find(|e| normalize(&e.target) == point)
    }
}
