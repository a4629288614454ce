use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One line of a mount table (`/etc/fstab` or `/proc/mounts`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountEntry {
    /// Device, `UUID=`/`LABEL=` spec, or network source.
    pub source: String,
    pub target: PathBuf,
    pub fstype: String,
    pub options: Vec<String>,
}

impl MountEntry {
    pub fn has_option(&self, option: &str) -> bool {
        self.options
            .iter()
            .any(|o| o == option || o.split_once('=').is_some_and(|(k, _)| k == option))
    }
}

/// Flags for [`super::MountPrimitives::unmount`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnmountFlags {
    /// Force a lazy detach; needed when a remote host vanished.
    pub force: bool,
    /// Issued by the daemon itself: keep the mountpoint directory for the next mount.
    pub internal: bool,
}

impl UnmountFlags {
    pub fn forced_internal() -> Self {
        Self {
            force: true,
            internal: true,
        }
    }

    pub fn internal() -> Self {
        Self {
            force: false,
            internal: true,
        }
    }
}
