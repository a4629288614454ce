//! Read-only collaborators that report device, pool and host presence.

mod system;

#[cfg(test)]
mod mock;

use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use system::{SystemDeviceProbe, SystemHostProbe, SystemZfsProbe};

#[cfg(test)]
pub use mock::{MockDeviceProbe, MockHostProbe, MockZfsProbe};

/// Identity of a block device as seen through udev symlinks and blkid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub uuid: Option<String>,
    pub label: Option<String>,
    pub fstype: Option<String>,
}

impl DeviceIdentity {
    /// ZFS pool members are imported by ZFS, never mounted directly.
    pub fn is_zfs_member(&self) -> bool {
        self.fstype.as_deref() == Some("zfs_member")
    }
}

#[async_trait]
pub trait DeviceProbe: Send + Sync {
    /// Canonical device path for a UUID or label, if present.
    async fn find_device(&self, uuid: Option<&str>, label: Option<&str>) -> Option<PathBuf>;

    async fn identify(&self, device: &Path) -> DeviceIdentity;
}

#[async_trait]
pub trait ZfsProbe: Send + Sync {
    /// Raw pool health (`ONLINE`, `DEGRADED`, `FAULTED`, ...). `Ok(None)` when
    /// the pool is not imported; `Err` when ZFS tooling cannot be queried.
    async fn pool_health(&self, pool: &str) -> Result<Option<String>>;

    async fn is_mounted(&self, pool: &str) -> Result<bool>;
}

#[async_trait]
pub trait HostProbe: Send + Sync {
    /// One ICMP echo to `host`.
    async fn ping(&self, host: &str, timeout: Duration) -> bool;
}

/// Extract the host part of a remote mount URL (`//host/share`,
/// `host:/path`, `https://host/path`, `user@host:/path`).
pub fn host_of_url(url: &str) -> Option<String> {
    let rest = if let Some(idx) = url.find("://") {
        &url[idx + 3..]
    } else {
        url.trim_start_matches("//")
    };
    let authority = rest.split('/').next().unwrap_or_default();
    let authority = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    let host = authority
        .split(':')
        .next()
        .filter(|h| !h.is_empty())?;
    Some(host.to_string())
}
