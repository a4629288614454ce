use super::{DeviceIdentity, DeviceProbe, HostProbe, ZfsProbe};
use crate::error::Result;
use crate::mount::utils::run_command;
use crate::platform::common::PROBE_TIMEOUT;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Resolves devices through the udev `by-uuid` / `by-label` symlink trees.
pub struct SystemDeviceProbe {
    uuid_dir: PathBuf,
    label_dir: PathBuf,
}

impl SystemDeviceProbe {
    pub fn new(uuid_dir: impl Into<PathBuf>, label_dir: impl Into<PathBuf>) -> Self {
        Self {
            uuid_dir: uuid_dir.into(),
            label_dir: label_dir.into(),
        }
    }

    /// Name of the symlink in `dir` that resolves to `device`.
    async fn reverse_lookup(dir: &Path, device: &Path) -> Option<String> {
        let mut entries = tokio::fs::read_dir(dir).await.ok()?;
        while let Ok(Some(entry)) = entries.next_entry().await {
            if let Ok(target) = tokio::fs::canonicalize(entry.path()).await
                && target == device
            {
                return Some(entry.file_name().to_string_lossy().to_string());
            }
        }
        None
    }

    async fn blkid_type(device: &Path) -> Option<String> {
        let mut cmd = Command::new("blkid");
        cmd.args(["-o", "value", "-s", "TYPE"]).arg(device);
        match run_command(&mut cmd, PROBE_TIMEOUT).await {
            Ok(output) if output.status.success() => {
                let fstype = String::from_utf8_lossy(&output.stdout).trim().to_string();
                (!fstype.is_empty()).then_some(fstype)
            }
            Ok(_) => None,
            Err(e) => {
                debug!("blkid on {} failed: {}", device.display(), e);
                None
            }
        }
    }
}

#[async_trait]
impl DeviceProbe for SystemDeviceProbe {
    async fn find_device(&self, uuid: Option<&str>, label: Option<&str>) -> Option<PathBuf> {
        let link = match (uuid, label) {
            (Some(uuid), _) => self.uuid_dir.join(uuid),
            (None, Some(label)) => self.label_dir.join(encode_label(label)),
            (None, None) => return None,
        };
        tokio::fs::canonicalize(&link).await.ok()
    }

    async fn identify(&self, device: &Path) -> DeviceIdentity {
        let uuid = Self::reverse_lookup(&self.uuid_dir, device).await;
        let label = Self::reverse_lookup(&self.label_dir, device)
            .await
            .map(|l| decode_label(&l));
        let fstype = Self::blkid_type(device).await;
        DeviceIdentity {
            uuid,
            label,
            fstype,
        }
    }
}

/// udev escapes spaces and slashes in label link names.
fn encode_label(label: &str) -> String {
    label.replace('/', "\\x2f").replace(' ', "\\x20")
}

fn decode_label(name: &str) -> String {
    name.replace("\\x20", " ").replace("\\x2f", "/")
}

/// Pool health through `zpool` / `zfs`.
pub struct SystemZfsProbe;

#[async_trait]
impl ZfsProbe for SystemZfsProbe {
    async fn pool_health(&self, pool: &str) -> Result<Option<String>> {
        let mut cmd = Command::new("zpool");
        cmd.args(["list", "-H", "-o", "health", pool]);
        let output = run_command(&mut cmd, PROBE_TIMEOUT).await?;
        if !output.status.success() {
            debug!("Pool {} not imported", pool);
            return Ok(None);
        }
        let health = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!health.is_empty()).then_some(health))
    }

    async fn is_mounted(&self, pool: &str) -> Result<bool> {
        let mut cmd = Command::new("zfs");
        cmd.args(["get", "-H", "-o", "value", "mounted", pool]);
        let output = run_command(&mut cmd, PROBE_TIMEOUT).await?;
        Ok(output.status.success() && String::from_utf8_lossy(&output.stdout).trim() == "yes")
    }
}

/// Host reachability through `ping(8)`.
pub struct SystemHostProbe;

#[async_trait]
impl HostProbe for SystemHostProbe {
    async fn ping(&self, host: &str, timeout: Duration) -> bool {
        let mut cmd = Command::new("ping");
        cmd.args(["-c", "1", "-W"])
            .arg(timeout.as_secs().max(1).to_string())
            .arg(host);
        match run_command(&mut cmd, timeout + Duration::from_secs(1)).await {
            Ok(output) => output.status.success(),
            Err(e) => {
                warn!("ping {} failed: {}", host, e);
                false
            }
        }
    }
}
