use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Daemon settings, stored under `settings` in the config document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory of stable device symlinks the device watcher follows.
    pub device_dir: PathBuf,
    pub label_dir: PathBuf,
    /// Parent of generated mountpoints.
    pub mount_root: PathBuf,
    /// Mount unknown devices under `removable_root`.
    pub removable: bool,
    pub removable_root: PathBuf,
    pub shares_root: PathBuf,
    pub run_file: PathBuf,
    pub fstab: PathBuf,
    pub poll_interval_secs: u64,
    pub ping_timeout_secs: u64,
    pub mount_timeout_secs: u64,
    /// Count DEGRADED pools as available.
    pub degraded_available: bool,
    pub autofix: AutofixSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device_dir: PathBuf::from("/dev/disk/by-uuid"),
            label_dir: PathBuf::from("/dev/disk/by-label"),
            mount_root: PathBuf::from("/mnt"),
            removable: false,
            removable_root: PathBuf::from("/media/dynmount"),
            shares_root: PathBuf::from("/srv/shares"),
            run_file: PathBuf::from("/run/dynmount"),
            fstab: PathBuf::from("/etc/fstab"),
            poll_interval_secs: 5,
            ping_timeout_secs: 1,
            mount_timeout_secs: 5,
            degraded_available: true,
            autofix: AutofixSettings::default(),
        }
    }
}

impl Settings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs.max(1))
    }

    pub fn mount_timeout(&self) -> Duration {
        Duration::from_secs(self.mount_timeout_secs.max(1))
    }

    /// Generated mountpoint for a named entry.
    pub fn default_mountpoint(&self, name: &str) -> PathBuf {
        self.mount_root.join(name)
    }

    /// Scratch mountpoint for an unconfigured removable device.
    pub fn removable_mountpoint(&self, device: &std::path::Path) -> PathBuf {
        let leaf = device
            .file_name()
            .map_or_else(|| "device".to_string(), |n| n.to_string_lossy().to_string());
        self.removable_root.join(leaf)
    }

    /// Location of a share symlink.
    pub fn share_link(&self, share: &str) -> PathBuf {
        self.shares_root.join(share)
    }
}

/// Bounded-retry policy of the auto-fix supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutofixSettings {
    pub enabled: bool,
    /// Consecutive fix attempts before giving up; 0 means unlimited.
    pub retries: u32,
    pub first_run_delay_secs: u64,
    pub retry_interval_secs: u64,
    pub interval_secs: u64,
}

impl Default for AutofixSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            retries: 3,
            first_run_delay_secs: 1,
            retry_interval_secs: 60,
            interval_secs: 600,
        }
    }
}

impl AutofixSettings {
    pub fn first_run_delay(&self) -> Duration {
        Duration::from_secs(self.first_run_delay_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs.max(1))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}
