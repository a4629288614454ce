use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::settings::Settings;

/// On-disk document: daemon settings plus the stored intent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(flatten)]
    pub intent: Intent,
}

/// How a mount or remote mount gets attached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    #[default]
    Disabled,
    /// Mounted at boot from the static mount table.
    Startup,
    /// Mounted on first access by the OS automounter.
    Auto,
    /// Mounted and unmounted by this daemon on presence events.
    Dynmount,
}

impl Method {
    /// Dynamic entries are the only ones tracked in the registry.
    pub fn is_dynamic(self) -> bool {
        matches!(self, Method::Auto | Method::Dynmount)
    }
}

impl std::str::FromStr for Method {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "disabled" => Ok(Method::Disabled),
            "startup" => Ok(Method::Startup),
            "auto" => Ok(Method::Auto),
            "dynmount" => Ok(Method::Dynmount),
            _ => Err(anyhow::anyhow!(
                "Invalid mount method: {}. Must be one of disabled, startup, auto, dynmount",
                s
            )),
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Disabled => write!(f, "disabled"),
            Method::Startup => write!(f, "startup"),
            Method::Auto => write!(f, "auto"),
            Method::Dynmount => write!(f, "dynmount"),
        }
    }
}

fn default_fstype() -> String {
    "auto".to_string()
}

fn default_true() -> bool {
    true
}

/// A local filesystem attachment, identified by device UUID or label.
///
/// For ZFS-backed entries the `uuid` field holds the pool name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mountpoint: Option<PathBuf>,
    #[serde(default = "default_fstype")]
    pub fstype: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default)]
    pub method: Method,
    #[serde(default)]
    pub zfs: bool,
}

impl MountSpec {
    pub fn has_option(&self, option: &str) -> bool {
        has_option(&self.options, option)
    }

    /// The OS is expected to have mounted this at boot.
    pub fn auto_mount_expected(&self) -> bool {
        self.method == Method::Startup && !self.has_option("noauto")
    }

    /// Pool name for ZFS-backed mounts.
    pub fn pool(&self) -> Option<&str> {
        if self.zfs { self.uuid.as_deref() } else { None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteFsType {
    Cifs,
    Nfs,
    Davfs,
    Sshfs,
}

impl RemoteFsType {
    /// Userspace helper the kernel mount needs for this type.
    pub fn helper(self) -> &'static str {
        match self {
            RemoteFsType::Cifs => "mount.cifs",
            RemoteFsType::Nfs => "mount.nfs",
            RemoteFsType::Davfs => "mount.davfs",
            RemoteFsType::Sshfs => "sshfs",
        }
    }

    /// Only cifs and davfs authenticate through guest mode or stored credentials.
    pub fn uses_credentials(self) -> bool {
        matches!(self, RemoteFsType::Cifs | RemoteFsType::Davfs)
    }
}

impl std::fmt::Display for RemoteFsType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteFsType::Cifs => write!(f, "cifs"),
            RemoteFsType::Nfs => write!(f, "nfs"),
            RemoteFsType::Davfs => write!(f, "davfs"),
            RemoteFsType::Sshfs => write!(f, "sshfs"),
        }
    }
}

/// A network filesystem attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMountSpec {
    pub server: String,
    pub share: String,
    pub fstype: RemoteFsType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mountpoint: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default)]
    pub method: Method,
    /// Stored credentials exist for this entry.
    #[serde(default)]
    pub credentials: bool,
}

impl RemoteMountSpec {
    pub fn has_option(&self, option: &str) -> bool {
        has_option(&self.options, option)
    }

    pub fn is_guest(&self) -> bool {
        self.has_option("guest")
    }

    /// Credentials are stored for the entry or named by a `credentials=` option.
    pub fn has_credentials(&self) -> bool {
        self.credentials || self.has_option("credentials")
    }

    pub fn auto_mount_expected(&self) -> bool {
        self.method == Method::Startup && !self.has_option("noauto")
    }

    /// The source string passed to mount, also used as the watcher key.
    pub fn url(&self) -> String {
        let share = self.share.trim_start_matches('/');
        match self.fstype {
            RemoteFsType::Cifs => format!("//{}/{}", self.server, share),
            RemoteFsType::Nfs => format!("{}:/{}", self.server, share),
            RemoteFsType::Davfs => format!("https://{}/{}", self.server, share),
            RemoteFsType::Sshfs => match &self.user {
                Some(user) => format!("{user}@{}:/{}", self.server, share),
                None => format!("{}:/{}", self.server, share),
            },
        }
    }
}

/// A symlink under the shares root exposing a folder of a mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareSpec {
    /// Name of the source mount or remote mount.
    pub mount: String,
    #[serde(default)]
    pub folder: PathBuf,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetshareProtocol {
    Cifs,
    Nfs,
}

impl std::fmt::Display for NetshareProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetshareProtocol::Cifs => write!(f, "cifs"),
            NetshareProtocol::Nfs => write!(f, "nfs"),
        }
    }
}

/// A Samba/NFS re-export of a share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetshareSpec {
    pub share: String,
    pub protocol: NetshareProtocol,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Recycle bin max age in days (cifs only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recycle_max_age: Option<u32>,
}

/// The persisted record of intent. Maps iterate in name order, which is the
/// configuration order every sweep reports in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    #[serde(default)]
    pub mounts: BTreeMap<String, MountSpec>,
    #[serde(default)]
    pub remote_mounts: BTreeMap<String, RemoteMountSpec>,
    #[serde(default)]
    pub shares: BTreeMap<String, ShareSpec>,
    #[serde(default)]
    pub netshares: BTreeMap<String, NetshareSpec>,
}

impl Intent {
    pub fn mount(&self, name: &str) -> Option<&MountSpec> {
        self.mounts.get(name)
    }

    pub fn remote_mount(&self, name: &str) -> Option<&RemoteMountSpec> {
        self.remote_mounts.get(name)
    }

    pub fn remote_mount_mut(&mut self, name: &str) -> Option<&mut RemoteMountSpec> {
        self.remote_mounts.get_mut(name)
    }

    pub fn share(&self, name: &str) -> Option<&ShareSpec> {
        self.shares.get(name)
    }

    pub fn share_mut(&mut self, name: &str) -> Option<&mut ShareSpec> {
        self.shares.get_mut(name)
    }

    pub fn remove_netshare(&mut self, name: &str) -> Option<NetshareSpec> {
        self.netshares.remove(name)
    }

    /// Find the mount bound to a device identity. UUID wins over label.
    pub fn mount_for_device(
        &self,
        uuid: Option<&str>,
        label: Option<&str>,
    ) -> Option<(&String, &MountSpec)> {
        if let Some(uuid) = uuid
            && let Some(found) = self
                .mounts
                .iter()
                .find(|(_, m)| !m.zfs && m.uuid.as_deref() == Some(uuid))
        {
            return Some(found);
        }
        let label = label?;
        self.mounts
            .iter()
            .find(|(_, m)| !m.zfs && m.uuid.is_none() && m.label.as_deref() == Some(label))
    }

    /// Find the mount whose UUID equals a pool name, ZFS-typed or not.
    pub fn mount_for_pool(&self, pool: &str) -> Option<(&String, &MountSpec)> {
        self.mounts
            .iter()
            .find(|(_, m)| m.uuid.as_deref() == Some(pool))
    }

    pub fn remote_mount_for_url(&self, url: &str) -> Option<(&String, &RemoteMountSpec)> {
        self.remote_mounts.iter().find(|(_, r)| r.url() == url)
    }

    pub fn shares_sourced_by<'a>(
        &'a self,
        mount: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a ShareSpec)> + 'a {
        self.shares.iter().filter(move |(_, s)| s.mount == mount)
    }

    pub fn netshares_for<'a>(
        &'a self,
        share: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a NetshareSpec)> + 'a {
        self.netshares.iter().filter(move |(_, n)| n.share == share)
    }

    /// A mount is referenced when an enabled share sources it.
    pub fn mount_is_referenced(&self, mount: &str) -> bool {
        self.shares_sourced_by(mount).any(|(_, s)| s.enabled)
    }

    /// A share is referenced when an enabled netshare points at it.
    pub fn share_is_referenced(&self, share: &str) -> bool {
        self.netshares_for(share).any(|(_, n)| n.enabled)
    }

    /// Pools the ZFS watcher should follow. As with URLs, `auto` pools keep
    /// their read-only health and are not watched.
    pub fn monitored_pools(&self) -> Vec<String> {
        self.mounts
            .values()
            .filter(|m| m.method == Method::Dynmount)
            .filter_map(|m| m.pool().map(str::to_string))
            .collect()
    }

    /// URLs the remote-host watcher should follow. `auto` entries are left to
    /// the automounter and never watched.
    pub fn monitored_urls(&self) -> Vec<String> {
        self.remote_mounts
            .values()
            .filter(|r| r.method == Method::Dynmount)
            .map(RemoteMountSpec::url)
            .collect()
    }
}

fn has_option(options: &[String], option: &str) -> bool {
    options
        .iter()
        .any(|o| o == option || o.split_once('=').is_some_and(|(k, _)| k == option))
}
