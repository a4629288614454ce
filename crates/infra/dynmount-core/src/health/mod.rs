//! Read-only sweep comparing live OS state against the stored intent.

mod checker;

pub use checker::HealthChecker;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Mount,
    RemoteMount,
    Share,
    Netshare,
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectKind::Mount => write!(f, "mount"),
            ObjectKind::RemoteMount => write!(f, "remote mount"),
            ObjectKind::Share => write!(f, "share"),
            ObjectKind::Netshare => write!(f, "netshare"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Device, host helper or source is absent.
    Unavailable,
    /// Expected to be mounted at boot but is not.
    NotMountedAuto,
    /// Mounted but degraded or failed.
    Unhealthy,
    /// Not mounted while an enabled share depends on it.
    ReferencedNotMounted,
    /// Not mounted, nothing depends on it yet.
    NotMounted,
    HostUnreachable,
    MissingNetdevOption,
    /// Exactly one of guest mode or stored credentials must hold.
    MissingCredentials,
    EnabledNotLinked,
    /// Enabled, sourced and exported by a netshare, but not linked.
    ReferencedNotLinked,
    DisabledLinked,
    DisabledButReferenced,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::NotMountedAuto => "not mounted at boot",
            ErrorKind::Unhealthy => "unhealthy",
            ErrorKind::ReferencedNotMounted => "referenced but not mounted",
            ErrorKind::NotMounted => "not mounted",
            ErrorKind::HostUnreachable => "host unreachable",
            ErrorKind::MissingNetdevOption => "missing _netdev option",
            ErrorKind::MissingCredentials => "missing credentials",
            ErrorKind::EnabledNotLinked => "enabled but not linked",
            ErrorKind::ReferencedNotLinked => "referenced but not linked",
            ErrorKind::DisabledLinked => "disabled but linked",
            ErrorKind::DisabledButReferenced => "disabled but referenced",
        };
        write!(f, "{s}")
    }
}

/// One problem found by a sweep. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub object: ObjectKind,
    pub name: String,
    pub kind: ErrorKind,
}

impl ErrorRecord {
    pub fn new(object: ObjectKind, name: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            object,
            name: name.into(),
            kind,
        }
    }
}

impl std::fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.object, self.name, self.kind)
    }
}

/// How picky a sweep is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Strictness {
    #[default]
    Full,
    /// Skip plain not-mounted findings; only problems that break something.
    Light,
}
