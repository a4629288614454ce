use super::constants::linux::{CORE_TOOLS, ZFS_TOOLS};
use crate::config::{Intent, RemoteFsType};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Which external tools are installed.
#[derive(Debug, Clone, Default)]
pub struct ToolSet {
    missing: BTreeSet<String>,
}

impl ToolSet {
    /// Probe `PATH` for everything the configured intent needs.
    pub fn detect(intent: &Intent) -> Self {
        let mut wanted: BTreeSet<&str> = CORE_TOOLS.iter().copied().collect();
        if intent.mounts.values().any(|m| m.zfs) {
            wanted.extend(ZFS_TOOLS.iter().copied());
        }
        let fstypes: BTreeSet<RemoteFsType> =
            intent.remote_mounts.values().map(|r| r.fstype).collect();
        wanted.extend(fstypes.into_iter().map(RemoteFsType::helper));

        let missing: BTreeSet<String> = wanted
            .into_iter()
            .filter(|tool| {
                let found = which::which(tool).is_ok();
                debug!("Tool {}: {}", tool, if found { "found" } else { "missing" });
                !found
            })
            .map(str::to_string)
            .collect();

        if missing.is_empty() {
            info!("All required tools found");
        } else {
            warn!("Missing tools: {:?}", missing);
        }
        Self { missing }
    }

    /// Treat every tool as installed.
    pub fn all_available() -> Self {
        Self::default()
    }

    /// Treat the given tools as missing.
    pub fn with_missing<I, S>(tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            missing: tools.into_iter().map(Into::into).collect(),
        }
    }

    pub fn available(&self, tool: &str) -> bool {
        !self.missing.contains(tool)
    }

    pub fn missing(&self) -> impl Iterator<Item = &str> {
        self.missing.iter().map(String::as_str)
    }
}

/// True when running with root privileges.
pub fn is_privileged() -> bool {
    #[cfg(unix)]
    {
        nix::unistd::geteuid().is_root()
    }
    #[cfg(not(unix))]
    {
        false
    }
}
