use super::types::{Config, NetshareProtocol};
use crate::error::{DynmountError, Result};
use std::path::Component;

/// Sanitize an entry name for use as a directory or symlink name
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect()
}

/// Structural checks run on every load and save.
pub fn validate(config: &Config) -> Result<()> {
    let intent = &config.intent;

    for name in intent.remote_mounts.keys() {
        if intent.mounts.contains_key(name) {
            return invalid(format!(
                "'{name}' is configured both as a mount and as a remote mount"
            ));
        }
    }

    for (name, mount) in &intent.mounts {
        if mount.uuid.is_none() && mount.label.is_none() {
            return invalid(format!("mount '{name}' needs a uuid or a label"));
        }
        if mount.zfs && mount.uuid.is_none() {
            return invalid(format!("zfs mount '{name}' needs the pool name as uuid"));
        }
    }

    for (name, remote) in &intent.remote_mounts {
        if remote.server.trim().is_empty() || remote.share.trim().is_empty() {
            return invalid(format!("remote mount '{name}' needs a server and a share"));
        }
    }

    for (name, share) in &intent.shares {
        if share.folder.is_absolute()
            || share
                .folder
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return invalid(format!(
                "share '{name}' folder must be relative and stay inside its mount"
            ));
        }
        if sanitize_name(name) != *name {
            return invalid(format!("share name '{name}' is not a valid link name"));
        }
    }

    for (name, netshare) in &intent.netshares {
        if netshare.recycle_max_age.is_some() && netshare.protocol != NetshareProtocol::Cifs {
            return invalid(format!(
                "netshare '{name}': recycle bin is only supported for cifs"
            ));
        }
    }

    Ok(())
}

fn invalid(message: String) -> Result<()> {
    Err(DynmountError::ConfigInvalid { message })
}
