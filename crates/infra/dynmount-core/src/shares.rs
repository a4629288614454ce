//! Share symlinks under the shares root.

use crate::error::{DynmountError, Result};
use std::path::Path;
use tracing::{debug, info};

/// True when `link` is a symlink pointing exactly at `target`.
pub async fn is_linked(link: &Path, target: &Path) -> bool {
    tokio::fs::read_link(link).await.is_ok_and(|t| t == target)
}

/// True when anything symlink-shaped sits at `link`, dangling or not.
pub async fn link_exists(link: &Path) -> bool {
    tokio::fs::symlink_metadata(link)
        .await
        .is_ok_and(|m| m.file_type().is_symlink())
}

/// Point `link` at `target`, replacing a stale symlink.
pub async fn link(link: &Path, target: &Path) -> Result<()> {
    if is_linked(link, target).await {
        debug!("Share link {} already in place", link.display());
        return Ok(());
    }
    match tokio::fs::symlink_metadata(link).await {
        Ok(meta) if meta.file_type().is_symlink() => tokio::fs::remove_file(link).await?,
        Ok(_) => {
            return Err(DynmountError::MountOperationFailed {
                message: format!("{} exists and is not a symlink", link.display()),
            });
        }
        Err(_) => {}
    }
    if let Some(parent) = link.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::symlink(target, link).await?;
    info!("Linked {} -> {}", link.display(), target.display());
    Ok(())
}

/// Remove the symlink at `link`. Returns whether one was removed.
pub async fn unlink(link: &Path) -> Result<bool> {
    if !link_exists(link).await {
        return Ok(false);
    }
    tokio::fs::remove_file(link).await?;
    info!("Unlinked {}", link.display());
    Ok(true)
}
