use super::Core;
use crate::error::{DynmountError, Result};
use crate::paths;
use crate::shares;
use std::path::PathBuf;
use tracing::warn;

impl Core {
    pub fn share_target(&self, share: &str) -> Option<PathBuf> {
        paths::share_target(self.settings(), &self.backends.fstab, self.intent(), share)
    }

    /// Create or repair the symlink of a share.
    pub async fn link_share(&self, share: &str) -> Result<PathBuf> {
        let target = self
            .share_target(share)
            .ok_or_else(|| DynmountError::ConfigInvalid {
                message: format!("Share {share} has no configured source"),
            })?;
        if !tokio::fs::try_exists(&target).await.unwrap_or(false) {
            return Err(DynmountError::MountOperationFailed {
                message: format!("Source {} of share {share} does not exist", target.display()),
            });
        }
        let link = self.settings().share_link(share);
        shares::link(&link, &target).await?;
        Ok(link)
    }

    pub async fn unlink_share(&self, share: &str) -> Result<bool> {
        shares::unlink(&self.settings().share_link(share)).await
    }

    /// Re-link every enabled share sourced by `mount`.
    pub async fn relink_shares_for(&self, mount: &str) {
        let enabled: Vec<String> = self
            .intent()
            .shares_sourced_by(mount)
            .filter(|(_, s)| s.enabled)
            .map(|(name, _)| name.clone())
            .collect();
        for share in enabled {
            if let Err(e) = self.link_share(&share).await {
                warn!("Cannot link share {}: {}", share, e);
            }
        }
    }
}
