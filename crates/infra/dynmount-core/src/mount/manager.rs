use super::types::UnmountFlags;
use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// OS mount primitives. Implementations must be idempotent: mounting an
/// already-mounted target and unmounting an unmounted one both succeed.
#[async_trait]
pub trait MountPrimitives: Send + Sync {
    /// Mount a target listed in the static mount table.
    async fn mount(&self, point: &Path) -> Result<()>;

    /// Mount an explicit source at `point`, independent of the static table.
    async fn mount_temp(
        &self,
        source: &str,
        point: &Path,
        fstype: &str,
        options: &[String],
    ) -> Result<()>;

    async fn unmount(&self, point: &Path, flags: UnmountFlags) -> Result<()>;

    async fn is_mounted(&self, point: &Path) -> Result<bool>;
}
