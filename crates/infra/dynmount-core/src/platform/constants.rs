/// Platform-specific constants for mount operations

pub mod linux {
    /// Path to check for active mounts
    pub const PROC_MOUNTS: &str = "/proc/mounts";

    /// Tools the daemon shells out to
    pub const CORE_TOOLS: &[&str] = &["mount", "umount", "blkid", "ping"];

    /// Tools only needed when ZFS pools are configured
    pub const ZFS_TOOLS: &[&str] = &["zpool", "zfs"];
}

/// Common constants across platforms
pub mod common {
    use std::time::Duration;

    /// Default permissions for mount point directories
    pub const MOUNT_POINT_PERMISSIONS: u32 = 0o755;

    /// Timeout for read-only probe commands (blkid, zpool, zfs)
    pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Bounded wait when joining background tasks on shutdown
    pub const SHUTDOWN_JOIN_TIMEOUT: Duration = Duration::from_secs(5);
}
