use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use super::manager::MountPrimitives;
use super::types::{MountEntry, UnmountFlags};
use super::utils;
use crate::error::Result;
use crate::platform::linux::PROC_MOUNTS;

/// Mount primitives backed by `mount(8)` / `umount(8)`.
pub struct SystemMounter {
    timeout: Duration,
    proc_mounts: PathBuf,
}

impl SystemMounter {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            proc_mounts: PathBuf::from(PROC_MOUNTS),
        }
    }

    /// Read mounts from a different table, for tests.
    pub fn with_proc_mounts(mut self, path: impl Into<PathBuf>) -> Self {
        self.proc_mounts = path.into();
        self
    }

    /// Currently active mounts.
    pub async fn list_mounts(&self) -> Result<Vec<MountEntry>> {
        let content = tokio::fs::read_to_string(&self.proc_mounts).await?;
        Ok(utils::parse_table(&content))
    }

    fn build_mount_args(
        source: &str,
        point: &Path,
        fstype: &str,
        options: &[String],
    ) -> Vec<String> {
        let mut args = Vec::new();
        if !fstype.is_empty() && fstype != "auto" {
            args.push("-t".to_string());
            args.push(fstype.to_string());
        }
        if !options.is_empty() {
            args.push("-o".to_string());
            args.push(options.join(","));
        }
        args.push(source.to_string());
        args.push(point.display().to_string());
        args
    }
}

#[async_trait]
impl MountPrimitives for SystemMounter {
    async fn mount(&self, point: &Path) -> Result<()> {
        if self.is_mounted(point).await? {
            debug!("Target is already mounted: {}", point.display());
            return Ok(());
        }
        utils::ensure_mount_point(point).await?;

        info!("Mounting {}", point.display());
        let mut cmd = Command::new("mount");
        cmd.arg(point);
        let output = utils::run_command(&mut cmd, self.timeout).await?;
        utils::check_output("mount", &output)
    }

    async fn mount_temp(
        &self,
        source: &str,
        point: &Path,
        fstype: &str,
        options: &[String],
    ) -> Result<()> {
        utils::validate_mount_point(point)?;
        if self.is_mounted(point).await? {
            debug!("Target is already mounted: {}", point.display());
            return Ok(());
        }
        utils::ensure_mount_point(point).await?;

        let args = Self::build_mount_args(source, point, fstype, options);
        info!("Mounting {} on {}", source, point.display());
        debug!("Mount command: mount {}", args.join(" "));

        let mut cmd = Command::new("mount");
        cmd.args(&args);
        let output = utils::run_command(&mut cmd, self.timeout).await?;
        utils::check_output("mount", &output)
    }

    async fn unmount(&self, point: &Path, flags: UnmountFlags) -> Result<()> {
        if !self.is_mounted(point).await? {
            debug!("Target is not mounted: {}", point.display());
            return Ok(());
        }

        info!("Unmounting {}", point.display());
        let mut cmd = Command::new("umount");
        if flags.force {
            cmd.arg("-f").arg("-l");
        }
        cmd.arg(point);
        let output = utils::run_command(&mut cmd, self.timeout).await?;
        utils::check_output("umount", &output)?;

        if !flags.internal {
            utils::cleanup_mount_point(point).await?;
        }
        Ok(())
    }

    async fn is_mounted(&self, point: &Path) -> Result<bool> {
        let target = utils::normalize(point);
        let mounts = self.list_mounts().await?;
        Ok(mounts.iter().any(|m| utils::normalize(&m.target) == target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_build_mount_args() {
        let args = SystemMounter::build_mount_args(
            "//nas/media",
            Path::new("/mnt/media"),
            "cifs",
            &["guest".to_string(), "_netdev".to_string()],
        );
        assert_eq!(
            args,
            vec!["-t", "cifs", "-o", "guest,_netdev", "//nas/media", "/mnt/media"]
        );

        let args = SystemMounter::build_mount_args(
            "/dev/sdb1",
            Path::new("/mnt/backup"),
            "auto",
            &[],
        );
        assert_eq!(args, vec!["/dev/sdb1", "/mnt/backup"]);
    }

    #[tokio::test]
    async fn test_is_mounted_reads_table() {
        let temp_dir = TempDir::new().unwrap();
        let table = temp_dir.path().join("mounts");
        std::fs::write(
            &table,
            "/dev/sdb1 /mnt/backup ext4 rw,relatime 0 0\n//nas/media /mnt/My\\040Media cifs rw 0 0\n",
        )
        .unwrap();
        let mounter = SystemMounter::new(Duration::from_secs(1)).with_proc_mounts(&table);

        assert!(mounter.is_mounted(Path::new("/mnt/backup/")).await.unwrap());
        assert!(mounter.is_mounted(Path::new("/mnt/My Media")).await.unwrap());
        assert!(!mounter.is_mounted(Path::new("/mnt/other")).await.unwrap());
    }

    #[tokio::test]
    async fn test_unmount_of_unmounted_target_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let table = temp_dir.path().join("mounts");
        std::fs::write(&table, "").unwrap();
        let mounter = SystemMounter::new(Duration::from_secs(1)).with_proc_mounts(&table);

        mounter
            .unmount(Path::new("/mnt/backup"), UnmountFlags::forced_internal())
            .await
            .unwrap();
    }
}
