use super::manager::MountPrimitives;
use super::types::UnmountFlags;
use crate::error::{DynmountError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Recorded call on the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountCall {
    Mount(PathBuf),
    MountTemp { source: String, point: PathBuf },
    Unmount { point: PathBuf, flags: UnmountFlags },
}

/// Mock mount primitives for testing
#[derive(Clone, Default)]
pub struct MockMounter {
    /// mountpoint -> source
    mounts: Arc<Mutex<HashMap<PathBuf, String>>>,
    should_fail: Arc<Mutex<bool>>,
    calls: Arc<Mutex<Vec<MountCall>>>,
}

impl MockMounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_should_fail(&self, fail: bool) {
        *self.should_fail.lock().unwrap() = fail;
    }

    /// Pretend something else already mounted `point`.
    pub fn preset_mounted(&self, point: impl Into<PathBuf>) {
        self.mounts
            .lock()
            .unwrap()
            .insert(point.into(), "preset".to_string());
    }

    pub fn mounted(&self, point: &Path) -> bool {
        self.mounts.lock().unwrap().contains_key(point)
    }

    pub fn calls(&self) -> Vec<MountCall> {
        self.calls.lock().unwrap().clone()
    }

    fn fail_if_requested(&self, what: &str) -> Result<()> {
        if *self.should_fail.lock().unwrap() {
            return Err(DynmountError::MountOperationFailed {
                message: format!("Mock {what} failed"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MountPrimitives for MockMounter {
    async fn mount(&self, point: &Path) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(MountCall::Mount(point.to_path_buf()));
        self.fail_if_requested("mount")?;
        self.mounts
            .lock()
            .unwrap()
            .entry(point.to_path_buf())
            .or_insert_with(|| "fstab".to_string());
        Ok(())
    }

    async fn mount_temp(
        &self,
        source: &str,
        point: &Path,
        _fstype: &str,
        _options: &[String],
    ) -> Result<()> {
        self.calls.lock().unwrap().push(MountCall::MountTemp {
            source: source.to_string(),
            point: point.to_path_buf(),
        });
        self.fail_if_requested("mount")?;
        self.mounts
            .lock()
            .unwrap()
            .entry(point.to_path_buf())
            .or_insert_with(|| source.to_string());
        Ok(())
    }

    async fn unmount(&self, point: &Path, flags: UnmountFlags) -> Result<()> {
        self.calls.lock().unwrap().push(MountCall::Unmount {
            point: point.to_path_buf(),
            flags,
        });
        self.fail_if_requested("unmount")?;
        self.mounts.lock().unwrap().remove(point);
        Ok(())
    }

    async fn is_mounted(&self, point: &Path) -> Result<bool> {
        Ok(self.mounted(point))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_mounter() {
        let mounter = MockMounter::new();
        let point = Path::new("/mnt/backup");

        assert!(!mounter.is_mounted(point).await.unwrap());

        mounter
            .mount_temp("/dev/sdb1", point, "ext4", &[])
            .await
            .unwrap();
        assert!(mounter.is_mounted(point).await.unwrap());

        // Second mount is a no-op success
        mounter.mount(point).await.unwrap();
        assert!(mounter.is_mounted(point).await.unwrap());

        mounter.unmount(point, UnmountFlags::default()).await.unwrap();
        assert!(!mounter.is_mounted(point).await.unwrap());

        mounter.set_should_fail(true);
        assert!(mounter.mount(point).await.is_err());
        assert_eq!(mounter.calls().len(), 4);
    }
}
