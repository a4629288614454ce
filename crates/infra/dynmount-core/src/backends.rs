use crate::config::{Intent, Settings};
use crate::mount::{Fstab, MountPrimitives, SystemMounter};
use crate::platform::ToolSet;
use crate::probe::{DeviceProbe, HostProbe, SystemDeviceProbe, SystemHostProbe, SystemZfsProbe, ZfsProbe};
use std::sync::Arc;

/// The OS collaborators the core acts through.
#[derive(Clone)]
pub struct Backends {
    pub mounter: Arc<dyn MountPrimitives>,
    pub devices: Arc<dyn DeviceProbe>,
    pub zfs: Arc<dyn ZfsProbe>,
    pub hosts: Arc<dyn HostProbe>,
    pub fstab: Fstab,
    pub tools: ToolSet,
}

impl Backends {
    /// Real collaborators for this host.
    pub fn system(settings: &Settings, intent: &Intent) -> Self {
        Self {
            mounter: Arc::new(SystemMounter::new(settings.mount_timeout())),
            devices: Arc::new(SystemDeviceProbe::new(
                &settings.device_dir,
                &settings.label_dir,
            )),
            zfs: Arc::new(SystemZfsProbe),
            hosts: Arc::new(SystemHostProbe),
            fstab: Fstab::new(&settings.fstab),
            tools: ToolSet::detect(intent),
        }
    }
}
