//! Where configured entries live on disk.
//!
//! Mountpoints are resolved in a fixed order: the explicit `mountpoint` of
//! the entry, then the static mount table, then a generated path under
//! `mount_root`.

use crate::config::{Intent, MountSpec, RemoteMountSpec, Settings};
use crate::mount::Fstab;
use std::path::PathBuf;

pub fn mount_point(settings: &Settings, fstab: &Fstab, name: &str, spec: &MountSpec) -> PathBuf {
    if let Some(point) = &spec.mountpoint {
        return point.clone();
    }
    let by_table = spec
        .uuid
        .as_ref()
        .and_then(|u| fstab.find_for_source(&format!("UUID={u}")))
        .or_else(|| {
            spec.label
                .as_ref()
                .and_then(|l| fstab.find_for_source(&format!("LABEL={l}")))
        });
    by_table.map_or_else(|| settings.default_mountpoint(name), |e| e.target)
}

pub fn remote_mount_point(
    settings: &Settings,
    fstab: &Fstab,
    name: &str,
    spec: &RemoteMountSpec,
) -> PathBuf {
    if let Some(point) = &spec.mountpoint {
        return point.clone();
    }
    fstab
        .find_for_source(&spec.url())
        .map_or_else(|| settings.default_mountpoint(name), |e| e.target)
}

/// Mountpoint of a share source, local or remote.
pub fn source_point(
    settings: &Settings,
    fstab: &Fstab,
    intent: &Intent,
    source: &str,
) -> Option<PathBuf> {
    if let Some(spec) = intent.mount(source) {
        return Some(mount_point(settings, fstab, source, spec));
    }
    intent
        .remote_mount(source)
        .map(|spec| remote_mount_point(settings, fstab, source, spec))
}

/// The directory a share symlink points at.
pub fn share_target(
    settings: &Settings,
    fstab: &Fstab,
    intent: &Intent,
    share: &str,
) -> Option<PathBuf> {
    let spec = intent.share(share)?;
    let point = source_point(settings, fstab, intent, &spec.mount)?;
    if spec.folder.as_os_str().is_empty() {
        Some(point)
    } else {
        Some(point.join(&spec.folder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Method, RemoteFsType, ShareSpec};
    use tempfile::TempDir;

    #[test]
    fn test_mount_point_resolution_order() {
        let temp_dir = TempDir::new().unwrap();
        let table = temp_dir.path().join("fstab");
        std::fs::write(
            &table,
            "UUID=ABCD-1234 /mnt/usb-backup ext4 noauto 0 0\n//nas/media /mnt/nas-media cifs guest 0 0\n",
        )
        .unwrap();
        let fstab = Fstab::new(&table);
        let settings = Settings::default();

        let mut spec = MountSpec {
            uuid: Some("ABCD-1234".into()),
            method: Method::Dynmount,
            ..Default::default()
        };
        assert_eq!(
            mount_point(&settings, &fstab, "backup", &spec),
            PathBuf::from("/mnt/usb-backup")
        );

        spec.mountpoint = Some("/srv/backup".into());
        assert_eq!(
            mount_point(&settings, &fstab, "backup", &spec),
            PathBuf::from("/srv/backup")
        );

        spec.mountpoint = None;
        spec.uuid = Some("FFFF-0000".into());
        assert_eq!(
            mount_point(&settings, &fstab, "backup", &spec),
            PathBuf::from("/mnt/backup")
        );

        let remote = RemoteMountSpec {
            server: "nas".into(),
            share: "media".into(),
            fstype: RemoteFsType::Cifs,
            mountpoint: None,
            user: None,
            options: vec![],
            method: Method::Auto,
            credentials: false,
        };
        assert_eq!(
            remote_mount_point(&settings, &fstab, "movies", &remote),
            PathBuf::from("/mnt/nas-media")
        );
    }

    #[test]
    fn test_share_target_joins_folder() {
        let fstab = Fstab::new("/nonexistent/fstab");
        let settings = Settings::default();
        let mut intent = Intent::default();
        intent.mounts.insert(
            "backup".into(),
            MountSpec {
                uuid: Some("ABCD-1234".into()),
                ..Default::default()
            },
        );
        intent.shares.insert(
            "photos".into(),
            ShareSpec {
                mount: "backup".into(),
                folder: "pictures/2024".into(),
                enabled: true,
            },
        );
        intent.shares.insert(
            "orphan".into(),
            ShareSpec {
                mount: "gone".into(),
                folder: PathBuf::new(),
                enabled: true,
            },
        );

        assert_eq!(
            share_target(&settings, &fstab, &intent, "photos"),
            Some(PathBuf::from("/mnt/backup/pictures/2024"))
        );
        assert_eq!(share_target(&settings, &fstab, &intent, "orphan"), None);
        assert_eq!(share_target(&settings, &fstab, &intent, "missing"), None);
    }
}
