use super::types::MountEntry;
use crate::error::{DynmountError, Result};
use crate::platform::common::MOUNT_POINT_PERMISSIONS;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, warn};

/// Ensure a mount point directory exists with proper permissions
pub async fn ensure_mount_point(path: &Path) -> Result<()> {
    if !path.exists() {
        debug!("Creating mount point directory: {}", path.display());
        fs::create_dir_all(path).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(MOUNT_POINT_PERMISSIONS);
            fs::set_permissions(path, permissions).await?;
        }
    } else if !path.is_dir() {
        return Err(DynmountError::MountOperationFailed {
            message: format!("{} exists but is not a directory", path.display()),
        });
    }

    Ok(())
}

/// Clean up empty mount point directory after unmount
pub async fn cleanup_mount_point(path: &Path) -> Result<()> {
    if path.exists() && path.is_dir() {
        let mut entries = fs::read_dir(path).await?;
        if entries.next_entry().await?.is_none() {
            debug!("Removing empty mount point: {}", path.display());
            if let Err(e) = fs::remove_dir(path).await {
                warn!("Failed to remove mount point {}: {}", path.display(), e);
            }
        }
    }

    Ok(())
}

/// Refuse to mount over system directories
pub fn validate_mount_point(path: &Path) -> Result<()> {
    if !path.is_absolute() {
        return Err(DynmountError::MountOperationFailed {
            message: format!("Mount point must be absolute: {}", path.display()),
        });
    }

    let forbidden_roots = [
        "/bin", "/boot", "/dev", "/etc", "/lib", "/lib64", "/proc", "/sbin", "/sys", "/usr",
    ];
    let forbidden_exact = [
        "/", "/home", "/root", "/var", "/run", "/tmp", "/mnt", "/media", "/srv",
    ];

    let path_str = path.to_string_lossy();
    let trimmed = path_str.trim_end_matches('/');
    let trimmed = if trimmed.is_empty() { "/" } else { trimmed };

    if forbidden_exact.contains(&trimmed)
        || forbidden_roots
            .iter()
            .any(|root| trimmed == *root || trimmed.starts_with(&format!("{root}/")))
    {
        return Err(DynmountError::MountOperationFailed {
            message: format!("Cannot mount on system directory: {}", path.display()),
        });
    }
    Ok(())
}

/// Run a command, killing it if it outlives `timeout`.
pub async fn run_command(cmd: &mut Command, timeout: Duration) -> Result<Output> {
    let program = cmd.as_std().get_program().to_string_lossy().to_string();
    cmd.kill_on_drop(true);
    debug!("Running {:?}", cmd.as_std());

    tokio::time::timeout(timeout, cmd.output())
        .await
        .map_err(|_| DynmountError::CommandTimeout {
            command: program.clone(),
            timeout_secs: timeout.as_secs(),
        })?
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DynmountError::ToolNotFound { tool: program }
            } else {
                DynmountError::from(e)
            }
        })
}

/// Turn a failed command into a mount error carrying its stderr.
pub fn check_output(what: &str, output: &Output) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(DynmountError::MountOperationFailed {
        message: format!("{what} failed: {}", stderr.trim()),
    })
}

/// Parse fstab / `/proc/mounts` formatted content, skipping comments.
pub fn parse_table(content: &str) -> Vec<MountEntry> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 3 {
                return None;
            }
            Some(MountEntry {
                source: unescape(fields[0]),
                target: PathBuf::from(unescape(fields[1])),
                fstype: fields[2].to_string(),
                options: fields
                    .get(3)
                    .map(|o| o.split(',').map(str::to_string).collect())
                    .unwrap_or_default(),
            })
        })
        .collect()
}

/// Decode the octal escapes (`\040` for space) used in mount tables.
pub fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\'
            && i + 3 < bytes.len()
            && bytes[i + 1..i + 4].iter().all(|b| (b'0'..=b'7').contains(b))
        {
            let value = bytes[i + 1..i + 4]
                .iter()
                .fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
            // Out of byte range: keep the escape as written.
            if let Ok(byte) = u8::try_from(value) {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).to_string()
}

/// Lexical normalisation for comparing mountpoints. Never stats the path, a
/// dead network mount can block `stat` indefinitely.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
