use crate::error::Result;
use crate::registry::DynMountState;
use atomicwrites::{AllowOverwrite, AtomicFile};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// JSON snapshot of the registry for external status queries.
///
/// Written only when the directory is writable; unprivileged runs skip it
/// silently.
#[derive(Debug, Clone)]
pub struct RunFile {
    path: PathBuf,
}

impl RunFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writable(&self) -> bool {
        let dir = match self.path.parent() {
            Some(d) if !d.as_os_str().is_empty() => d,
            _ => Path::new("."),
        };
        #[cfg(unix)]
        {
            nix::unistd::access(dir, nix::unistd::AccessFlags::W_OK).is_ok()
        }
        #[cfg(not(unix))]
        {
            dir.is_dir()
        }
    }

    /// Rewrite the file. Returns `false` when skipped for lack of access.
    pub fn write(&self, states: &[DynMountState]) -> Result<bool> {
        if !self.writable() {
            debug!("Run file {} not writable, skipping", self.path.display());
            return Ok(false);
        }
        let json = serde_json::to_string_pretty(states)?;
        AtomicFile::new(&self.path, AllowOverwrite)
            .write(|f| f.write_all(json.as_bytes()))
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        Ok(true)
    }

    pub fn remove(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Read a run file written by a running daemon. `None` if absent.
    pub fn read(path: &Path) -> Result<Option<Vec<DynMountState>>> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write every registry snapshot until cancelled. Runs outside the core lock.
    pub fn spawn_writer(
        self,
        mut snapshots: watch::Receiver<Vec<DynMountState>>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let states = snapshots.borrow_and_update().clone();
                if let Err(e) = self.write(&states) {
                    warn!("Failed to write run file {}: {}", self.path.display(), e);
                }
                tokio::select! {
                    () = cancel.cancelled() => break,
                    changed = snapshots.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        })
    }
}
