//! Scratch directories tracked in a process-wide registry.
//!
//! Every run allocates its scratch space through [`ScratchDir`], which removes
//! the directory when dropped. The registry exists for abnormal termination:
//! an interrupt handler can sweep whatever is still registered before the
//! process exits.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::pipeline::CancelFlag;

fn registry() -> &'static Mutex<HashSet<PathBuf>> {
    static REGISTRY: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashSet::new()))
}

fn register(path: &Path) {
    if let Ok(mut set) = registry().lock() {
        set.insert(path.to_path_buf());
    }
}

fn deregister(path: &Path) {
    if let Ok(mut set) = registry().lock() {
        set.remove(path);
    }
}

/// Paths currently registered, sorted.
#[cfg(test)]
fn registered() -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = registry()
        .lock()
        .map(|set| set.iter().cloned().collect())
        .unwrap_or_default();
    paths.sort();
    paths
}

/// Removes every registered directory. Returns how many were removed.
pub fn sweep_registered() -> usize {
    let paths: Vec<PathBuf> = match registry().lock() {
        Ok(mut set) => set.drain().collect(),
        Err(_) => return 0,
    };

    let mut removed = 0;
    for path in paths {
        match std::fs::remove_dir_all(&path) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to sweep scratch directory"),
        }
    }
    removed
}

/// A registered temporary directory, removed on drop.
#[derive(Debug)]
pub struct ScratchDir {
    inner: TempDir,
}

impl ScratchDir {
    pub fn new(prefix: &str) -> Result<Self, StorageError> {
        let inner = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir()
            .map_err(|e| StorageError::TempDir {
                prefix: prefix.to_string(),
                source: e,
            })?;
        register(inner.path());
        debug!(path = %inner.path().display(), "Created scratch directory");
        Ok(Self { inner })
    }

    pub fn path(&self) -> &Path {
        self.inner.path()
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        deregister(self.inner.path());
    }
}

/// Installs a Ctrl-C handler. The first interrupt requests cooperative
/// cancellation; a second one sweeps the registry and exits with status 130.
pub fn install_interrupt_handler(cancel: CancelFlag) -> Result<(), ctrlc::Error> {
    let hits = AtomicUsize::new(0);
    ctrlc::set_handler(move || {
        if hits.fetch_add(1, Ordering::SeqCst) == 0 {
            warn!("Interrupt received, cancelling after the current group");
            cancel.cancel();
        } else {
            let removed = sweep_registered();
            warn!(removed, "Second interrupt received, exiting");
            std::process::exit(130);
        }
    })
}
