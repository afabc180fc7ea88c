//! Shared temp directory layout and in-flight job tracking.
//!
//! ```text
//! <root>/<original_filename>          inbound upload, written by intake
//! <root>/<job_id>/<original_filename> input, moved here when processing starts
//! <root>/<job_id>/<cleaned_filename>  converted output
//! ```

use std::collections::HashSet;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
pub struct TempWorkspace {
    root: PathBuf,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl TempWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the root directory if absent.
    pub fn ensure_root(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.root)
    }

    /// Location of an inbound upload. `None` unless `filename` is a single
    /// plain path component.
    pub fn inbound_path(&self, filename: &str) -> Option<PathBuf> {
        let mut components = Path::new(filename).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Some(self.root.join(filename)),
            _ => None,
        }
    }

    /// Per-job work directory.
    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.root.join(job_id)
    }

    /// Marks a job as in flight until the returned guard is dropped.
    pub fn begin(&self, job_id: &str) -> InFlightGuard {
        self.registry().insert(job_id.to_string());
        InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            job_id: job_id.to_string(),
        }
    }

    pub fn is_in_flight(&self, job_id: &str) -> bool {
        self.registry().contains(job_id)
    }

    fn registry(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set holds plain strings, so a poisoned lock is still consistent.
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Unregisters the job when dropped, including on early return or panic.
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
    job_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.job_id);
    }
}
