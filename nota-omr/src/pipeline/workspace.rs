//! Per-job scratch workspace
//!
//! Each job owns one directory tree under the temp storage root. Nothing is
//! shared between jobs, and the tree is removed when the workspace is
//! dropped, whichever way the job ended.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

/// Exclusively-owned scratch directory for one job
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    /// Where the job's input file is staged
    pub input_path: PathBuf,
    /// Where the recognition engine writes its output
    pub output_dir: PathBuf,
}

impl Workspace {
    /// Create the directory tree for one job
    pub fn create(temp_root: &Path, job_id: Uuid, input_ext: &str) -> std::io::Result<Self> {
        let root = temp_root.join(job_id.to_string());
        let output_dir = root.join("out");
        std::fs::create_dir_all(&output_dir)?;

        let input_path = root.join(format!("input.{}", input_ext));

        debug!("Created workspace {}", root.display());

        Ok(Self {
            root,
            input_path,
            output_dir,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.root.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.root) {
                warn!("Failed to tear down workspace {}: {}", self.root.display(), e);
            } else {
                debug!("Tore down workspace {}", self.root.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_builds_the_expected_tree() {
        let temp = tempfile::tempdir().unwrap();
        let id = Uuid::new_v4();

        let ws = Workspace::create(temp.path(), id, "pdf").unwrap();
        assert!(ws.root().exists());
        assert!(ws.output_dir.exists());
        assert_eq!(ws.input_path.file_name().unwrap(), "input.pdf");
        assert!(ws.root().starts_with(temp.path()));
    }

    #[test]
    fn drop_removes_the_tree() {
        let temp = tempfile::tempdir().unwrap();
        let id = Uuid::new_v4();

        let root = {
            let ws = Workspace::create(temp.path(), id, "png").unwrap();
            std::fs::write(&ws.input_path, b"data").unwrap();
            std::fs::write(ws.output_dir.join("stray.mxl"), b"data").unwrap();
            ws.root().to_path_buf()
        };

        assert!(!root.exists());
    }

    #[test]
    fn two_jobs_never_share_a_workspace() {
        let temp = tempfile::tempdir().unwrap();
        let a = Workspace::create(temp.path(), Uuid::new_v4(), "pdf").unwrap();
        let b = Workspace::create(temp.path(), Uuid::new_v4(), "pdf").unwrap();
        assert_ne!(a.root(), b.root());
    }
}
