//! Run Store: a durable, per-run append-only log of steps. One JSON file
//! per run under `DATA_DIR/runs/<runId>.json`, written via the same
//! write-to-temp-then-rename convention the registry's embedding index and
//! the config loader use, so a crash mid-write never leaves a half-written
//! run file.

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::debug;

use crate::clock::new_id;
use crate::error::{Error, Result};
use crate::types::{Run, RunStatus, Step};

pub struct RunStore {
    dir: PathBuf,
    /// Single-writer-per-run guard (§3: "the store is single-writer per
    /// run"); this crate additionally serializes all writers through one
    /// mutex, which is stricter than required but race-free and cheap at
    /// this scale.
    write_lock: Mutex<()>,
}

impl RunStore {
    pub fn new(data_dir: &Path) -> Self {
        RunStore {
            dir: data_dir.join("runs"),
            write_lock: Mutex::new(()),
        }
    }

    fn path_for(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{run_id}.json"))
    }

    /// Create a brand-new run with a fresh id and persist it immediately.
    pub async fn create(&self, task: &str) -> Result<Run> {
        let run = Run::new(new_id(), task.to_string());
        self.save(&run).await?;
        Ok(run)
    }

    /// Load a run by id. Returns `StoreIoError` if the file is missing or
    /// malformed — the caller treats this as fatal to the requested run,
    /// not the process.
    pub async fn load(&self, run_id: &str) -> Result<Run> {
        let path = self.path_for(run_id);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| Error::StoreIoError(format!("reading run {run_id}: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| Error::StoreIoError(format!("parsing run {run_id}: {e}")))
    }

    /// Append a step to `run` and persist immediately. After this returns,
    /// the step is durable and `run.updated_at` reflects the append.
    pub async fn append_step(&self, run: &mut Run, step: Step) -> Result<()> {
        run.append_step(step);
        self.save(run).await
    }

    /// Persist `run` via write-to-temp-then-rename.
    pub async fn save(&self, run: &Run) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::StoreIoError(format!("creating run directory: {e}")))?;

        let path = self.path_for(&run.run_id);
        let tmp_path = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(run)
            .map_err(|e| Error::StoreIoError(format!("serializing run {}: {e}", run.run_id)))?;

        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(|e| Error::StoreIoError(format!("writing run {}: {e}", run.run_id)))?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| Error::StoreIoError(format!("renaming run {}: {e}", run.run_id)))?;

        debug!(run_id = %run.run_id, steps = run.steps.len(), status = ?run.status, "run persisted");
        Ok(())
    }

    /// Whether a run's status allows it to be resumed.
    pub fn is_resumable(status: RunStatus) -> bool {
        matches!(status, RunStatus::Running | RunStatus::Paused)
    }
}
