//! Snapshot store for samples and resumable checkpoints
//!
//! A store is a directory holding one JSON file per snapshot plus a root
//! manifest (`root.json`) listing every step with its size and CRC32.
//!
//! # Write protocol
//!
//! 1. serialize the snapshot, write it to `<name>.json.tmp`, sync, rename
//! 2. write the updated manifest the same way
//! 3. only then delete the checkpoint it supersedes
//!
//! A crash or I/O error at any point leaves the previous manifest, and so
//! the previous latest checkpoint, intact. At most one checkpoint is
//! retained; sample snapshots accumulate.

use crate::config::SessionConfig;
use crate::model::ModelRecord;
use crate::noise::NoiseModel;
use crate::priors::PriorState;
use crate::result::PredictionResult;
use crate::tracing_support::record_snapshot_write;
use bptf_core::{BptfError, BptfResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Manifest file name inside a store directory
pub const ROOT_FILE: &str = "root.json";
/// Manifest format version
pub const FORMAT_VERSION: u32 = 1;

/// What a snapshot is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    /// Posterior sample kept for prediction
    Sample,
    /// Full sampler state for resuming
    Checkpoint,
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sample => write!(f, "sample"),
            Self::Checkpoint => write!(f, "checkpoint"),
        }
    }
}

/// Complete sampler state after one iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSnapshot {
    pub name: String,
    pub kind: SnapshotKind,
    /// Completed iterations
    pub iteration: usize,
    pub elapsed_secs: f64,
    pub model: ModelRecord,
    pub priors: Vec<PriorState>,
    pub noise: Vec<NoiseModel>,
    pub result: Option<PredictionResult>,
}

impl StepSnapshot {
    /// `sample-<n>` for the n-th posterior sample
    pub fn sample_name(sample: usize) -> String {
        format!("sample-{}", sample)
    }

    /// `checkpoint-<n>` after n completed iterations
    pub fn checkpoint_name(iteration: usize) -> String {
        format!("checkpoint-{}", iteration)
    }
}

/// Manifest entry of one stored snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepEntry {
    pub name: String,
    pub kind: SnapshotKind,
    pub iteration: usize,
    pub file: String,
    pub size_bytes: usize,
    pub checksum: u32,
}

impl StepEntry {
    /// Check stored bytes against the recorded size and checksum
    pub fn validate(&self, data: &[u8]) -> BptfResult<()> {
        if data.len() != self.size_bytes {
            return Err(BptfError::corrupt(
                &self.name,
                format!("expected {} bytes, found {}", self.size_bytes, data.len()),
            ));
        }
        let computed = crc32fast::hash(data);
        if computed != self.checksum {
            return Err(BptfError::corrupt(
                &self.name,
                format!(
                    "checksum mismatch: expected {:#010x}, got {:#010x}",
                    self.checksum, computed
                ),
            ));
        }
        Ok(())
    }
}

/// Contents of `root.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootManifest {
    pub version: u32,
    pub config: SessionConfig,
    pub steps: Vec<StepEntry>,
    pub latest_checkpoint: Option<String>,
}

impl RootManifest {
    fn new(config: SessionConfig) -> Self {
        Self {
            version: FORMAT_VERSION,
            config,
            steps: Vec::new(),
            latest_checkpoint: None,
        }
    }
}

/// Directory-backed snapshot store
#[derive(Debug)]
pub struct CheckpointStore {
    dir: PathBuf,
    manifest: RootManifest,
}

fn write_atomic(path: &Path, bytes: &[u8]) -> BptfResult<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    let ctx = |what: &str| format!("{} {}", what, tmp.display());

    let mut file = File::create(&tmp).map_err(|e| BptfError::io(ctx("creating"), e))?;
    file.write_all(bytes)
        .map_err(|e| BptfError::io(ctx("writing"), e))?;
    file.sync_all()
        .map_err(|e| BptfError::io(ctx("syncing"), e))?;
    fs::rename(&tmp, path)
        .map_err(|e| BptfError::io(format!("renaming {} into place", tmp.display()), e))
}

impl CheckpointStore {
    /// Open `dir`, creating it and an empty manifest when needed
    ///
    /// An existing manifest is kept as is; `config` only seeds new stores.
    pub fn open(dir: impl AsRef<Path>, config: &SessionConfig) -> BptfResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .map_err(|e| BptfError::io(format!("creating {}", dir.display()), e))?;
        if dir.join(ROOT_FILE).exists() {
            return Self::open_existing(dir);
        }
        let store = Self {
            dir,
            manifest: RootManifest::new(config.clone()),
        };
        store.write_manifest(&store.manifest)?;
        Ok(store)
    }

    /// Open a store that must already have a manifest
    pub fn open_existing(dir: impl AsRef<Path>) -> BptfResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        let path = dir.join(ROOT_FILE);
        let bytes =
            fs::read(&path).map_err(|e| BptfError::io(format!("reading {}", path.display()), e))?;
        let manifest: RootManifest = serde_json::from_slice(&bytes)?;
        if manifest.version != FORMAT_VERSION {
            return Err(BptfError::corrupt(
                ROOT_FILE,
                format!(
                    "unsupported format version {} (expected {})",
                    manifest.version, FORMAT_VERSION
                ),
            ));
        }
        debug!(dir = %dir.display(), steps = manifest.steps.len(), "opened checkpoint store");
        Ok(Self { dir, manifest })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest(&self) -> &RootManifest {
        &self.manifest
    }

    pub fn config(&self) -> &SessionConfig {
        &self.manifest.config
    }

    /// Record the configuration a session actually runs with
    pub fn set_config(&mut self, config: &SessionConfig) -> BptfResult<()> {
        let mut next = self.manifest.clone();
        next.config = config.clone();
        self.write_manifest(&next)?;
        self.manifest = next;
        Ok(())
    }

    fn write_manifest(&self, manifest: &RootManifest) -> BptfResult<()> {
        let bytes = serde_json::to_vec_pretty(manifest)?;
        write_atomic(&self.dir.join(ROOT_FILE), &bytes)
    }

    /// Persist a snapshot following the write protocol
    pub fn write(&mut self, snapshot: &StepSnapshot) -> BptfResult<()> {
        let started = Instant::now();
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        let file = format!("{}.json", snapshot.name);
        write_atomic(&self.dir.join(&file), &bytes)?;
        record_snapshot_write(
            snapshot.kind,
            snapshot.iteration,
            &file,
            bytes.len(),
            started.elapsed(),
        );

        let entry = StepEntry {
            name: snapshot.name.clone(),
            kind: snapshot.kind,
            iteration: snapshot.iteration,
            file,
            size_bytes: bytes.len(),
            checksum: crc32fast::hash(&bytes),
        };
        let mut next = self.manifest.clone();
        next.steps.retain(|s| s.name != snapshot.name);
        let mut superseded = None;
        if snapshot.kind == SnapshotKind::Checkpoint {
            if let Some(old) = next.latest_checkpoint.replace(snapshot.name.clone()) {
                if old != snapshot.name {
                    if let Some(pos) = next.steps.iter().position(|s| s.name == old) {
                        superseded = Some(next.steps.remove(pos));
                    }
                }
            }
        }
        next.steps.push(entry);
        self.write_manifest(&next)?;
        self.manifest = next;
        info!(name = %snapshot.name, kind = %snapshot.kind, bytes = bytes.len(), "snapshot written");

        if let Some(old) = superseded {
            let path = self.dir.join(&old.file);
            if let Err(e) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "could not remove superseded checkpoint");
            }
        }
        Ok(())
    }

    fn entry(&self, name: &str) -> BptfResult<&StepEntry> {
        self.manifest
            .steps
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| BptfError::corrupt(name, "not listed in the root manifest"))
    }

    /// Read and verify one snapshot
    pub fn read(&self, name: &str) -> BptfResult<StepSnapshot> {
        let entry = self.entry(name)?;
        let path = self.dir.join(&entry.file);
        let bytes =
            fs::read(&path).map_err(|e| BptfError::io(format!("reading {}", path.display()), e))?;
        entry.validate(&bytes)?;
        let snapshot: StepSnapshot = serde_json::from_slice(&bytes)?;
        if snapshot.name != entry.name || snapshot.iteration != entry.iteration {
            return Err(BptfError::corrupt(
                name,
                format!(
                    "file holds '{}' at iteration {}",
                    snapshot.name, snapshot.iteration
                ),
            ));
        }
        Ok(snapshot)
    }

    pub fn latest_checkpoint(&self) -> Option<&StepEntry> {
        let name = self.manifest.latest_checkpoint.as_deref()?;
        self.manifest.steps.iter().find(|s| s.name == name)
    }

    pub fn load_latest_checkpoint(&self) -> BptfResult<Option<StepSnapshot>> {
        match self.latest_checkpoint() {
            Some(entry) => self.read(&entry.name).map(Some),
            None => Ok(None),
        }
    }

    /// Sample entries in the order they were written
    pub fn samples(&self) -> impl Iterator<Item = &StepEntry> {
        self.manifest
            .steps
            .iter()
            .filter(|s| s.kind == SnapshotKind::Sample)
    }

    pub fn read_samples(&self) -> BptfResult<Vec<StepSnapshot>> {
        self.samples().map(|s| self.read(&s.name)).collect()
    }
}
