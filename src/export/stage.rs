//! All-or-nothing publication of output artifacts.
//!
//! Artifacts are written into a hidden staging directory inside the output
//! root. Nothing under the root changes until [`StagedOutput::commit`] swaps
//! each staged top-level artifact into place. An uncommitted stage is removed
//! when dropped.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::ExportError;

const STAGING_PREFIX: &str = ".staging-";
const PREVIOUS_DIR: &str = ".previous";

pub struct StagedOutput {
    root: PathBuf,
    stage: TempDir,
    artifacts: Mutex<BTreeSet<PathBuf>>,
}

impl StagedOutput {
    /// Create a stage under `root`, creating `root` if needed.
    pub fn new(root: &Path) -> Result<Self, ExportError> {
        fs::create_dir_all(root).map_err(|e| ExportError::io(root, e))?;
        let stage = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(root)
            .map_err(|e| ExportError::io(root, e))?;
        debug!("Staging output in {}", stage.path().display());

        Ok(Self {
            root: root.to_path_buf(),
            stage,
            artifacts: Mutex::new(BTreeSet::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn top_level(relative: &Path) -> Result<PathBuf, ExportError> {
        let mut components = relative.components();
        match components.next() {
            Some(Component::Normal(first)) => {
                if relative
                    .components()
                    .all(|c| matches!(c, Component::Normal(_)))
                {
                    Ok(PathBuf::from(first))
                } else {
                    Err(ExportError::InvalidPath(relative.to_path_buf()))
                }
            }
            _ => Err(ExportError::InvalidPath(relative.to_path_buf())),
        }
    }

    fn register(&self, relative: &Path) -> Result<PathBuf, ExportError> {
        let top = Self::top_level(relative)?;
        let mut artifacts = self
            .artifacts
            .lock()
            .map_err(|_| ExportError::Poisoned)?;
        artifacts.insert(top);
        Ok(self.stage.path().join(relative))
    }

    /// Stage an (initially empty) directory artifact.
    pub fn create_dir(&self, relative: &Path) -> Result<PathBuf, ExportError> {
        let path = self.register(relative)?;
        fs::create_dir_all(&path).map_err(|e| ExportError::io(&path, e))?;
        Ok(path)
    }

    /// Stage a pretty-printed JSON document at `relative`.
    pub fn write_json<T: Serialize + ?Sized>(
        &self,
        relative: &Path,
        document: &T,
    ) -> Result<PathBuf, ExportError> {
        let path = self.register(relative)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ExportError::io(parent, e))?;
        }

        let file = File::create(&path).map_err(|e| ExportError::io(&path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, document).map_err(|source| {
            ExportError::Json {
                path: path.clone(),
                source,
            }
        })?;
        writer.flush().map_err(|e| ExportError::io(&path, e))?;
        Ok(path)
    }

    /// Staged top-level artifacts, relative to the root.
    pub fn artifacts(&self) -> Result<Vec<PathBuf>, ExportError> {
        let artifacts = self
            .artifacts
            .lock()
            .map_err(|_| ExportError::Poisoned)?;
        Ok(artifacts.iter().cloned().collect())
    }

    /// Replace every staged artifact under the root and return their final paths.
    ///
    /// Previous versions are moved into the stage first and removed with it.
    /// If any swap fails, the swaps already made are undone and the root is
    /// left as it was.
    pub fn commit(self) -> Result<Vec<PathBuf>, ExportError> {
        let artifacts = self.artifacts()?;
        let previous = self.stage.path().join(PREVIOUS_DIR);
        fs::create_dir_all(&previous).map_err(|e| ExportError::io(&previous, e))?;

        let mut swaps = Vec::with_capacity(artifacts.len());
        for artifact in &artifacts {
            if let Err(e) = self.swap(artifact, &previous, &mut swaps) {
                if !roll_back(&swaps) {
                    // Old versions still sit in the stage; keep it on disk.
                    let kept = self.stage.keep();
                    warn!("Rollback incomplete, previous output kept in {}", kept.display());
                }
                return Err(e);
            }
        }

        let published: Vec<PathBuf> = swaps.into_iter().map(|swap| swap.target).collect();
        info!(
            "Published {} artifacts to {}",
            published.len(),
            self.root.display()
        );
        Ok(published)
    }

    fn swap(
        &self,
        artifact: &Path,
        previous: &Path,
        swaps: &mut Vec<Swap>,
    ) -> Result<(), ExportError> {
        let staged = self.stage.path().join(artifact);
        let target = self.root.join(artifact);

        let aside = if target.exists() {
            let aside = previous.join(artifact);
            fs::rename(&target, &aside).map_err(|e| ExportError::io(&target, e))?;
            Some(aside)
        } else {
            None
        };
        swaps.push(Swap {
            target: target.clone(),
            aside,
            published: false,
        });

        fs::rename(&staged, &target).map_err(|e| ExportError::io(&target, e))?;
        if let Some(swap) = swaps.last_mut() {
            swap.published = true;
        }
        Ok(())
    }
}

/// One artifact moved during a commit.
struct Swap {
    target: PathBuf,
    /// Where the previous version was moved, if there was one
    aside: Option<PathBuf>,
    published: bool,
}

/// Undo `swaps` newest first. Returns false if anything could not be restored.
fn roll_back(swaps: &[Swap]) -> bool {
    let mut clean = true;
    for swap in swaps.iter().rev() {
        if swap.published {
            let removed = if swap.target.is_dir() {
                fs::remove_dir_all(&swap.target)
            } else {
                fs::remove_file(&swap.target)
            };
            if let Err(e) = removed {
                warn!("Failed to remove {}: {}", swap.target.display(), e);
                clean = false;
                continue;
            }
        }
        if let Some(aside) = &swap.aside {
            if let Err(e) = fs::rename(aside, &swap.target) {
                warn!("Failed to restore {}: {}", swap.target.display(), e);
                clean = false;
            }
        }
    }
    clean
}
