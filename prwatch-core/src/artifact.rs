//! Staged artifact writes.
//!
//! Rendered outputs are written to temp files next to their destinations and
//! only renamed into place by [`ArtifactSet::commit`], once every renderer
//! has succeeded. A failed render therefore leaves the previously published
//! artifacts untouched.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::error::Result;
use crate::store::{match_target_permissions, parent_dir};

struct StagedArtifact {
    target: PathBuf,
    temp: NamedTempFile,
}

/// Artifacts rendered in memory or to temp files, waiting to be committed.
#[derive(Default)]
pub struct ArtifactSet {
    staged: Vec<StagedArtifact>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Stage raw bytes for `target`.
    pub fn stage_bytes(&mut self, target: &Path, bytes: &[u8]) -> Result<()> {
        let mut temp = temp_file_for(target)?;
        temp.write_all(bytes)?;
        temp.as_file().sync_all()?;
        self.staged.push(StagedArtifact {
            target: target.to_path_buf(),
            temp,
        });
        Ok(())
    }

    /// Stage a file produced by a renderer that writes to a path.
    ///
    /// The temp path keeps `target`'s extension so format detection by
    /// extension still works.
    pub fn stage_with<F>(&mut self, target: &Path, render: F) -> Result<()>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        let temp = temp_file_for(target)?;
        render(temp.path())?;
        self.staged.push(StagedArtifact {
            target: target.to_path_buf(),
            temp,
        });
        Ok(())
    }

    /// Move every staged artifact into place.
    ///
    /// Artifacts identical to what is already on disk are discarded so their
    /// timestamps do not change. Returns the paths whose content changed.
    pub fn commit(self) -> Result<Vec<PathBuf>> {
        let mut changed = Vec::new();
        for artifact in self.staged {
            let before = file_digest(&artifact.target)?;
            let after = file_digest(artifact.temp.path())?;
            if before == after {
                tracing::debug!(path = %artifact.target.display(), "Artifact unchanged");
                continue;
            }
            match_target_permissions(artifact.temp.as_file(), &artifact.target)?;
            artifact
                .temp
                .persist(&artifact.target)
                .map_err(|e| e.error)?;
            tracing::info!(path = %artifact.target.display(), "Artifact written");
            changed.push(artifact.target);
        }
        Ok(changed)
    }
}

fn temp_file_for(target: &Path) -> Result<NamedTempFile> {
    let dir = parent_dir(target);
    fs::create_dir_all(dir)?;
    let suffix = target
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    let temp = tempfile::Builder::new()
        .prefix(".prwatch-")
        .suffix(&suffix)
        .tempfile_in(dir)?;
    Ok(temp)
}

/// SHA-256 of a file's content as hex, or `None` if the file does not exist.
pub fn file_digest(path: &Path) -> Result<Option<String>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(hex::encode(Sha256::digest(&bytes)))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
