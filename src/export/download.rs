//! Download targets
//!
//! Where finished artifacts are written. Nothing is sent over the network.

use super::types::{Artifact, ExportError};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Save-file affordance
pub trait DownloadTarget: Send + Sync {
    /// Write the artifact and return where it landed
    fn save(&self, artifact: &Artifact) -> Result<PathBuf, ExportError>;
}

/// Writes artifacts into a directory, never overwriting existing files
#[derive(Debug, Clone)]
pub struct DirectoryDownloads {
    dir: PathBuf,
}

impl DirectoryDownloads {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `name.ext`, then `name (1).ext`, `name (2).ext`, ...
    fn candidate_path(&self, file_name: &str, n: u32) -> PathBuf {
        if n == 0 {
            return self.dir.join(file_name);
        }
        let name = match file_name.rsplit_once('.') {
            Some((stem, ext)) => format!("{stem} ({n}).{ext}"),
            None => format!("{file_name} ({n})"),
        };
        self.dir.join(name)
    }

    /// Create the first candidate that does not exist yet. Creation fails
    /// on an existing file, so a file appearing concurrently is never
    /// overwritten.
    fn create_unique(&self, file_name: &str) -> Result<(PathBuf, File), ExportError> {
        let mut n = 0;
        loop {
            let path = self.candidate_path(file_name, n);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => n += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl DownloadTarget for DirectoryDownloads {
    fn save(&self, artifact: &Artifact) -> Result<PathBuf, ExportError> {
        if artifact.file_name.contains(|c: char| c == '/' || c == '\\') {
            return Err(ExportError::InvalidTarget(artifact.file_name.clone()));
        }
        if self.dir.exists() && !self.dir.is_dir() {
            return Err(ExportError::InvalidTarget(format!(
                "{} is not a directory",
                self.dir.display()
            )));
        }
        fs::create_dir_all(&self.dir)?;

        let (path, mut file) = self.create_unique(&artifact.file_name)?;
        file.write_all(&artifact.data)?;
        file.sync_all()?;

        tracing::info!("Saved recording to {:?}", path);
        Ok(path)
    }
}
