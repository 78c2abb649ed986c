use fleetbench_common::{FleetError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Test files hold this unit repeated [`CONTENT_REPEAT`] times
pub const CONTENT_UNIT: &str = "abcd";
pub const CONTENT_REPEAT: usize = 256;

pub fn file_content() -> String {
    CONTENT_UNIT.repeat(CONTENT_REPEAT)
}

/// Directory holding the files the write benchmark uploads
#[derive(Debug, Clone)]
pub struct WorkDir {
    root: PathBuf,
}

impl WorkDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of `name`; names are plain file names
    pub fn path(&self, name: &str) -> Result<PathBuf> {
        let plain = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\']);
        if !plain {
            return Err(FleetError::InvalidArgument {
                message: format!("not a plain file name: {:?}", name),
            });
        }
        Ok(self.root.join(name))
    }

    /// (Re)write `name` with the fixed test content
    pub async fn new_file(&self, name: &str) -> Result<PathBuf> {
        let path = self.path(name)?;
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(&path, file_content()).await?;
        debug!("Wrote test file {}", path.display());
        Ok(path)
    }

    /// Path of an existing `name`
    pub async fn existing(&self, name: &str) -> Result<PathBuf> {
        let path = self.path(name)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            Ok(_) => Err(FleetError::InvalidArgument {
                message: format!("{} is not a file", path.display()),
            }),
            Err(e) => Err(e.into()),
        }
    }
}
