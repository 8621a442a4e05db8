use std::fs;
use std::io;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;

use novelist_settings::storage::write_atomic;

use crate::tree::{Project, ProjectDocument, ProjectError, PROJECT_FORMAT_VERSION};

/// Persists projects to disk using JSON + atomic writes.
/// 以 JSON 搭配原子寫入方式儲存專案。
#[derive(Debug)]
pub struct ProjectStore {
    path: PathBuf,
}

impl ProjectStore {
    /// Constructs a store bound to the provided path.
    /// 建立綁定至指定路徑的儲存器。
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads a project from disk, returning `Ok(None)` when the file is absent.
    /// 從磁碟載入專案；若檔案不存在則回傳 `Ok(None)`。
    pub fn load(&self) -> Result<Option<Project>, ProjectStoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(ProjectStoreError::Io(err)),
        };
        let document: ProjectDocument = serde_json::from_str(&contents)
            .map_err(|err| ProjectStoreError::Invalid(err.to_string()))?;
        if document.version > PROJECT_FORMAT_VERSION {
            return Err(ProjectStoreError::UnsupportedVersion(document.version));
        }
        let project = Project::from_document(document)?;
        log::debug!(
            "loaded project with {} nodes from {}",
            project.len(),
            self.path.display()
        );
        Ok(Some(project))
    }

    /// Saves the project atomically to disk.
    /// 將專案以原子方式寫入磁碟。
    pub fn save(&self, project: &Project) -> Result<(), ProjectStoreError> {
        let document = project.to_document()?;
        let payload = serde_json::to_vec_pretty(&document)
            .map_err(|err| ProjectStoreError::Invalid(err.to_string()))?;
        write_atomic(&self.path, &payload).map_err(ProjectStoreError::Io)?;
        log::debug!("saved project to {}", self.path.display());
        Ok(())
    }
}

/// Errors emitted by [`ProjectStore`].
/// [`ProjectStore`] 可能拋出的錯誤。
#[derive(Debug, Error)]
pub enum ProjectStoreError {
    #[error("project IO error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid project payload: {0}")]
    Invalid(String),
    #[error("unsupported project format version {0}")]
    UnsupportedVersion(u32),
    #[error("inconsistent project structure: {0}")]
    Structure(#[from] ProjectError),
}
