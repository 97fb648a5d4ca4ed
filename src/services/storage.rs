use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

/// A file received with a conversion request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Path relative to the project root, as sent by the client.
    pub path: String,
    pub content: Vec<u8>,
}

/// Per-job directories on local disk. Uploaded sources live under
/// `<upload_root>/<job_id>`, outputs under `<output_root>/<job_id>`; jobs never
/// share either.
#[derive(Debug, Clone)]
pub struct JobStorage {
    upload_root: PathBuf,
    output_root: PathBuf,
}

impl JobStorage {
    pub fn new(upload_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            upload_root: upload_root.into(),
            output_root: output_root.into(),
        }
    }

    /// Create the root directories.
    pub async fn init(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.upload_root).await?;
        tokio::fs::create_dir_all(&self.output_root).await?;
        Ok(())
    }

    pub fn upload_dir(&self, job_id: Uuid) -> PathBuf {
        self.upload_root.join(job_id.to_string())
    }

    pub fn output_dir(&self, job_id: Uuid) -> PathBuf {
        self.output_root.join(job_id.to_string())
    }

    /// Write uploaded files into the job's upload directory, preserving their
    /// relative paths. Every path is validated before anything is written.
    pub async fn save_upload(
        &self,
        job_id: Uuid,
        files: &[UploadedFile],
    ) -> Result<PathBuf, StorageError> {
        let relative: Vec<PathBuf> = files
            .iter()
            .map(|f| sanitize_relative_path(&f.path))
            .collect::<Result<_, _>>()?;

        let root = self.upload_dir(job_id);
        tokio::fs::create_dir_all(&root).await?;

        for (file, rel) in files.iter().zip(&relative) {
            let dest = root.join(rel);
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&dest, &file.content).await?;
        }

        Ok(root)
    }

    /// Read a job's artifact. `None` if it does not exist.
    pub async fn read_artifact(
        &self,
        job_id: Uuid,
        file_name: &str,
    ) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.output_dir(job_id).join(file_name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn remove_upload(&self, job_id: Uuid) -> Result<(), StorageError> {
        remove_tree(&self.upload_dir(job_id)).await
    }

    pub async fn remove_output(&self, job_id: Uuid) -> Result<(), StorageError> {
        remove_tree(&self.output_dir(job_id)).await
    }
}

async fn remove_tree(path: &Path) -> Result<(), StorageError> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Turn a client-supplied name into a path that stays inside the job's
/// upload directory. Both `/` and `\` separate components.
pub fn sanitize_relative_path(name: &str) -> Result<PathBuf, StorageError> {
    let invalid = || StorageError::InvalidPath(name.to_string());

    if name.contains('\0') || name.starts_with('/') || name.starts_with('\\') {
        return Err(invalid());
    }

    let mut path = PathBuf::new();
    for part in name.split(['/', '\\']) {
        match part {
            "" | "." => continue,
            ".." => return Err(invalid()),
            _ => {}
        }
        // Rejects drive prefixes and anything else that is not a plain name.
        let mut components = Path::new(part).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => path.push(part),
            _ => return Err(invalid()),
        }
    }

    if path.as_os_str().is_empty() {
        return Err(invalid());
    }
    Ok(path)
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Invalid upload path: {0:?}")]
    InvalidPath(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}
