//! Packs a compiled project into one self-extracting bash script.

use chrono::Utc;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::models::job::artifact_file_name;

pub mod archive;
pub mod entry;

use archive::{ArchiveBlock, DelimiterAllocator, ScriptPlan};
pub use entry::{select_entry_point, CANONICAL_ENTRY_POINTS};

/// Name the dependency manifest is embedded under.
pub const MANIFEST_NAME: &str = "package.json";

/// One emitted file, addressed by its `/`-separated path relative to the
/// emitted directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedFile {
    pub path: String,
    pub content: Vec<u8>,
}

/// Build the script for an in-memory file set.
///
/// Blocks are emitted entry file first, then the remaining files in path
/// order. `manifest` is embedded as `package.json` (unless the file set
/// already has one at its root) and triggers a dependency install before the
/// entry file runs.
pub fn build_script(
    mut files: Vec<EmittedFile>,
    manifest: Option<Vec<u8>>,
    project_name: &str,
) -> Result<Vec<u8>, PackagingError> {
    files.sort_by(|a, b| a.path.cmp(&b.path));

    if let Some(file) = files.iter().find(|f| f.content.contains(&0)) {
        return Err(PackagingError::BinaryContent(file.path.clone()));
    }

    let paths: Vec<String> = files.iter().map(|f| f.path.clone()).collect();
    let entry_point = select_entry_point(&paths)
        .ok_or(PackagingError::NoOutput)?
        .to_string();

    let mut delimiters = DelimiterAllocator::new();
    let mut blocks = Vec::with_capacity(files.len() + 1);
    let mut rest = Vec::with_capacity(files.len());
    for file in files {
        if file.path == entry_point {
            blocks.push(ArchiveBlock::new(file.path, file.content, &mut delimiters));
        } else {
            rest.push(file);
        }
    }

    let has_root_manifest = rest.iter().any(|f| f.path == MANIFEST_NAME);
    for file in rest {
        blocks.push(ArchiveBlock::new(file.path, file.content, &mut delimiters));
    }

    let install_dependencies = match manifest {
        Some(content) => {
            if content.contains(&0) {
                return Err(PackagingError::BinaryContent(MANIFEST_NAME.to_string()));
            }
            if !has_root_manifest {
                blocks.push(ArchiveBlock::new(MANIFEST_NAME, content, &mut delimiters));
            }
            true
        }
        None => false,
    };

    Ok(archive::assemble(&ScriptPlan {
        project_name,
        generated_at: Utc::now(),
        entry_point: &entry_point,
        blocks: &blocks,
        install_dependencies,
    }))
}

/// Read every regular file under `dir`, sorted by relative path.
pub fn collect_emitted_files(dir: &Path) -> Result<Vec<EmittedFile>, PackagingError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(dir)
            .map_err(|_| PackagingError::OutsideRoot(entry.path().to_path_buf()))?;
        let path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let content = std::fs::read(entry.path())?;
        files.push(EmittedFile { path, content });
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

/// Writes self-extracting scripts for compiled projects.
#[derive(Debug, Clone, Default)]
pub struct ArchivePackager;

impl ArchivePackager {
    pub fn new() -> Self {
        Self
    }

    /// Package everything under `emitted_dir` into
    /// `<artifact_dir>/<project_name>.sh` and mark it executable.
    pub async fn package(
        &self,
        emitted_dir: &Path,
        project_name: &str,
        manifest: Option<&Path>,
        artifact_dir: &Path,
    ) -> Result<PathBuf, PackagingError> {
        let dir = emitted_dir.to_path_buf();
        let files = tokio::task::spawn_blocking(move || collect_emitted_files(&dir)).await??;

        tracing::debug!(
            emitted_dir = %emitted_dir.display(),
            file_count = files.len(),
            "Collected emitted files"
        );

        let manifest = match manifest {
            Some(path) => Some(tokio::fs::read(path).await?),
            None => None,
        };

        let script = build_script(files, manifest, project_name)?;

        tokio::fs::create_dir_all(artifact_dir).await?;
        let artifact_path = artifact_dir.join(artifact_file_name(project_name));
        tokio::fs::write(&artifact_path, &script).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&artifact_path, std::fs::Permissions::from_mode(0o755))
                .await?;
        }

        tracing::info!(
            artifact = %artifact_path.display(),
            bytes = script.len(),
            "Shell executable created"
        );

        Ok(artifact_path)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PackagingError {
    #[error("No JavaScript files found in compiled output")]
    NoOutput,

    #[error("Cannot embed {0}: file contains NUL bytes")]
    BinaryContent(String),

    #[error("Emitted file {0} is outside the output directory")]
    OutsideRoot(PathBuf),

    #[error("Shell script creation error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Shell script creation error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Shell script creation error: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, content: &str) -> EmittedFile {
        EmittedFile {
            path: path.to_string(),
            content: content.as_bytes().to_vec(),
        }
    }

    /// Everything after the header comment, which carries the timestamp.
    fn body(script: &[u8]) -> &[u8] {
        let text = std::str::from_utf8(script).unwrap();
        let start = text.find("set -u").unwrap();
        &script[start..]
    }

    #[test]
    fn test_build_is_deterministic() {
        let files = vec![file("util.js", "exports.x = 1;\n"), file("index.js", "require('./util');\n")];
        let mut reordered = files.clone();
        reordered.reverse();

        let first = build_script(files, None, "demo").unwrap();
        let second = build_script(reordered, None, "demo").unwrap();
        assert_eq!(body(&first), body(&second));
    }

    #[test]
    fn test_empty_output_is_rejected() {
        let err = build_script(Vec::new(), None, "demo").unwrap_err();
        assert!(matches!(err, PackagingError::NoOutput));
        assert_eq!(err.to_string(), "No JavaScript files found in compiled output");
    }

    #[test]
    fn test_nul_bytes_are_rejected() {
        let files = vec![EmittedFile {
            path: "index.js".to_string(),
            content: b"a\0b".to_vec(),
        }];
        let err = build_script(files, None, "demo").unwrap_err();
        assert!(matches!(err, PackagingError::BinaryContent(p) if p == "index.js"));
    }

    #[test]
    fn test_entry_block_comes_first() {
        let files = vec![file("a.js", "a;\n"), file("main.js", "main;\n")];
        let script = String::from_utf8(build_script(files, None, "demo").unwrap()).unwrap();
        let main = script.find("'main.js' <<").unwrap();
        let other = script.find("'a.js' <<").unwrap();
        assert!(main < other);
        assert!(script.contains("node \"$TEMP_DIR\"/'main.js' \"$@\""));
    }

    #[test]
    fn test_manifest_is_embedded_once() {
        let files = vec![file("index.js", "1;\n")];
        let script = String::from_utf8(
            build_script(files, Some(b"{\"name\":\"demo\"}\n".to_vec()), "demo").unwrap(),
        )
        .unwrap();
        assert_eq!(script.matches("'package.json' <<").count(), 1);
        assert!(script.contains("npm install --silent"));

        let files = vec![file("index.js", "1;\n"), file("package.json", "{}\n")];
        let script =
            String::from_utf8(build_script(files, Some(b"{}\n".to_vec()), "demo").unwrap()).unwrap();
        assert_eq!(script.matches("'package.json' <<").count(), 1);
    }

    #[test]
    fn test_collect_walks_nested_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("lib/deep")).unwrap();
        std::fs::write(dir.path().join("index.js"), "i").unwrap();
        std::fs::write(dir.path().join("lib/deep/x.js"), "x").unwrap();
        std::fs::write(dir.path().join("lib/a.js"), "a").unwrap();

        let files = collect_emitted_files(dir.path()).unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["index.js", "lib/a.js", "lib/deep/x.js"]);
        assert_eq!(files[2].content, b"x");
    }

    #[test]
    fn test_collect_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let files = collect_emitted_files(&dir.path().join("nope")).unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn test_package_writes_executable_artifact() {
        let emitted = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        std::fs::write(emitted.path().join("index.js"), "console.log('hi');\n").unwrap();

        let path = ArchivePackager::new()
            .package(emitted.path(), "demo", None, out.path())
            .await
            .unwrap();

        assert_eq!(path, out.path().join("demo.sh"));
        let script = std::fs::read_to_string(&path).unwrap();
        assert!(script.contains("console.log('hi');"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[tokio::test]
    async fn test_package_without_output_writes_nothing() {
        let emitted = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();

        let err = ArchivePackager::new()
            .package(emitted.path(), "demo", None, out.path())
            .await
            .unwrap_err();
        assert!(matches!(err, PackagingError::NoOutput));
        assert!(!out.path().join("demo.sh").exists());
    }
}
