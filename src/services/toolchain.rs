use async_trait::async_trait;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Directory (under a job's output directory) that receives compiler output.
pub const COMPILED_DIR: &str = "compiled";

/// Result of a successful toolchain run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledOutput {
    pub emitted_dir: PathBuf,
}

/// External build step that turns an uploaded project into runnable files.
#[async_trait]
pub trait Toolchain: Send + Sync {
    async fn compile(
        &self,
        source_dir: &Path,
        output_dir: &Path,
    ) -> Result<CompiledOutput, ToolchainError>;
}

/// Drives `npm install` and `tsc` for a TypeScript project.
pub struct TypeScriptToolchain {
    tsc_bin: String,
    npm_bin: String,
    timeout: Option<Duration>,
}

impl TypeScriptToolchain {
    pub fn new(tsc_bin: impl Into<String>, npm_bin: impl Into<String>) -> Self {
        Self {
            tsc_bin: tsc_bin.into(),
            npm_bin: npm_bin.into(),
            timeout: None,
        }
    }

    /// Kill and fail any single toolchain process that runs longer than this.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, mut command: Command, step: Step) -> Result<(), ToolchainError> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|e| ToolchainError::Spawn {
            program: step.program(self).to_string(),
            source: e,
        })?;

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| ToolchainError::Timeout {
                    step: step.label(),
                    seconds: limit.as_secs(),
                })?,
            None => child.wait_with_output().await,
        }
        .map_err(ToolchainError::Io)?;

        if output.status.success() {
            return Ok(());
        }

        let diagnostic = diagnostic_text(&output.stdout, &output.stderr);
        Err(match step {
            Step::Install => ToolchainError::DependencyInstall(diagnostic),
            Step::Compile => ToolchainError::Compilation(diagnostic),
        })
    }
}

/// Text recorded as the job's error. tsc reports diagnostics on stdout; npm
/// uses stderr. NUL bytes are dropped since PostgreSQL `TEXT` rejects them.
fn diagnostic_text(stdout: &[u8], stderr: &[u8]) -> String {
    let clean = |bytes: &[u8]| String::from_utf8_lossy(bytes).replace('\0', "").trim().to_string();
    let stderr = clean(stderr);
    if stderr.is_empty() {
        clean(stdout)
    } else {
        stderr
    }
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Install,
    Compile,
}

impl Step {
    fn label(self) -> &'static str {
        match self {
            Step::Install => "dependency installation",
            Step::Compile => "compilation",
        }
    }

    fn program(self, toolchain: &TypeScriptToolchain) -> &str {
        match self {
            Step::Install => &toolchain.npm_bin,
            Step::Compile => &toolchain.tsc_bin,
        }
    }
}

/// Compiler settings used when the project ships no `tsconfig.json`.
pub fn default_tsconfig(source_dir: &Path, emitted_dir: &Path) -> serde_json::Value {
    json!({
        "compilerOptions": {
            "target": "ES2020",
            "module": "commonjs",
            "outDir": emitted_dir.to_string_lossy(),
            "rootDir": source_dir.to_string_lossy(),
            "strict": true,
            "esModuleInterop": true,
            "skipLibCheck": true,
            "forceConsistentCasingInFileNames": true,
            "resolveJsonModule": true
        },
        "exclude": ["node_modules", "**/*.test.ts", "**/*.spec.ts"]
    })
}

#[async_trait]
impl Toolchain for TypeScriptToolchain {
    async fn compile(
        &self,
        source_dir: &Path,
        output_dir: &Path,
    ) -> Result<CompiledOutput, ToolchainError> {
        let emitted_dir = output_dir.join(COMPILED_DIR);
        let tsconfig_path = source_dir.join("tsconfig.json");

        if !tokio::fs::try_exists(&tsconfig_path).await? {
            tracing::debug!(path = %tsconfig_path.display(), "Writing default tsconfig.json");
            let tsconfig = default_tsconfig(source_dir, &emitted_dir);
            let body = serde_json::to_vec_pretty(&tsconfig)?;
            tokio::fs::write(&tsconfig_path, body).await?;
        }

        if tokio::fs::try_exists(source_dir.join("package.json")).await? {
            tracing::info!(source = %source_dir.display(), "Installing project dependencies");
            let mut install = Command::new(&self.npm_bin);
            install.arg("install").current_dir(source_dir);
            self.run(install, Step::Install).await?;
        }

        tracing::info!(source = %source_dir.display(), "Compiling TypeScript");
        let mut tsc = Command::new(&self.tsc_bin);
        // --outDir takes precedence over the project's own tsconfig.
        tsc.arg("--project")
            .arg(&tsconfig_path)
            .arg("--outDir")
            .arg(&emitted_dir)
            .current_dir(source_dir);
        self.run(tsc, Step::Compile).await?;

        Ok(CompiledOutput { emitted_dir })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToolchainError {
    #[error("Dependency installation failed: {0}")]
    DependencyInstall(String),

    #[error("TypeScript compilation failed: {0}")]
    Compilation(String),

    #[error("Toolchain {step} timed out after {seconds}s")]
    Timeout { step: &'static str, seconds: u64 },

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Compilation error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Compilation error: {0}")]
    Config(#[from] serde_json::Error),
}
