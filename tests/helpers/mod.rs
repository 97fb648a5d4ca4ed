//! Shared test harness: a scripted toolchain, a registry that records every
//! applied transition, and constructors for the conversion service.

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use uuid::Uuid;

use ts2sh::{
    db::{JobRegistry, MemoryJobRegistry, RegistryError},
    models::job::{ConversionJob, JobStatus, JobTransition},
    services::{
        conversion::ConversionService,
        executor::{InlineExecutor, TaskExecutor},
        orchestrator::Orchestrator,
        storage::{JobStorage, UploadedFile},
        toolchain::{CompiledOutput, Toolchain, ToolchainError, COMPILED_DIR},
    },
};

/// What the fake toolchain does when asked to compile.
#[derive(Debug, Clone)]
pub enum FakeToolchain {
    /// Write these `(path, content)` files as compiler output.
    Emit(Vec<(String, String)>),
    /// Fail compilation with this diagnostic.
    Fail(String),
    Panic,
}

impl FakeToolchain {
    pub fn hello() -> Self {
        FakeToolchain::Emit(vec![(
            "index.js".to_string(),
            "console.log(\"hi\");\n".to_string(),
        )])
    }
}

#[async_trait]
impl Toolchain for FakeToolchain {
    async fn compile(
        &self,
        _source_dir: &Path,
        output_dir: &Path,
    ) -> Result<CompiledOutput, ToolchainError> {
        match self {
            FakeToolchain::Emit(files) => {
                let emitted_dir = output_dir.join(COMPILED_DIR);
                for (path, content) in files {
                    let dest = emitted_dir.join(path);
                    tokio::fs::create_dir_all(dest.parent().unwrap()).await?;
                    tokio::fs::write(&dest, content).await?;
                }
                tokio::fs::create_dir_all(&emitted_dir).await?;
                Ok(CompiledOutput { emitted_dir })
            }
            FakeToolchain::Fail(diagnostic) => Err(ToolchainError::Compilation(diagnostic.clone())),
            FakeToolchain::Panic => panic!("toolchain blew up"),
        }
    }
}

/// Memory registry that remembers every successful transition.
#[derive(Default)]
pub struct RecordingRegistry {
    inner: MemoryJobRegistry,
    transitions: Mutex<Vec<(Uuid, JobStatus)>>,
}

impl RecordingRegistry {
    /// Statuses a job moved into, in order.
    pub fn history(&self, job_id: Uuid) -> Vec<JobStatus> {
        self.transitions
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == job_id)
            .map(|(_, status)| *status)
            .collect()
    }
}

#[async_trait]
impl JobRegistry for RecordingRegistry {
    async fn insert(&self, job: &ConversionJob) -> Result<(), RegistryError> {
        self.inner.insert(job).await
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<ConversionJob>, RegistryError> {
        self.inner.get(job_id).await
    }

    async fn list(&self, limit: i64) -> Result<Vec<ConversionJob>, RegistryError> {
        self.inner.list(limit).await
    }

    async fn transition(
        &self,
        job_id: Uuid,
        transition: JobTransition,
    ) -> Result<ConversionJob, RegistryError> {
        let job = self.inner.transition(job_id, transition).await?;
        self.transitions.lock().unwrap().push((job_id, job.status));
        Ok(job)
    }

    async fn delete(&self, job_id: Uuid) -> Result<bool, RegistryError> {
        self.inner.delete(job_id).await
    }

    async fn health_check(&self) -> Result<(), RegistryError> {
        Ok(())
    }

    async fn close(&self) {}
}

/// Everything a conversion needs, rooted in a temporary directory.
pub struct Harness {
    pub dir: TempDir,
    pub registry: Arc<RecordingRegistry>,
    pub storage: Arc<JobStorage>,
    pub orchestrator: Arc<Orchestrator>,
    pub executor: Arc<dyn TaskExecutor>,
}

impl Harness {
    /// Harness whose jobs run to completion inside `submit`.
    pub async fn inline(toolchain: FakeToolchain) -> Self {
        Self::with_executor(toolchain, |o| {
            Arc::new(InlineExecutor::new(o)) as Arc<dyn TaskExecutor>
        }).await
    }

    pub async fn with_executor<F>(toolchain: FakeToolchain, make_executor: F) -> Self
    where
        F: FnOnce(Arc<Orchestrator>) -> Arc<dyn TaskExecutor>,
    {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(JobStorage::new(
            dir.path().join("uploads"),
            dir.path().join("outputs"),
        ));
        storage.init().await.unwrap();

        let registry = Arc::new(RecordingRegistry::default());
        let orchestrator = Arc::new(Orchestrator::new(
            registry.clone(),
            Arc::new(toolchain),
            storage.clone(),
        ));
        let executor = make_executor(orchestrator.clone());

        Self {
            dir,
            registry,
            storage,
            orchestrator,
            executor,
        }
    }

    pub fn service(&self) -> ConversionService {
        ConversionService::new(
            self.registry.clone(),
            self.storage.clone(),
            self.executor.clone(),
            100,
        )
    }
}

pub fn upload(path: &str, content: &str) -> UploadedFile {
    UploadedFile {
        path: path.to_string(),
        content: content.as_bytes().to_vec(),
    }
}

/// A minimal TypeScript project.
pub fn demo_project() -> Vec<UploadedFile> {
    vec![upload("index.ts", "console.log(\"hi\");\n")]
}

/// Poll until the job reaches a terminal status.
pub async fn wait_for_terminal(registry: &dyn JobRegistry, job_id: Uuid) -> ConversionJob {
    for _ in 0..200 {
        if let Some(job) = registry.get(job_id).await.unwrap() {
            if job.status.is_terminal() {
                return job;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("job {} did not finish", job_id);
}
