//! Shared test utilities for integration tests
//!
//! Scripted Generator/Publisher fakes, a runtime harness over a temporary sled
//! store, polling helpers, and XDG environment isolation for config tests.

use async_trait::async_trait;
use bulletin::activity::{GenerateRequest, Generator, Publisher};
use bulletin::content::{ContentBatch, ContentItem};
use bulletin::runtime::{RuntimeOptions, WorkerRuntime, WorkflowStore};
use bulletin::section::{PublishTarget, SectionId, WorkflowInput};
use bulletin::workflow::{FailurePolicy, SectionSnapshot, WorkflowSettings};
use bulletin::ActivityError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tokio::time::Instant;

/// Global mutex to serialize environment variable access across all tests
static ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const POLL_LIMIT: usize = 50_000;

pub fn input(section: &str, count: u32) -> WorkflowInput {
    WorkflowInput::new(
        SectionId::new(section).unwrap(),
        count,
        PublishTarget::new("test-bucket", "us-east-1"),
    )
}

/// Default runtime options with a 30s cycle interval and the given fold threshold
pub fn options(fold_threshold: u64) -> RuntimeOptions {
    RuntimeOptions {
        workflow: WorkflowSettings {
            cycle_interval: Duration::from_secs(30),
            fold_threshold,
            failure_policy: FailurePolicy::Skip,
        },
        ..RuntimeOptions::default()
    }
}

pub fn batch(headlines: &[&str]) -> ContentBatch {
    ContentBatch::new(
        headlines
            .iter()
            .map(|h| ContentItem::new(*h, format!("{} body", h), "Test Author", "today"))
            .collect(),
    )
}

#[derive(Debug, Clone)]
pub struct GenerateCall {
    pub section: String,
    pub sequence: u64,
    pub at: Instant,
}

/// Generator that replays a script, then produces numbered items.
#[derive(Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<ContentBatch, ActivityError>>>,
    fallback_error: Mutex<Option<ActivityError>>,
    calls: Mutex<Vec<GenerateCall>>,
}

impl ScriptedGenerator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, result: Result<ContentBatch, ActivityError>) {
        self.script.lock().push_back(result);
    }

    pub fn fail_always(&self, error: ActivityError) {
        *self.fallback_error.lock() = Some(error);
    }

    pub fn calls(&self) -> Vec<GenerateCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, request: &GenerateRequest) -> Result<ContentBatch, ActivityError> {
        let call_index = {
            let mut calls = self.calls.lock();
            calls.push(GenerateCall {
                section: request.section.to_string(),
                sequence: request.sequence,
                at: Instant::now(),
            });
            calls.len()
        };
        if let Some(result) = self.script.lock().pop_front() {
            return result;
        }
        if let Some(err) = self.fallback_error.lock().clone() {
            return Err(err);
        }
        let items = (0..request.count)
            .map(|i| {
                ContentItem::new(
                    format!("{} story {}.{}", request.section, call_index, i),
                    "generated body",
                    "Test Author",
                    "today",
                )
            })
            .collect();
        Ok(ContentBatch::new(items))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Publisher that records successful publishes and can be scripted to fail
/// or held until the test releases it.
#[derive(Default)]
pub struct ScriptedPublisher {
    script: Mutex<VecDeque<Result<(), ActivityError>>>,
    fallback_error: Mutex<Option<ActivityError>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    started: AtomicUsize,
    published: Mutex<Vec<Vec<ContentItem>>>,
}

impl ScriptedPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, result: Result<(), ActivityError>) {
        self.script.lock().push_back(result);
    }

    pub fn fail_always(&self, error: ActivityError) {
        *self.fallback_error.lock() = Some(error);
    }

    /// Block every publish until a permit is added to the returned semaphore.
    pub fn hold(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn published(&self) -> Vec<Vec<ContentItem>> {
        self.published.lock().clone()
    }
}

#[async_trait]
impl Publisher for ScriptedPublisher {
    async fn publish(
        &self,
        _section: &SectionId,
        items: &[ContentItem],
        _target: &PublishTarget,
    ) -> Result<(), ActivityError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.acquire()
                .await
                .map_err(|e| ActivityError::Transient(e.to_string()))?
                .forget();
        }
        if let Some(result) = self.script.lock().pop_front() {
            result?;
        } else if let Some(err) = self.fallback_error.lock().clone() {
            return Err(err);
        }
        self.published.lock().push(items.to_vec());
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Runtime over a temporary store with scripted collaborators
pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<WorkflowStore>,
    pub runtime: Arc<WorkerRuntime>,
    pub generator: Arc<ScriptedGenerator>,
    pub publisher: Arc<ScriptedPublisher>,
    pub options: RuntimeOptions,
}

impl Harness {
    pub fn new(options: RuntimeOptions) -> Self {
        Self::open(
            TempDir::new().unwrap(),
            ScriptedGenerator::new(),
            ScriptedPublisher::new(),
            options,
        )
    }

    pub fn open(
        dir: TempDir,
        generator: Arc<ScriptedGenerator>,
        publisher: Arc<ScriptedPublisher>,
        options: RuntimeOptions,
    ) -> Self {
        let store = Arc::new(WorkflowStore::open(&dir.path().join("store")).unwrap());
        let runtime = Arc::new(WorkerRuntime::new(
            store.clone(),
            generator.clone(),
            publisher.clone(),
            options.clone(),
        ));
        Self {
            dir,
            store,
            runtime,
            generator,
            publisher,
            options,
        }
    }

    /// Shut the runtime down, release the store and reopen it with new fakes,
    /// as a fresh process would.
    pub async fn restart(
        self,
        generator: Arc<ScriptedGenerator>,
        publisher: Arc<ScriptedPublisher>,
    ) -> Self {
        self.runtime.shutdown().await.unwrap();
        let Harness {
            dir,
            store,
            runtime,
            options,
            ..
        } = self;
        drop(runtime);
        drop(store);
        Self::open(dir, generator, publisher, options)
    }
}

/// Poll the runtime until the workflow's snapshot satisfies `pred`.
pub async fn wait_for_snapshot<F>(
    runtime: &WorkerRuntime,
    workflow_id: &str,
    mut pred: F,
) -> SectionSnapshot
where
    F: FnMut(&SectionSnapshot) -> bool,
{
    for _ in 0..POLL_LIMIT {
        if let Ok(snapshot) = runtime.query(workflow_id) {
            if pred(&snapshot) {
                return snapshot;
            }
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    panic!("snapshot condition for {} never held", workflow_id);
}

/// Poll until `cond` holds.
pub async fn wait_until<F>(mut cond: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..POLL_LIMIT {
        if cond() {
            return;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    panic!("condition never held");
}

/// Run `f` with HOME and XDG_CONFIG_HOME pointed into `test_dir`, restoring
/// the previous values afterwards. Serialized across tests.
pub fn with_xdg_env<F, R>(test_dir: &TempDir, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let home = std::env::var("HOME").ok();
    let xdg_config_home = std::env::var("XDG_CONFIG_HOME").ok();

    let test_home = test_dir.path().join("home");
    std::fs::create_dir_all(&test_home).unwrap();
    std::env::set_var("HOME", &test_home);
    std::env::set_var("XDG_CONFIG_HOME", test_dir.path());

    let result = f();

    match home {
        Some(v) => std::env::set_var("HOME", v),
        None => std::env::remove_var("HOME"),
    }
    match xdg_config_home {
        Some(v) => std::env::set_var("XDG_CONFIG_HOME", v),
        None => std::env::remove_var("XDG_CONFIG_HOME"),
    }
    result
}

/// Run `f` with extra environment variables set, serialized with other env tests.
pub fn with_env<F, R>(vars: &[(&str, &str)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    for (key, value) in vars {
        std::env::set_var(key, value);
    }
    let result = f();
    for (key, _) in vars {
        std::env::remove_var(key);
    }
    result
}
