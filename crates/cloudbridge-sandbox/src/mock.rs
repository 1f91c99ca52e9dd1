//! In-memory guest runtime for tests.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{SandboxError, SandboxResult};
use crate::runtime::{GuestOutput, GuestRuntime, validate_file_name};

/// A complete 1x1 PNG image.
pub const TINY_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4,
    0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE,
    0x42, 0x60, 0x82,
];

/// What a single mock execution does.
#[derive(Debug, Clone)]
pub enum MockRun {
    /// Succeed and write `bytes` to `file`.
    Produce { file: String, bytes: Vec<u8> },
    /// Raise a guest fault with this diagnostic.
    Fault(String),
    /// Succeed without writing anything.
    Silent,
}

impl MockRun {
    /// Succeed and write [`TINY_PNG`] to `file`.
    pub fn png(file: impl Into<String>) -> Self {
        MockRun::Produce {
            file: file.into(),
            bytes: TINY_PNG.to_vec(),
        }
    }
}

/// A guest runtime backed by a hash map.
///
/// Executions follow a script: queued [`MockRun`]s are consumed in order,
/// then the default applies. Every submitted source is recorded.
#[derive(Debug)]
pub struct MockRuntime {
    booted: AtomicBool,
    boot_error: Option<String>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    available_packages: Option<BTreeSet<String>>,
    packages: Mutex<BTreeSet<String>>,
    package_loads: Mutex<Vec<String>>,
    script: Mutex<VecDeque<MockRun>>,
    default_run: MockRun,
    run_delay: Option<Duration>,
    sources: Mutex<Vec<String>>,
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRuntime {
    /// A runtime whose runs succeed silently and which accepts any package.
    pub fn new() -> Self {
        Self {
            booted: AtomicBool::new(false),
            boot_error: None,
            files: Mutex::new(HashMap::new()),
            available_packages: None,
            packages: Mutex::new(BTreeSet::new()),
            package_loads: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            default_run: MockRun::Silent,
            run_delay: None,
            sources: Mutex::new(Vec::new()),
        }
    }

    /// A runtime whose runs write a PNG to `file`.
    pub fn producing_png(file: impl Into<String>) -> Self {
        Self::new().with_default(MockRun::png(file))
    }

    /// Set what runs do once the script is exhausted.
    pub fn with_default(mut self, run: MockRun) -> Self {
        self.default_run = run;
        self
    }

    /// Queue a one-off run behaviour.
    pub fn then(self, run: MockRun) -> Self {
        self.script.lock().push_back(run);
        self
    }

    /// Queue a run behaviour on a shared runtime.
    pub fn push_run(&self, run: MockRun) {
        self.script.lock().push_back(run);
    }

    /// Restrict loadable packages to `names`.
    pub fn with_packages(mut self, names: &[&str]) -> Self {
        self.available_packages = Some(names.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Make `boot()` fail.
    pub fn failing_boot(mut self, message: impl Into<String>) -> Self {
        self.boot_error = Some(message.into());
        self
    }

    /// Delay every run, to exercise in-flight behaviour.
    pub fn with_run_delay(mut self, delay: Duration) -> Self {
        self.run_delay = Some(delay);
        self
    }

    /// Number of executions attempted.
    pub fn run_count(&self) -> usize {
        self.sources.lock().len()
    }

    /// Sources submitted so far, in order.
    pub fn sources(&self) -> Vec<String> {
        self.sources.lock().clone()
    }

    /// Every `load_package` call that actually loaded something.
    pub fn package_loads(&self) -> Vec<String> {
        self.package_loads.lock().clone()
    }

    /// Current contents of a private file.
    pub fn file(&self, name: &str) -> Option<Vec<u8>> {
        self.files.lock().get(name).cloned()
    }

    /// Names of all private files.
    pub fn file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.files.lock().keys().cloned().collect();
        names.sort();
        names
    }

    fn require_booted(&self) -> SandboxResult<()> {
        if self.booted.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SandboxError::NotBooted)
        }
    }
}

#[async_trait]
impl GuestRuntime for MockRuntime {
    fn name(&self) -> &str {
        "mock"
    }

    async fn boot(&self) -> SandboxResult<()> {
        if let Some(message) = &self.boot_error {
            return Err(SandboxError::BootFailed(message.clone()));
        }
        self.booted.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_booted(&self) -> bool {
        self.booted.load(Ordering::SeqCst)
    }

    async fn load_package(&self, name: &str) -> SandboxResult<()> {
        self.require_booted()?;
        if let Some(available) = &self.available_packages
            && !available.contains(name)
        {
            return Err(SandboxError::PackageNotFound {
                name: name.to_string(),
                searched: None,
            });
        }
        if self.packages.lock().insert(name.to_string()) {
            self.package_loads.lock().push(name.to_string());
        }
        Ok(())
    }

    fn loaded_packages(&self) -> Vec<String> {
        self.packages.lock().iter().cloned().collect()
    }

    async fn run(&self, source: &str) -> SandboxResult<GuestOutput> {
        self.require_booted()?;
        self.sources.lock().push(source.to_string());

        if let Some(delay) = self.run_delay {
            tokio::time::sleep(delay).await;
        }

        let step = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default_run.clone());

        match step {
            MockRun::Produce { file, bytes } => {
                self.files.lock().insert(file, bytes);
                Ok(GuestOutput::default())
            }
            MockRun::Fault(message) => Err(SandboxError::GuestFault {
                exit_code: Some(1),
                message,
            }),
            MockRun::Silent => Ok(GuestOutput::default()),
        }
    }

    async fn write_file(&self, name: &str, bytes: &[u8]) -> SandboxResult<()> {
        self.require_booted()?;
        validate_file_name(name)?;
        self.files.lock().insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn read_file(&self, name: &str) -> SandboxResult<Option<Vec<u8>>> {
        self.require_booted()?;
        validate_file_name(name)?;
        Ok(self.files.lock().get(name).cloned())
    }

    async fn remove_file(&self, name: &str) -> SandboxResult<()> {
        self.require_booted()?;
        validate_file_name(name)?;
        self.files.lock().remove(name);
        Ok(())
    }
}
