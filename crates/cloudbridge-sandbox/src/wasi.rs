//! Wasmtime runtime for interpreters compiled to `wasm32-wasip1`.
//!
//! # Flow
//!
//! 1. `boot()` reads the interpreter module, fingerprints it (SHA-256),
//!    compiles it once and creates the private filesystem (a host temp dir)
//! 2. `load_package()` resolves `<package_dir>/<name>` and records it for
//!    mounting at `/packages/<name>`
//! 3. `run()` instantiates the interpreter with the private filesystem
//!    preopened at the workdir, loaded packages and extra mounts preopened
//!    read-only, and the program delivered on stdin
//! 4. A non-zero exit or trap becomes a guest fault carrying stderr
//!
//! Each run is bounded twice: by fuel, and by an epoch deadline that a tokio
//! task advances in real time. The guest is interrupted even when the
//! caller stops waiting for it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use wasmtime::{Config, Engine, Linker, Module, Store, Trap};
use wasmtime_wasi::p1::WasiP1Ctx;
use wasmtime_wasi::p2::pipe::{MemoryInputPipe, MemoryOutputPipe};
use wasmtime_wasi::{DirPerms, FilePerms, WasiCtxBuilder};

use crate::error::{SandboxError, SandboxResult};
use crate::runtime::{GuestOutput, GuestRuntime, validate_file_name};

/// Roughly how many wasm instructions one second of budget buys.
const FUEL_PER_SEC: u64 = 33_000_000;

/// Interval between epoch ticks.
const EPOCH_TICK: Duration = Duration::from_millis(100);

/// Guest directory packages are mounted under.
const PACKAGE_MOUNT_ROOT: &str = "/packages";

/// Number of trailing stderr lines kept in a guest fault.
const DIAGNOSTIC_LINES: usize = 20;

/// Configuration for a [`WasiRuntime`].
#[derive(Debug, Clone)]
pub struct WasiRuntimeConfig {
    /// Interpreter module (`.wasm`, or `.wat` text).
    pub interpreter: PathBuf,
    /// `argv[0]` for the interpreter.
    pub program_name: String,
    /// Remaining arguments. The program source is written to stdin.
    pub args: Vec<String>,
    /// Guest path of the private filesystem.
    pub workdir: String,
    /// Host directory with one sub-directory per package. `None` means
    /// packages ship inside the interpreter image.
    pub package_dir: Option<PathBuf>,
    /// Environment variable listing mounted package paths.
    pub package_path_env: String,
    /// Extra read-only mounts: (host dir, guest path).
    pub mounts: Vec<(PathBuf, String)>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// Wall-clock bound per run. Also sizes the fuel budget.
    pub timeout: Duration,
    /// Capacity of the stdout capture buffer.
    pub stdout_capacity: usize,
    /// Capacity of the stderr capture buffer.
    pub stderr_capacity: usize,
}

impl WasiRuntimeConfig {
    /// Create a config for the given interpreter with defaults.
    pub fn new(interpreter: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            program_name: "python".to_string(),
            args: vec!["-".to_string()],
            workdir: "/work".to_string(),
            package_dir: None,
            package_path_env: "PYTHONPATH".to_string(),
            mounts: Vec::new(),
            env: Vec::new(),
            timeout: Duration::from_secs(120),
            stdout_capacity: 1024 * 1024,
            stderr_capacity: 256 * 1024,
        }
    }

    /// Set `argv[0]` and the interpreter arguments.
    pub fn with_command(mut self, program_name: impl Into<String>, args: Vec<String>) -> Self {
        self.program_name = program_name.into();
        self.args = args;
        self
    }

    /// Set the guest path of the private filesystem.
    pub fn with_workdir(mut self, workdir: impl Into<String>) -> Self {
        self.workdir = workdir.into();
        self
    }

    /// Set the package directory.
    pub fn with_package_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.package_dir = Some(dir.into());
        self
    }

    /// Set the package path environment variable.
    pub fn with_package_path_env(mut self, name: impl Into<String>) -> Self {
        self.package_path_env = name.into();
        self
    }

    /// Add a read-only mount.
    pub fn add_mount(mut self, host: impl Into<PathBuf>, guest: impl Into<String>) -> Self {
        self.mounts.push((host.into(), guest.into()));
        self
    }

    /// Add an environment variable.
    pub fn add_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set the execution budget.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// State that exists only after a successful boot.
struct Booted {
    module: Module,
    private_dir: TempDir,
}

/// Everything one blocking execution needs, detached from `&self`.
struct RunPlan {
    args: Vec<String>,
    env: Vec<(String, String)>,
    private_dir: PathBuf,
    workdir: String,
    read_only: Vec<(PathBuf, String)>,
    timeout: Duration,
    deadline_ticks: u64,
    stdout_capacity: usize,
    stderr_capacity: usize,
}

/// Interpreter sandbox running under Wasmtime with WASI preview 1.
pub struct WasiRuntime {
    config: WasiRuntimeConfig,
    /// Wasmtime engine (shared across all executions).
    engine: Engine,
    booted: RwLock<Option<Booted>>,
    /// Package name → host directory (`None` when bundled).
    packages: Mutex<BTreeMap<String, Option<PathBuf>>>,
}

impl WasiRuntime {
    /// Create an unbooted runtime.
    pub fn new(config: WasiRuntimeConfig) -> SandboxResult<Self> {
        let mut wasm_config = Config::new();
        wasm_config.consume_fuel(true).epoch_interruption(true);

        let engine = Engine::new(&wasm_config).map_err(|e| {
            SandboxError::BootFailed(format!("Failed to create Wasmtime engine: {e}"))
        })?;

        Ok(Self {
            config,
            engine,
            booted: RwLock::new(None),
            packages: Mutex::new(BTreeMap::new()),
        })
    }

    /// Host path of the private filesystem, once booted.
    pub fn private_dir(&self) -> Option<PathBuf> {
        self.booted
            .read()
            .as_ref()
            .map(|b| b.private_dir.path().to_path_buf())
    }

    fn require_private_dir(&self) -> SandboxResult<PathBuf> {
        self.private_dir().ok_or(SandboxError::NotBooted)
    }

    fn build_plan(&self) -> SandboxResult<(Module, RunPlan)> {
        let (module, private_dir) = {
            let guard = self.booted.read();
            let booted = guard.as_ref().ok_or(SandboxError::NotBooted)?;
            (booted.module.clone(), booted.private_dir.path().to_path_buf())
        };

        let mut read_only = self.config.mounts.clone();
        let mut package_paths = Vec::new();
        for (name, dir) in self.packages.lock().iter() {
            if let Some(dir) = dir {
                let guest = format!("{PACKAGE_MOUNT_ROOT}/{name}");
                read_only.push((dir.clone(), guest.clone()));
                package_paths.push(guest);
            }
        }

        let mut env = self.config.env.clone();
        if !package_paths.is_empty() {
            env.push((self.config.package_path_env.clone(), package_paths.join(":")));
        }

        let mut args = Vec::with_capacity(self.config.args.len() + 1);
        args.push(self.config.program_name.clone());
        args.extend(self.config.args.iter().cloned());

        Ok((
            module,
            RunPlan {
                args,
                env,
                private_dir,
                workdir: self.config.workdir.clone(),
                read_only,
                timeout: self.config.timeout,
                deadline_ticks: deadline_ticks(self.config.timeout),
                stdout_capacity: self.config.stdout_capacity,
                stderr_capacity: self.config.stderr_capacity,
            },
        ))
    }

    /// Synchronous execution with Wasmtime + WASI Preview 1.
    fn execute_sync(
        engine: &Engine,
        module: &Module,
        source: &str,
        plan: &RunPlan,
    ) -> SandboxResult<GuestOutput> {
        let start = Instant::now();

        let stdin_pipe = MemoryInputPipe::new(source.as_bytes().to_vec());
        let stdout_pipe = MemoryOutputPipe::new(plan.stdout_capacity);
        let stderr_pipe = MemoryOutputPipe::new(plan.stderr_capacity);

        let mut wasi_builder = WasiCtxBuilder::new();
        wasi_builder
            .stdin(stdin_pipe)
            .stdout(stdout_pipe.clone())
            .stderr(stderr_pipe.clone())
            .args(plan.args.as_slice());

        for (key, value) in &plan.env {
            wasi_builder.env(key, value);
        }

        wasi_builder
            .preopened_dir(&plan.private_dir, &plan.workdir, DirPerms::all(), FilePerms::all())
            .map_err(|e| {
                SandboxError::ExecutionFailed(format!("Failed to mount private filesystem: {e}"))
            })?;

        for (host, guest) in &plan.read_only {
            if !host.is_dir() {
                warn!(host = %host.display(), guest = %guest, "Mount source is not a directory, skipping");
                continue;
            }
            if let Err(e) = wasi_builder.preopened_dir(host, guest, DirPerms::READ, FilePerms::READ)
            {
                warn!(host = %host.display(), error = %e, "Could not open preopened directory, skipping");
            }
        }

        let wasi_ctx = wasi_builder.build_p1();
        let mut store = Store::new(engine, wasi_ctx);

        let fuel = FUEL_PER_SEC * plan.timeout.as_secs().max(1);
        store
            .set_fuel(fuel)
            .map_err(|e| SandboxError::ExecutionFailed(format!("Failed to set fuel: {e}")))?;

        store.set_epoch_deadline(plan.deadline_ticks);

        let mut linker = Linker::new(engine);
        wasmtime_wasi::p1::add_to_linker_sync(&mut linker, |ctx: &mut WasiP1Ctx| ctx)
            .map_err(|e| SandboxError::ExecutionFailed(format!("Failed to link WASI: {e}")))?;

        let instance = linker.instantiate(&mut store, module).map_err(|e| {
            SandboxError::ExecutionFailed(format!("Failed to instantiate interpreter: {e}"))
        })?;

        let start_fn = instance
            .get_typed_func::<(), ()>(&mut store, "_start")
            .map_err(|e| SandboxError::ExecutionFailed(format!("No _start entry point: {e}")))?;

        let call = start_fn.call(&mut store, ());

        let stdout = String::from_utf8_lossy(&stdout_pipe.contents()).into_owned();
        let stderr = String::from_utf8_lossy(&stderr_pipe.contents()).into_owned();

        let exit_code = match call {
            Ok(()) => 0,
            Err(e) => {
                if let Some(exit) = e.downcast_ref::<wasmtime_wasi::I32Exit>() {
                    exit.0
                } else if matches!(
                    e.downcast_ref::<Trap>(),
                    Some(Trap::OutOfFuel | Trap::Interrupt)
                ) {
                    return Err(SandboxError::Timeout(plan.timeout));
                } else {
                    return Err(SandboxError::GuestFault {
                        exit_code: None,
                        message: diagnostic(&stderr, &format!("trap: {e}")),
                    });
                }
            }
        };

        if exit_code != 0 {
            return Err(SandboxError::GuestFault {
                exit_code: Some(exit_code),
                message: diagnostic(&stderr, "guest exited without a diagnostic"),
            });
        }

        Ok(GuestOutput {
            stdout,
            stderr,
            elapsed: start.elapsed(),
        })
    }
}

#[async_trait]
impl GuestRuntime for WasiRuntime {
    fn name(&self) -> &str {
        "wasi"
    }

    async fn boot(&self) -> SandboxResult<()> {
        if self.is_booted() {
            return Ok(());
        }

        let path = self.config.interpreter.clone();
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            SandboxError::BootFailed(format!(
                "Failed to read interpreter {}: {e}",
                path.display()
            ))
        })?;
        let digest = sha256_hex(&bytes);

        let engine = self.engine.clone();
        let module = tokio::task::spawn_blocking(move || Module::new(&engine, &bytes))
            .await
            .map_err(|e| SandboxError::BootFailed(format!("Task join error: {e}")))?
            .map_err(|e| {
                SandboxError::BootFailed(format!(
                    "Failed to compile interpreter {}: {e}",
                    path.display()
                ))
            })?;

        if module.get_export("_start").is_none() {
            return Err(SandboxError::BootFailed(format!(
                "Interpreter {} is not a WASI command (no _start export)",
                path.display()
            )));
        }

        let private_dir = tempfile::Builder::new()
            .prefix("cloudbridge-guest-")
            .tempdir()?;

        info!(
            interpreter = %path.display(),
            sha256 = %digest,
            private_dir = %private_dir.path().display(),
            "Guest runtime booted"
        );

        let mut booted = self.booted.write();
        if booted.is_none() {
            *booted = Some(Booted {
                module,
                private_dir,
            });
        }
        Ok(())
    }

    fn is_booted(&self) -> bool {
        self.booted.read().is_some()
    }

    async fn load_package(&self, name: &str) -> SandboxResult<()> {
        if !self.is_booted() {
            return Err(SandboxError::NotBooted);
        }
        validate_file_name(name).map_err(|_| SandboxError::PackageNotFound {
            name: name.to_string(),
            searched: None,
        })?;

        if self.packages.lock().contains_key(name) {
            return Ok(());
        }

        let resolved = match &self.config.package_dir {
            Some(root) => {
                let dir = root.join(name);
                if !tokio::fs::metadata(&dir).await.is_ok_and(|m| m.is_dir()) {
                    return Err(SandboxError::PackageNotFound {
                        name: name.to_string(),
                        searched: Some(root.display().to_string()),
                    });
                }
                Some(dir)
            }
            None => None,
        };

        match &resolved {
            Some(dir) => debug!(package = name, dir = %dir.display(), "Package loaded"),
            None => debug!(package = name, "Package assumed bundled with interpreter"),
        }
        self.packages.lock().insert(name.to_string(), resolved);
        Ok(())
    }

    fn loaded_packages(&self) -> Vec<String> {
        self.packages.lock().keys().cloned().collect()
    }

    async fn run(&self, source: &str) -> SandboxResult<GuestOutput> {
        let (module, plan) = self.build_plan()?;
        let engine = self.engine.clone();
        let source = source.to_string();

        // The pump lives until the guest returns, not until this future does
        let pump = tokio::spawn(epoch_pump(engine.clone(), plan.deadline_ticks)).abort_handle();

        // Wasmtime execution is synchronous
        let output = tokio::task::spawn_blocking(move || {
            let result = Self::execute_sync(&engine, &module, &source, &plan);
            pump.abort();
            result
        })
        .await
        .map_err(|e| SandboxError::ExecutionFailed(format!("Task join error: {e}")))??;

        debug!(elapsed = ?output.elapsed, stdout_len = output.stdout.len(), "Guest program finished");
        Ok(output)
    }

    async fn write_file(&self, name: &str, bytes: &[u8]) -> SandboxResult<()> {
        validate_file_name(name)?;
        let dir = self.require_private_dir()?;
        tokio::fs::write(dir.join(name), bytes).await?;
        Ok(())
    }

    async fn read_file(&self, name: &str) -> SandboxResult<Option<Vec<u8>>> {
        validate_file_name(name)?;
        let dir = self.require_private_dir()?;
        read_optional(&dir.join(name)).await
    }

    async fn remove_file(&self, name: &str) -> SandboxResult<()> {
        validate_file_name(name)?;
        let dir = self.require_private_dir()?;
        match tokio::fs::remove_file(dir.join(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Epoch ticks covering `timeout`, rounded up.
fn deadline_ticks(timeout: Duration) -> u64 {
    let tick = EPOCH_TICK.as_millis();
    let ticks = timeout.as_millis().div_ceil(tick).max(1);
    u64::try_from(ticks).unwrap_or(u64::MAX)
}

/// Advance the engine epoch once per tick, `ticks` times.
async fn epoch_pump(engine: Engine, ticks: u64) {
    for _ in 0..ticks {
        tokio::time::sleep(EPOCH_TICK).await;
        engine.increment_epoch();
    }
}

async fn read_optional(path: &Path) -> SandboxResult<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Last few stderr lines, or `fallback` when the guest printed nothing.
fn diagnostic(stderr: &str, fallback: &str) -> String {
    let lines: Vec<&str> = stderr.trim_end().lines().collect();
    if lines.is_empty() {
        return fallback.to_string();
    }
    let skip = lines.len().saturating_sub(DIAGNOSTIC_LINES);
    lines[skip..].join("\n")
}

/// Compute SHA-256 hex digest of a byte slice.
fn sha256_hex(input: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hex::encode(hasher.finalize())
}

impl std::fmt::Debug for WasiRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasiRuntime")
            .field("interpreter", &self.config.interpreter)
            .field("booted", &self.is_booted())
            .field("packages", &self.loaded_packages())
            .finish_non_exhaustive()
    }
}
