//! Per-request orchestration.
//!
//! [`ExecutionBridge`] turns one trigger into at most one guest execution:
//!
//! ```text
//! text ─▶ blank? ─▶ unchanged? ─▶ Idle→Running ─▶ packages ─▶ synthesize
//!                                                   │
//!   display ◀─ extract ◀─ run (bounded) ◀───────────┘
//! ```
//!
//! A trigger that arrives while another is running is answered with
//! [`RunOutcome::Busy`] and never reaches the sandbox. The bridge stays
//! `Running` until the guest has actually returned, even when the caller
//! timed out or went away first.

use std::sync::Arc;
use std::time::{Duration, Instant};

use cloudbridge_config::SandboxSection;
use cloudbridge_sandbox::{SandboxError, SharedRuntime};
use parking_lot::Mutex;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::display::SharedDisplay;
use crate::error::{BridgeError, ExecutionError};
use crate::extract::ResultExtractor;
use crate::provision::Provisioned;
use crate::synth::ProgramSynthesizer;
use crate::transport::DataUri;

/// Execution parameters that are not part of the guest program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSettings {
    /// Packages ensured before every run.
    pub packages: Vec<String>,
    /// Upper bound for one run; `None` leaves it to the runtime.
    pub execution_timeout: Option<Duration>,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self::from(&SandboxSection::default())
    }
}

impl From<&SandboxSection> for BridgeSettings {
    fn from(section: &SandboxSection) -> Self {
        Self {
            packages: section.packages.clone(),
            execution_timeout: (section.execution_timeout_secs > 0)
                .then(|| Duration::from_secs(section.execution_timeout_secs)),
        }
    }
}

/// Whether a request is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgePhase {
    Idle,
    Running,
}

/// Why a trigger did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Empty or whitespace-only input.
    Blank,
    /// Identical to the last rendered input.
    Unchanged,
}

/// Result of a trigger that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// A new image was rendered and shown.
    Rendered(DataUri),
    Skipped(SkipReason),
    /// Another request was in flight; this one was dropped.
    Busy,
}

/// Per-session memory of the bridge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    last_input: Option<String>,
    renders: u64,
}

impl SessionState {
    /// Text of the last successful render.
    pub fn last_input(&self) -> Option<&str> {
        self.last_input.as_deref()
    }

    /// Number of successful renders.
    pub fn renders(&self) -> u64 {
        self.renders
    }

    fn is_unchanged(&self, text: &str) -> bool {
        self.last_input.as_deref() == Some(text)
    }

    fn record(&mut self, text: &str) {
        self.last_input = Some(text.to_string());
        self.renders += 1;
    }
}

/// Moves the bridge to `Running`, and back to `Idle` once the last clone of
/// the shared guard is dropped.
struct RunningGuard {
    phase: Arc<Mutex<BridgePhase>>,
}

impl RunningGuard {
    fn enter(phase: &Arc<Mutex<BridgePhase>>) -> Option<Arc<Self>> {
        let mut current = phase.lock();
        match *current {
            BridgePhase::Running => None,
            BridgePhase::Idle => {
                *current = BridgePhase::Running;
                Some(Arc::new(Self {
                    phase: Arc::clone(phase),
                }))
            }
        }
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        *self.phase.lock() = BridgePhase::Idle;
    }
}

/// Runs synthesized programs against a provisioned sandbox.
pub struct ExecutionBridge {
    runtime: SharedRuntime,
    synthesizer: ProgramSynthesizer,
    extractor: ResultExtractor,
    display: SharedDisplay,
    settings: BridgeSettings,
    phase: Arc<Mutex<BridgePhase>>,
    session: Mutex<SessionState>,
}

impl ExecutionBridge {
    pub fn new(
        provisioned: Provisioned,
        synthesizer: ProgramSynthesizer,
        display: SharedDisplay,
        settings: BridgeSettings,
    ) -> Self {
        let runtime = provisioned.runtime().clone();
        let extractor = ResultExtractor::new(runtime.clone(), &synthesizer.settings().output);
        Self {
            runtime,
            synthesizer,
            extractor,
            display,
            settings,
            phase: Arc::new(Mutex::new(BridgePhase::Idle)),
            session: Mutex::new(SessionState::default()),
        }
    }

    pub fn phase(&self) -> BridgePhase {
        *self.phase.lock()
    }

    /// Snapshot of the session.
    pub fn session(&self) -> SessionState {
        self.session.lock().clone()
    }

    pub fn synthesizer(&self) -> &ProgramSynthesizer {
        &self.synthesizer
    }

    /// Handle one trigger.
    ///
    /// Blank and unchanged input are skipped without touching the sandbox.
    /// Errors leave the session as it was.
    pub async fn execute(&self, text: &str) -> Result<RunOutcome, BridgeError> {
        if text.trim().is_empty() {
            debug!("Skipping blank input");
            return Ok(RunOutcome::Skipped(SkipReason::Blank));
        }
        if self.session.lock().is_unchanged(text) {
            debug!("Skipping unchanged input");
            return Ok(RunOutcome::Skipped(SkipReason::Unchanged));
        }

        let Some(guard) = RunningGuard::enter(&self.phase) else {
            info!("Request dropped, another render is in flight");
            return Ok(RunOutcome::Busy);
        };

        let request_id = Uuid::new_v4();
        let span = info_span!("render", %request_id, chars = text.chars().count());
        self.render(text, &guard).instrument(span).await
    }

    async fn render(
        &self,
        text: &str,
        guard: &Arc<RunningGuard>,
    ) -> Result<RunOutcome, BridgeError> {
        let started = Instant::now();

        self.ensure_packages().await?;

        let program = self.synthesizer.synthesize(text);
        debug!(bytes = program.source().len(), "Synthesized guest program");

        self.extractor.clear().await.map_err(ExecutionError::Sandbox)?;
        self.run(program.source(), guard).await?;

        let image = self.extractor.extract().await?;
        self.display.show(&image).await?;
        self.session.lock().record(text);

        info!(elapsed_ms = started.elapsed().as_millis() as u64, "Rendered");
        Ok(RunOutcome::Rendered(image))
    }

    async fn ensure_packages(&self) -> Result<(), ExecutionError> {
        for name in &self.settings.packages {
            self.runtime
                .load_package(name)
                .await
                .map_err(|source| ExecutionError::Package {
                    name: name.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Run the guest on its own task, which keeps the bridge `Running` until
    /// the runtime returns.
    async fn run(&self, source: &str, guard: &Arc<RunningGuard>) -> Result<(), ExecutionError> {
        let runtime = Arc::clone(&self.runtime);
        let source = source.to_string();
        let held = Arc::clone(guard);
        let task = tokio::spawn(async move {
            let result = runtime.run(&source).await;
            drop(held);
            result
        });

        let joined = match self.settings.execution_timeout {
            Some(limit) => tokio::time::timeout(limit, task)
                .await
                .map_err(|_| ExecutionError::Timeout(limit))?,
            None => task.await,
        };
        let result = joined.map_err(|e| {
            ExecutionError::Sandbox(SandboxError::ExecutionFailed(format!(
                "Guest task failed: {e}"
            )))
        })?;

        match result {
            Ok(output) => {
                debug!(
                    elapsed_ms = output.elapsed.as_millis() as u64,
                    stdout_bytes = output.stdout.len(),
                    "Guest program finished"
                );
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "Guest program failed");
                Err(err.into())
            }
        }
    }
}

impl std::fmt::Debug for ExecutionBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionBridge")
            .field("runtime", &self.runtime.name())
            .field("settings", &self.settings)
            .field("phase", &self.phase())
            .field("session", &self.session())
            .finish()
    }
}
