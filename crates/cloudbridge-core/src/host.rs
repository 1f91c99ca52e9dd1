//! Session lifecycle and readiness gate.
//!
//! [`Host::launch`] starts provisioning in the background exactly once and
//! publishes its progress on a watch channel. Triggers wait on that channel,
//! so nothing executes before the sandbox is ready, and a failed
//! provisioning disables the feature for the rest of the session.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::bridge::{BridgeSettings, ExecutionBridge, RunOutcome};
use crate::display::SharedDisplay;
use crate::error::BridgeError;
use crate::provision::Provisioner;
use crate::synth::ProgramSynthesizer;

/// Public view of the provisioning state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Provisioning,
    Ready,
    Unavailable(String),
}

enum HostState {
    Provisioning,
    Ready(Arc<ExecutionBridge>),
    Unavailable(String),
}

/// Owns the single provisioning run and the bridge it produces.
pub struct Host {
    state: watch::Receiver<HostState>,
    task: JoinHandle<()>,
}

impl Host {
    /// Spawn provisioning. Must be called inside a tokio runtime.
    pub fn launch(
        provisioner: Provisioner,
        synthesizer: ProgramSynthesizer,
        display: SharedDisplay,
        settings: BridgeSettings,
    ) -> Self {
        let (tx, rx) = watch::channel(HostState::Provisioning);

        let task = tokio::spawn(async move {
            let next = match provisioner.initialize().await {
                Ok(provisioned) => {
                    info!(staged = provisioned.staged().len(), "Word cloud ready");
                    let bridge = ExecutionBridge::new(provisioned, synthesizer, display, settings);
                    HostState::Ready(Arc::new(bridge))
                }
                Err(err) => {
                    error!(error = %err, "Provisioning failed, word cloud disabled");
                    HostState::Unavailable(err.to_string())
                }
            };
            // Receivers may all be gone if the host was dropped mid-provision
            let _ = tx.send(next);
        });

        Self { state: rx, task }
    }

    pub fn readiness(&self) -> Readiness {
        match &*self.state.borrow() {
            HostState::Provisioning => Readiness::Provisioning,
            HostState::Ready(_) => Readiness::Ready,
            HostState::Unavailable(reason) => Readiness::Unavailable(reason.clone()),
        }
    }

    /// Wait for provisioning to resolve and return the bridge.
    pub async fn wait_ready(&self) -> Result<Arc<ExecutionBridge>, BridgeError> {
        let mut rx = self.state.clone();
        let state = rx
            .wait_for(|state| !matches!(state, HostState::Provisioning))
            .await
            .map_err(|_| BridgeError::Unavailable("provisioning task ended unexpectedly".into()))?;

        match &*state {
            HostState::Ready(bridge) => Ok(bridge.clone()),
            HostState::Unavailable(reason) => Err(BridgeError::Unavailable(reason.clone())),
            HostState::Provisioning => Err(BridgeError::Unavailable(
                "provisioning did not complete".into(),
            )),
        }
    }

    /// Handle one trigger once the sandbox is ready.
    pub async fn run(&self, text: &str) -> Result<RunOutcome, BridgeError> {
        let bridge = self.wait_ready().await?;
        bridge.execute(text).await
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("readiness", &self.readiness())
            .finish()
    }
}
