//! Wiring from configuration to a running host.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use cloudbridge_config::{CloudbridgeConfig, SandboxSection};
use cloudbridge_core::{
    AssetManifest, BridgeSettings, GuestLayout, Host, HttpFetcher, ProgramSynthesizer,
    Provisioner, RenderSettings, SharedDisplay,
};
use cloudbridge_sandbox::{SharedRuntime, WasiRuntime, WasiRuntimeConfig};

/// Synthesizer for the configured render bundle and guest layout.
pub fn synthesizer(config: &CloudbridgeConfig) -> ProgramSynthesizer {
    ProgramSynthesizer::new(
        RenderSettings::from(&config.render()),
        GuestLayout::from_config(&config.sandbox(), &config.assets()),
    )
}

/// Build the Wasmtime runtime described by `[sandbox]`.
pub fn build_runtime(sandbox: &SandboxSection) -> Result<SharedRuntime> {
    let interpreter = sandbox.interpreter.as_ref().ok_or_else(|| {
        anyhow!(
            "No interpreter configured: set [sandbox].interpreter to a wasm32-wasip1 Python build"
        )
    })?;

    let mut config = WasiRuntimeConfig::new(interpreter)
        .with_command(&sandbox.program_name, sandbox.args.clone())
        .with_workdir(&sandbox.workdir)
        .with_package_path_env(&sandbox.package_path_env);

    if let Some(dir) = &sandbox.package_dir {
        config = config.with_package_dir(dir);
    }
    for mount in &sandbox.mounts {
        config = config.add_mount(&mount.host, &mount.guest);
    }
    for (key, value) in &sandbox.env {
        config = config.add_env(key, value);
    }
    if sandbox.execution_timeout_secs > 0 {
        config = config.with_timeout(Duration::from_secs(sandbox.execution_timeout_secs));
    }

    Ok(Arc::new(WasiRuntime::new(config)?))
}

/// Build the provisioner described by `[assets]` and `[sandbox]`.
pub fn build_provisioner(config: &CloudbridgeConfig, runtime: SharedRuntime) -> Result<Provisioner> {
    let assets = config.assets();
    let sandbox = config.sandbox();

    let fetcher = HttpFetcher::new(Duration::from_secs(assets.fetch_timeout_secs))?;
    let manifest = AssetManifest::from_config(&assets)?;

    let mut provisioner = Provisioner::new(runtime, Arc::new(fetcher), manifest);
    if assets.provision_timeout_secs > 0 {
        provisioner =
            provisioner.with_timeout(Duration::from_secs(assets.provision_timeout_secs));
    }
    if sandbox.preload_packages {
        provisioner = provisioner.with_preload(sandbox.packages.clone());
    }
    Ok(provisioner)
}

/// Validate config and start provisioning in the background.
pub fn launch(config: &CloudbridgeConfig, display: SharedDisplay) -> Result<Host> {
    config.validate()?;
    let sandbox = config.sandbox();
    let runtime = build_runtime(&sandbox)?;
    let provisioner = build_provisioner(config, runtime)?;

    Ok(Host::launch(
        provisioner,
        synthesizer(config),
        display,
        BridgeSettings::from(&sandbox),
    ))
}
