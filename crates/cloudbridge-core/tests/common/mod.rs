//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cloudbridge_core::{
    Asset, AssetManifest, BridgeSettings, ByteFetcher, ExecutionBridge, FetchError, MemoryDisplay,
    ProgramSynthesizer, Provisioned, Provisioner,
};
use cloudbridge_sandbox::MockRuntime;
use parking_lot::Mutex;
use tokio::sync::Notify;
use url::Url;

pub const MODULE_URL: &str = "https://assets.test/engine/cloud";
pub const FONT_URL: &str = "https://assets.test/PretendardVariable.ttf";

/// Bytes standing in for the precompiled module (magic + flags).
pub const MODULE_BYTES: &[u8] = &[0xA7, 0x0D, 0x0D, 0x0A, 0x00, 0x00, 0x00, 0x00];

/// Bytes standing in for the font.
pub const FONT_BYTES: &[u8] = &[0x00, 0x01, 0x00, 0x00, 0x00, 0x12, 0xFF, 0xFE];

pub fn manifest() -> AssetManifest {
    AssetManifest::new(Asset::new(Url::parse(MODULE_URL).unwrap(), "cloud.pyc")).with_static(
        Asset::new(Url::parse(FONT_URL).unwrap(), "PretendardVariable.ttf"),
    )
}

/// Serves fixed bytes per URL; unknown URLs are a 404.
#[derive(Default)]
pub struct MapFetcher {
    assets: HashMap<String, Vec<u8>>,
    requests: Mutex<Vec<String>>,
}

impl MapFetcher {
    pub fn standard() -> Self {
        Self::default()
            .with(MODULE_URL, MODULE_BYTES)
            .with(FONT_URL, FONT_BYTES)
    }

    pub fn with(mut self, url: &str, bytes: &[u8]) -> Self {
        self.assets.insert(url.to_string(), bytes.to_vec());
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ByteFetcher for MapFetcher {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        self.requests.lock().push(url.to_string());
        self.assets
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}

/// Holds back one URL until released.
pub struct GatedFetcher {
    inner: MapFetcher,
    gated_url: String,
    gate: Arc<Notify>,
}

impl GatedFetcher {
    pub fn new(inner: MapFetcher, gated_url: &str) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let fetcher = Self {
            inner,
            gated_url: gated_url.to_string(),
            gate: gate.clone(),
        };
        (fetcher, gate)
    }
}

#[async_trait]
impl ByteFetcher for GatedFetcher {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        if url.as_str() == self.gated_url {
            self.gate.notified().await;
        }
        self.inner.fetch(url).await
    }
}

pub async fn provision(runtime: Arc<MockRuntime>) -> Provisioned {
    Provisioner::new(runtime, Arc::new(MapFetcher::standard()), manifest())
        .initialize()
        .await
        .unwrap()
}

/// A bridge over a provisioned mock runtime with default settings.
pub async fn bridge(runtime: Arc<MockRuntime>) -> (ExecutionBridge, Arc<MemoryDisplay>) {
    bridge_with(runtime, BridgeSettings::default()).await
}

pub async fn bridge_with(
    runtime: Arc<MockRuntime>,
    settings: BridgeSettings,
) -> (ExecutionBridge, Arc<MemoryDisplay>) {
    let display = Arc::new(MemoryDisplay::new());
    let bridge = ExecutionBridge::new(
        provision(runtime).await,
        ProgramSynthesizer::default(),
        display.clone(),
        settings,
    );
    (bridge, display)
}
