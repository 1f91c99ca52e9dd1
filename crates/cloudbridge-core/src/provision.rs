//! One-time sandbox provisioning.
//!
//! Boots the guest runtime and stages every remote asset into its private
//! filesystem. The only way to obtain a [`Provisioned`] handle is a
//! successful [`Provisioner::initialize`], so nothing downstream can run
//! against a half-prepared sandbox.

use std::time::Duration;

use cloudbridge_config::AssetsSection;
use cloudbridge_sandbox::SharedRuntime;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use url::Url;

use crate::error::{FetchError, ProvisionError};
use crate::fetch::{SharedFetcher, resolve_url};

/// A remote resource staged into the sandbox under `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub url: Url,
    pub target: String,
}

impl Asset {
    pub fn new(url: Url, target: impl Into<String>) -> Self {
        Self {
            url,
            target: target.into(),
        }
    }
}

/// Everything provisioning stages: the library module, then static files.
#[derive(Debug, Clone)]
pub struct AssetManifest {
    pub module: Asset,
    pub static_assets: Vec<Asset>,
}

impl AssetManifest {
    pub fn new(module: Asset) -> Self {
        Self {
            module,
            static_assets: Vec::new(),
        }
    }

    pub fn with_static(mut self, asset: Asset) -> Self {
        self.static_assets.push(asset);
        self
    }

    /// Resolve the `[assets]` section into absolute URLs.
    pub fn from_config(section: &AssetsSection) -> Result<Self, FetchError> {
        let base = section
            .base_url
            .as_deref()
            .map(|raw| {
                Url::parse(raw).map_err(|e| FetchError::InvalidUrl {
                    url: raw.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        let module = Asset::new(
            resolve_url(base.as_ref(), &section.module.url)?,
            &section.module.target,
        );
        let static_assets = section
            .static_files
            .iter()
            .map(|entry| -> Result<Asset, FetchError> {
                Ok(Asset::new(resolve_url(base.as_ref(), &entry.url)?, &entry.target))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            module,
            static_assets,
        })
    }

    /// Assets in staging order.
    pub fn iter(&self) -> impl Iterator<Item = &Asset> {
        std::iter::once(&self.module).chain(self.static_assets.iter())
    }
}

/// Record of one file written into the sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedAsset {
    pub target: String,
    pub bytes: usize,
    pub sha256: String,
}

/// Proof that the sandbox is booted and every asset is staged.
pub struct Provisioned {
    runtime: SharedRuntime,
    staged: Vec<StagedAsset>,
    preloaded: Vec<String>,
}

impl Provisioned {
    pub fn runtime(&self) -> &SharedRuntime {
        &self.runtime
    }

    pub fn staged(&self) -> &[StagedAsset] {
        &self.staged
    }

    /// Packages loaded during provisioning.
    pub fn preloaded(&self) -> &[String] {
        &self.preloaded
    }
}

impl std::fmt::Debug for Provisioned {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioned")
            .field("runtime", &self.runtime.name())
            .field("staged", &self.staged)
            .field("preloaded", &self.preloaded)
            .finish()
    }
}

/// Prepares a guest runtime for execution.
pub struct Provisioner {
    runtime: SharedRuntime,
    fetcher: SharedFetcher,
    manifest: AssetManifest,
    preload: Vec<String>,
    timeout: Option<Duration>,
}

impl Provisioner {
    pub fn new(runtime: SharedRuntime, fetcher: SharedFetcher, manifest: AssetManifest) -> Self {
        Self {
            runtime,
            fetcher,
            manifest,
            preload: Vec::new(),
            timeout: None,
        }
    }

    /// Load these packages as part of provisioning.
    pub fn with_preload(mut self, packages: Vec<String>) -> Self {
        self.preload = packages;
        self
    }

    /// Bound the whole sequence.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn manifest(&self) -> &AssetManifest {
        &self.manifest
    }

    /// Boot, stage the module, then stage static assets.
    ///
    /// Consumes the provisioner, so a value provisions at most once. Any
    /// failure aborts the sequence.
    pub async fn initialize(self) -> Result<Provisioned, ProvisionError> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.provision())
                .await
                .map_err(|_| ProvisionError::Timeout(limit))?,
            None => self.provision().await,
        }
    }

    async fn provision(&self) -> Result<Provisioned, ProvisionError> {
        info!(runtime = self.runtime.name(), "Provisioning sandbox");
        self.runtime.boot().await.map_err(ProvisionError::Boot)?;

        let mut staged = Vec::new();
        for asset in self.manifest.iter() {
            staged.push(self.stage(asset).await?);
        }

        for name in &self.preload {
            self.runtime
                .load_package(name)
                .await
                .map_err(|source| ProvisionError::Package {
                    name: name.clone(),
                    source,
                })?;
        }

        info!(
            assets = staged.len(),
            packages = self.preload.len(),
            "Sandbox provisioned"
        );

        Ok(Provisioned {
            runtime: self.runtime.clone(),
            staged,
            preloaded: self.preload.clone(),
        })
    }

    async fn stage(&self, asset: &Asset) -> Result<StagedAsset, ProvisionError> {
        debug!(url = %asset.url, target = %asset.target, "Fetching asset");
        let encoded = self
            .fetcher
            .fetch_encoded(&asset.url)
            .await
            .map_err(|source| ProvisionError::Fetch {
                target: asset.target.clone(),
                source,
            })?;

        let bytes = encoded.decode().map_err(|source| ProvisionError::Decode {
            target: asset.target.clone(),
            source,
        })?;

        self.runtime
            .write_file(&asset.target, &bytes)
            .await
            .map_err(|source| ProvisionError::Stage {
                target: asset.target.clone(),
                source,
            })?;

        let sha256 = hex::encode(Sha256::digest(&bytes));
        info!(
            target = %asset.target,
            bytes = bytes.len(),
            sha256 = %sha256,
            "Staged asset"
        );

        Ok(StagedAsset {
            target: asset.target.clone(),
            bytes: bytes.len(),
            sha256,
        })
    }
}
