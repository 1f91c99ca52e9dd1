//! Cross-runtime execution bridge for cloudbridge.
//!
//! Turns a block of host text into a word-cloud PNG by running a generated
//! guest program inside an embedded interpreter sandbox.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Host (readiness gate, owns the single provisioning run)     │
//! │                                                              │
//! │  startup:  Provisioner ── ByteFetcher ──▶ GuestRuntime fs    │
//! │              boot → stage module → stage fonts               │
//! │                                                              │
//! │  trigger:  ExecutionBridge (Idle ⇄ Running)                  │
//! │              ProgramSynthesizer → GuestRuntime::run          │
//! │              ResultExtractor ── result.png ──▶ DataUri       │
//! │              DisplaySurface::show                            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The private filesystem is the only output channel: the guest writes the
//! PNG, the extractor reads it back as raw bytes. Text channels are never
//! used for binary data.

pub mod bridge;
pub mod display;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod host;
pub mod provision;
pub mod synth;
pub mod transport;

pub use bridge::{BridgePhase, BridgeSettings, ExecutionBridge, RunOutcome, SessionState, SkipReason};
pub use display::{DisplaySurface, MemoryDisplay, SharedDisplay};
pub use error::{BridgeError, DisplayError, ExecutionError, ExtractionError, FetchError, ProvisionError};
pub use extract::ResultExtractor;
pub use fetch::{ByteFetcher, HttpFetcher, SharedFetcher, resolve_url};
pub use host::{Host, Readiness};
pub use provision::{Asset, AssetManifest, Provisioned, Provisioner, StagedAsset};
pub use synth::{GuestLayout, GuestProgram, ProgramSynthesizer, RenderSettings};
pub use transport::{DataUri, EncodedAsset, PNG_DATA_URI_PREFIX, PNG_SIGNATURE};
