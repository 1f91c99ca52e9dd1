//! Guest runtimes for the cloudbridge execution bridge.
//!
//! A guest runtime is an isolated interpreter with its own private
//! filesystem. The bridge only needs five capabilities from it, captured by
//! the [`GuestRuntime`] trait:
//!
//! - boot the runtime,
//! - load a package by name,
//! - execute a source string asynchronously,
//! - write a file into the private filesystem,
//! - read a file back out of it as raw bytes.
//!
//! # Implementations
//!
//! | Runtime | Backend | Use |
//! |---------|---------|-----|
//! | [`WasiRuntime`] | Wasmtime + WASI preview 1 | production (e.g. a CPython `wasm32-wasip1` build) |
//! | [`MockRuntime`] | in-memory | tests and embedding |
//!
//! # Example
//!
//! ```no_run
//! use cloudbridge_sandbox::{GuestRuntime, WasiRuntime, WasiRuntimeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = WasiRuntime::new(WasiRuntimeConfig::new("/opt/python.wasm"))?;
//!     runtime.boot().await?;
//!     runtime.write_file("hello.txt", b"hi").await?;
//!     runtime.run("print(open('hello.txt').read())").await?;
//!     Ok(())
//! }
//! ```

mod error;
mod mock;
mod runtime;
mod wasi;

pub use error::{SandboxError, SandboxResult};
pub use mock::{MockRun, MockRuntime, TINY_PNG};
pub use runtime::{GuestOutput, GuestRuntime, SharedRuntime, validate_file_name};
pub use wasi::{WasiRuntime, WasiRuntimeConfig};
