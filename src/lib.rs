//! Workspace umbrella crate.
//!
//! Re-exports the individual workspace crates so host applications can depend
//! on `exception-bridge` alone instead of wiring `core-reporting`,
//! `core-runtime` and `bridge-traits` one by one.

pub use bridge_traits as bridge;
pub use core_reporting as reporting;
pub use core_runtime as runtime;

pub use core_reporting::{CaptureOptions, ExceptionReporter};
pub use core_runtime::config::BridgeConfig;
