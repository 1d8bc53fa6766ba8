//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the exception bridge:
//! - Logging and tracing infrastructure
//! - Bridge configuration with fail-fast validation
//! - Diagnostic event bus
//!
//! ## Overview
//!
//! Nothing here knows how descriptors are built or delivered; that lives in
//! `core-reporting`. This crate fixes the conventions the reporting code
//! follows: which errors surface at startup, how logs reach the host, and how
//! observers watch the bridge without sitting on the capture path.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{BridgeConfig, BridgeConfigBuilder, SequenceScope};
pub use error::{Error, Result};
pub use events::{CaptureEvent, CoreEvent, DeliveryEvent, DeliveryState, EventBus, EventStream};
