//! # Host Bridge Traits
//!
//! Contracts between the exception bridge core and the host application.
//!
//! ## Overview
//!
//! The bridge captures errors on the scripting side and hands them to a
//! crash/error aggregation pipeline that lives on the native side. This crate
//! holds everything both sides must agree on:
//!
//! - [`ErrorDescriptor`](descriptor::ErrorDescriptor) - the serializable
//!   representation of one captured exception
//! - [`AggregationPipeline`](aggregation::AggregationPipeline) - the host-owned
//!   backend that receives finalized descriptors
//! - [`Clock`](time::Clock) - time source for capture timestamps
//! - [`LoggerSink`](time::LoggerSink) - forwards bridge logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Pipeline adapter | Status |
//! |----------|------------------|--------|
//! | iOS      | crash SDK wrapper | 📋 Planned |
//! | Android  | agent wrapper     | 📋 Planned |
//! | Desktop  | host supplied     | ✅ |
//!
//! ## Error Handling
//!
//! Bridge operations return [`BridgeError`](error::BridgeError). Pipeline
//! acceptance is the exception: it returns
//! [`RejectKind`](aggregation::RejectKind) so the delivery guard can tell a
//! transient failure from a permanent rejection.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync`; the native side drives them from a
//! worker task that may run on any runtime thread.

pub mod aggregation;
pub mod descriptor;
pub mod error;
pub mod time;

pub use error::BridgeError;

pub use aggregation::{Ack, AggregationPipeline, DropReport, Readiness, ReadinessStream, RejectKind};
pub use descriptor::{
    AttributeValue, Attributes, Breadcrumb, ErrorDescriptor, ReportLevel, SequenceId, StackFrame,
    DEFAULT_ERROR_NAME,
};
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, SystemClock};
