//! Executor facade for the exception bridge.
//!
//! The scripting side of the bridge captures errors synchronously; everything
//! after the transport hop runs on an async executor owned by the host. This
//! crate pins that executor to Tokio in one place so the other workspace
//! crates depend on `core-async` instead of naming Tokio directly.
//!
//! # Modules
//!
//! - `runtime`: runtime handles and `block_on`
//! - `task`: task spawning
//! - `sync`: channels and async locks
//! - `time`: sleeps, intervals and wall-clock helpers
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::mpsc;
//! use core_async::task;
//!
//! async fn example() {
//!     let (tx, mut rx) = mpsc::unbounded_channel::<u64>();
//!     let consumer = task::spawn(async move { rx.recv().await });
//!
//!     tx.send(1).ok();
//!     assert_eq!(consumer.await.unwrap(), Some(1));
//! }
//! ```

pub use core_async_macros::{main, test};

pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

pub use task::spawn;
pub use time::{sleep, Duration, Instant};
