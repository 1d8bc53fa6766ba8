//! Synchronization primitives.
//!
//! Async-aware channels and locks. The bridge relies on `mpsc` for the
//! scripting-to-native hop (FIFO per sender), `oneshot` for flush barriers and
//! `broadcast` for the diagnostic event bus.
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::Mutex;
//!
//! async fn example() {
//!     let mutex = Mutex::new(42);
//!     let mut guard = mutex.lock().await;
//!     *guard += 1;
//! }
//! ```

pub use tokio::sync::{
    broadcast, mpsc, oneshot, watch, Mutex, MutexGuard, Notify, RwLock, RwLockReadGuard,
    RwLockWriteGuard,
};
