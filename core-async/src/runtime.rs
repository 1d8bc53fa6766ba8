//! Runtime handles and blocking entry points.

pub use tokio::runtime::{Builder, Handle, Runtime};

/// Runs the provided future to completion on a fresh current-thread runtime.
///
/// Used by the `#[core_async::test]` and `#[core_async::main]` expansions.
/// Must not be called from inside another runtime.
pub fn block_on<F>(future: F) -> F::Output
where
    F: std::future::Future,
{
    Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("core_async::runtime::block_on: failed to build Tokio runtime")
        .block_on(future)
}

/// Returns a handle to the runtime driving the current thread, if any.
///
/// Synchronous entry points use this to decide whether they can spawn
/// background work without owning a runtime themselves.
pub fn try_current() -> Option<Handle> {
    Handle::try_current().ok()
}
