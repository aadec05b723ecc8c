//! Shared controller plumbing
//!
//! - [`ObjectStore`]: version-guarded reads and writes of cluster objects,
//!   backed by [`KubeStore`] in production and [`MemoryStore`] in tests.
//! - [`finalizer`]: finalizer checks and updates on top of [`ObjectStore`].
//! - [`FibonacciBackoff`]: per-object retry delays.

pub mod backoff;
pub mod finalizer;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod store;

pub use backoff::{BackoffTracker, FibonacciBackoff};
#[cfg(any(test, feature = "test-util"))]
pub use mock::MemoryStore;
pub use store::{KubeStore, ObjectStore, StoreError};
