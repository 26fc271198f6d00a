//! Scheduling core for lingua-ci.
//!
//! Watches version-control pushes, classifies them against the cached
//! tree/branch/locale metadata, coalesces (tree, locale) build triggers,
//! and dispatches comparison build requests with pinned revisions.

pub mod dispatch;
pub mod fetch;
pub mod loader;
pub mod registry;
pub mod scheduler;
pub mod weave;

pub use loader::TreeLoader;
pub use registry::TreeRegistry;
pub use scheduler::AppScheduler;
pub use weave::DirScheduler;
