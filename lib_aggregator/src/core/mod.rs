//! # Core Cache Module
//!
//! The pieces every provider builds on. Background jobs produce values, and
//! HTTP handlers only ever read the last value that was fully produced.
//!
//! ## Core Components:
//!
//! - **`scheduler`**: runs named jobs on fixed periods, one task per job,
//!   never overlapping a job with itself.
//! - **`retry`**: fixed-delay retry of a single unit of remote work, aborted
//!   by the shared cancellation token.
//! - **`fanout`**: bounded-concurrency fetch over a list of resources with a
//!   barrier join, per-resource failure records and page collection.
//! - **`snapshot`**: atomic publication of immutable aggregates for
//!   lock-free readers.
//! - **`versions`**: lenient tag parsing and newest-release selection.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Bounded-concurrency fan-out with merge and failure records.
pub mod fanout;
/// Fixed-delay retry with cancellation.
pub mod retry;
/// Periodic job scheduler.
pub mod scheduler;
/// Atomically swapped snapshots.
pub mod snapshot;
/// Newest-version selection over raw tags.
pub mod versions;

pub use fanout::{collect_pages, FanOut, FanOutReport, Page, ResourceFailure, ResourceName};
pub use retry::{retry, RetryError, RetryPolicy};
pub use scheduler::{Scheduler, SchedulerError};
pub use snapshot::SnapshotStore;
pub use versions::{latest_version, Version};
