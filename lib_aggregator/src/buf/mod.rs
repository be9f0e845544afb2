//! # Buffers Module
//!
//! In-memory containers that event-style sources append into and HTTP handlers
//! read from. One buffer instance per payload type; there is no shared
//! heterogeneous buffer.

/// Fixed-capacity circular buffer guarded by a read/write lock.
pub mod ringbuffer;

pub use ringbuffer::{BufferError, RingBuffer};
