//! # lib_aggregator
//!
//! Background-refreshed snapshot cache for slow, rate-limited remote sources,
//! plus the provider clients that feed it.
//!
//! Modules are gated behind Cargo features so that a consumer which only
//! needs the cache primitives does not pull in the HTTP stack.

#[cfg(feature = "core")]
pub mod buf;

#[cfg(feature = "core")]
pub mod core;

#[cfg(feature = "configs")]
pub mod configs;

#[cfg(feature = "retrieve")]
pub mod retrieve;

#[cfg(feature = "providers")]
pub mod providers;
