//! # Configuration Modules
//!
//! Settings shared by the refresh jobs. Values are supplied once at
//! construction; nothing here is re-read at runtime.

/// Refresh periods, retry parameters and fan-out width.
pub mod refresh;

pub use refresh::RefreshSettings;
