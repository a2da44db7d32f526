//! # Bastion Core
//!
//! Core types shared by every Bastion crate: the error taxonomy used across
//! the cache layer, the `Loader` capability through which the authoritative
//! store is reached, and tracing/telemetry initialization.

pub mod error;
pub mod result;
pub mod telemetry;
pub mod traits;

pub use error::*;
pub use result::*;
pub use traits::*;
