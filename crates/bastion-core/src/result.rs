//! Result type aliases for Bastion.

use crate::BastionError;

/// A specialized `Result` type for Bastion operations.
pub type BastionResult<T> = Result<T, BastionError>;
