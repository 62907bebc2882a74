//! Unified error types for the gflow power-flow kernel
//!
//! This module provides a common error type [`FlowError`] for every fallible
//! operation exposed at crate boundaries. Numerical methods deliberately do not
//! surface linear-algebra failures through this type: a singular Jacobian is a
//! non-converged solve, not an error. `FlowError` is reserved for malformed
//! input, bad configuration and interrupted runs.
//!
//! # Example
//!
//! ```ignore
//! use gflow_core::{FlowError, FlowResult};
//!
//! fn run(snapshot: &NetworkSnapshot) -> FlowResult<()> {
//!     snapshot.validate()?;
//!     solve(snapshot)?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Unified error type for all gflow operations.
#[derive(Error, Debug)]
pub enum FlowError {
    /// Input data validation errors (array lengths, index ranges, bounds)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Solver/algorithm errors
    #[error("Solver error: {0}")]
    Solver(String),

    /// Linear system could not be factorised
    #[error("Singular matrix: {0}")]
    SingularMatrix(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network structure errors
    #[error("Network error: {0}")]
    Network(String),

    /// The run was interrupted through the cancellation flag
    #[error("Power flow cancelled")]
    Cancelled,

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using FlowError.
pub type FlowResult<T> = Result<T, FlowError>;

// Conversion from anyhow::Error
impl From<anyhow::Error> for FlowError {
    fn from(err: anyhow::Error) -> Self {
        FlowError::Other(err.to_string())
    }
}

impl From<String> for FlowError {
    fn from(s: String) -> Self {
        FlowError::Other(s)
    }
}

impl From<&str> for FlowError {
    fn from(s: &str) -> Self {
        FlowError::Other(s.to_string())
    }
}
