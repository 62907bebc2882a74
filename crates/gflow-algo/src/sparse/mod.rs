//! # Sparse Matrix Infrastructure for Power Flow
//!
//! Power grids are inherently sparse: a 10,000-bus network might have only
//! 15,000 branches. Every admittance matrix here is kept in CSR form (`sprs`)
//! and densified only for the reduced blocks handed to a linear solver.
//!
//! ## Module Organization
//!
//! - [`complex`]: Complex matrix stored as real (G) and imaginary (B) CSR halves
//! - [`real`]: Row iteration, slicing and block products for real CSR matrices
//! - [`admittance`]: Ybus / Yf / Yt / Yseries / B′ / B″ assembly and tap recompute

pub mod admittance;
pub mod complex;
pub mod real;

// Re-export main types
pub use admittance::{AdmittanceError, AdmittanceModel, BranchPrimitive};
pub use complex::SparseComplexMatrix;
