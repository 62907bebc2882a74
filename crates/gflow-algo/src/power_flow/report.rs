//! Per-outer-iteration convergence report.

use super::options::SolverType;
use serde::Serialize;
use std::fmt;

/// One inner solve.
#[derive(Debug, Clone, Serialize)]
pub struct ReportRow {
    pub method: SolverType,
    pub converged: bool,
    /// Mismatch norm at exit
    pub error: f64,
    pub elapsed_seconds: f64,
    pub inner_iterations: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConvergenceReport {
    pub rows: Vec<ReportRow>,
}

impl ConvergenceReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, row: ReportRow) {
        self.rows.push(row);
    }

    /// Append every row of `other`
    pub fn extend(&mut self, other: ConvergenceReport) {
        self.rows.extend(other.rows);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// True when there is at least one row and every row converged
    pub fn all_converged(&self) -> bool {
        !self.rows.is_empty() && self.rows.iter().all(|r| r.converged)
    }

    pub fn total_iterations(&self) -> usize {
        self.rows.iter().map(|r| r.inner_iterations).sum()
    }

    pub fn total_elapsed(&self) -> f64 {
        self.rows.iter().map(|r| r.elapsed_seconds).sum()
    }

    pub fn methods(&self) -> Vec<SolverType> {
        self.rows.iter().map(|r| r.method).collect()
    }
}

impl fmt::Display for ConvergenceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<24} {:>9} {:>12} {:>12} {:>10}",
            "method", "converged", "error", "elapsed (s)", "iterations"
        )?;
        writeln!(f, "{}", "-".repeat(71))?;
        for row in &self.rows {
            writeln!(
                f,
                "{:<24} {:>9} {:>12.3e} {:>12.6} {:>10}",
                row.method.as_str(),
                row.converged,
                row.error,
                row.elapsed_seconds,
                row.inner_iterations
            )?;
        }
        Ok(())
    }
}
