use super::backend::{FaerSolver, GaussSolver, LinearSystemBackend};
use crate::error::{FlowError, FlowResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

/// Simple registry of available linear-system backends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinearSolverKind {
    Gauss,
    #[default]
    Faer,
}

impl FromStr for LinearSolverKind {
    type Err = FlowError;

    fn from_str(input: &str) -> FlowResult<Self> {
        match input.to_ascii_lowercase().as_str() {
            "gauss" => Ok(LinearSolverKind::Gauss),
            "faer" | "default" | "lu" => Ok(LinearSolverKind::Faer),
            other => Err(FlowError::Config(format!(
                "unknown linear solver '{}'; supported values: gauss, faer",
                other
            ))),
        }
    }
}

impl LinearSolverKind {
    pub fn build_solver(self) -> Arc<dyn LinearSystemBackend> {
        match self {
            LinearSolverKind::Gauss => Arc::new(GaussSolver),
            LinearSolverKind::Faer => Arc::new(FaerSolver),
        }
    }

    pub fn available() -> &'static [&'static str] {
        &["gauss", "faer"]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LinearSolverKind::Gauss => "gauss",
            LinearSolverKind::Faer => "faer",
        }
    }
}
