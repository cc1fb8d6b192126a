//! Stochastic 0-CFA
//!
//! Context-insensitive control-flow analysis that propagates a stochastic
//! taint from `sample` call sites through the program:
//!
//! 1. Generate constraints over an abstract-value domain (`constraints`)
//! 2. Solve them with a worklist fixpoint (`solve`)
//! 3. Mark the labels that may depend on stochastic choices (`dynamic`)
//!
//! The result feeds the alignment step downstream: dynamic labels are the
//! program points where inference checkpoints may differ between runs.

pub mod constraints;
pub mod dynamic;
pub mod solve;

use thiserror::Error;

pub use constraints::{generate, AbsVal, Constraint};
pub use dynamic::mark;
pub use solve::{solve, Data};

use crate::ast::Term;
use crate::label::BindMap;

#[derive(Error, Debug)]
pub enum CfaError {
    #[error("builtin `{0}` missing from the binding map")]
    MissingBuiltin(&'static str),
    #[error("closure reached the analysis")]
    ClosureInAnalysis,
}

/// Full analysis result: per-label abstract value sets and the dynamic mark
/// vector consumed by alignment.
#[derive(Debug)]
pub struct Analysis {
    pub data: Data,
    pub dynamic: Vec<bool>,
}

/// Run the complete analysis over a labeled term.
pub fn analyze(bmap: &BindMap, term: &Term, n_labels: usize) -> Result<Analysis, CfaError> {
    let cs = generate(bmap, term)?;
    let data = solve(&cs, n_labels);
    let dynamic = mark(term, &data)?;
    Ok(Analysis { data, dynamic })
}
