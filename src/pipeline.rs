//! Compilation pipeline
//!
//! Wires the passes together, from a parsed term to an evaluator-ready one:
//!
//! 1. Assemble the builtin table (user builtins, pre-CPS atoms, post-CPS
//!    atoms) and label the program against it
//! 2. Run the stochastic 0-CFA to obtain the dynamic mark vector
//! 3. CPS-transform the builtins (post-CPS atoms stay raw) and the program
//! 4. de Bruijn-index everything against the table order
//!
//! The pipeline is invoked once per program; any stage failure aborts that
//! compilation and surfaces as a single [`CompileError`].

use thiserror::Error;

use crate::ast::{Ident, Term};
use crate::builtins;
use crate::cfa::{self, CfaError, Data};
use crate::cps::{Cps, CpsError};
use crate::debruijn::{index_term, IndexError};
use crate::label::{label_program, BindMap, LabelError};

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("labeling failed: {0}")]
    Label(#[from] LabelError),
    #[error("analysis failed: {0}")]
    Cfa(#[from] CfaError),
    #[error("cps transformation failed: {0}")]
    Cps(#[from] CpsError),
    #[error("indexing failed: {0}")]
    Index(#[from] IndexError),
}

/// An evaluator-ready program together with the analysis results the
/// inference backend consumes.
#[derive(Debug)]
pub struct CompiledProgram {
    /// CPS-transformed, de Bruijn-indexed program.
    pub term: Term,
    /// Builtin values in table order, CPS-wrapped where applicable and
    /// indexed; one evaluator environment entry each.
    pub env_terms: Vec<Term>,
    /// Builtin table names, in the order that fixed label assignment.
    pub names: Vec<Ident>,
    /// Builtin name to label.
    pub bmap: BindMap,
    pub n_labels: usize,
    /// Per-label abstract value sets from the analysis.
    pub data: Data,
    /// Dynamic mark vector: the alignment input.
    pub dynamic: Vec<bool>,
}

/// Compile a program against user-supplied builtins.
pub fn compile(
    user_builtins: &[(Ident, Term)],
    program: &Term,
) -> Result<CompiledProgram, CompileError> {
    // Table order is load-bearing: labels and environment positions both
    // follow it.
    let mut entries: Vec<(Ident, Term, bool)> = Vec::new();
    for (name, term) in user_builtins {
        entries.push((name.clone(), term.clone(), true));
    }
    for (name, term) in builtins::pre_cps_atoms() {
        entries.push((name, term, true));
    }
    for (name, term) in builtins::post_cps_atoms() {
        entries.push((name, term, false));
    }
    let names: Vec<Ident> = entries.iter().map(|(name, _, _)| name.clone()).collect();

    let labeled = label_program(&names, program)?;
    let analysis = cfa::analyze(&labeled.bmap, &labeled.term, labeled.n_labels)?;

    let mut cps = Cps::new();
    let mut env_terms = Vec::with_capacity(entries.len());
    for (_, term, wrap) in &entries {
        let transformed = if *wrap { cps.atomic(term)? } else { term.clone() };
        env_terms.push(index_term(&[], &transformed)?);
    }

    let term = cps.program(&labeled.term)?;
    let term = index_term(&names, &term)?;

    Ok(CompiledProgram {
        term,
        env_terms,
        names,
        bmap: labeled.bmap,
        n_labels: labeled.n_labels,
        data: analysis.data,
        dynamic: analysis.dynamic,
    })
}

/// Compile against the stock builtin table.
pub fn compile_with_core(program: &Term) -> Result<CompiledProgram, CompileError> {
    compile(&builtins::core_builtins(), program)
}
