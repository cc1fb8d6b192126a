//! Builtin table
//!
//! Ordered `(name, term)` pairs seeding the global environment. The final
//! table order — user builtins, then pre-CPS PPL atoms, then post-CPS PPL
//! atoms — determines both label assignment and evaluator environment
//! position, so it must be identical across labeling and evaluation.
//!
//! Pre-CPS atoms go through the constant wrapping of the CPS pass like any
//! other builtin; the post-CPS atoms `sample` and `weight` are inserted raw,
//! because their declared arity already accounts for the continuation they
//! receive through ordinary argument passing.

use crate::ast::{AtomId, Ident, Term};

fn table(ids: &[AtomId]) -> Vec<(Ident, Term)> {
    ids.iter()
        .map(|&id| (id.name().to_string(), Term::atom(id)))
        .collect()
}

/// Core operator atoms available to every program.
pub fn core_builtins() -> Vec<(Ident, Term)> {
    table(&[
        AtomId::Not,
        AtomId::And,
        AtomId::Or,
        AtomId::Add,
        AtomId::Sub,
        AtomId::Mul,
        AtomId::Div,
        AtomId::Neg,
        AtomId::Eq,
        AtomId::Neq,
        AtomId::Lt,
        AtomId::Leq,
        AtomId::Gt,
        AtomId::Geq,
    ])
}

/// PPL atoms wrapped by the CPS pass: distribution constructors plus the
/// inference interface.
pub fn pre_cps_atoms() -> Vec<(Ident, Term)> {
    table(&[
        AtomId::Normal,
        AtomId::Uniform,
        AtomId::Gamma,
        AtomId::Exponential,
        AtomId::Bernoulli,
        AtomId::Infer,
        AtomId::Prob,
    ])
}

/// Checkpoint atoms inserted raw, after CPS.
pub fn post_cps_atoms() -> Vec<(Ident, Term)> {
    table(&[AtomId::Sample, AtomId::Weight])
}
