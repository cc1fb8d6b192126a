//! Tuff - compilation core for a probabilistic programming language
//!
//! Programs are call-by-value lambda terms with probabilistic primitives.
//! Before evaluation, a program is (a) analyzed by a stochastic 0-CFA that
//! finds the subterms that may depend on random choices, and (b) transformed
//! into continuation-passing style so that the `sample` and `weight`
//! checkpoints can be intercepted by inference:
//!
//! ```text
//! term ──► label ──► cfa (constraints → solve → dynamic marks)
//!   │
//!   └────► cps ──► debruijn ──► eval (checkpoint outcomes)
//! ```

pub mod ast;
pub mod builtins;
pub mod cfa;
pub mod cps;
pub mod debruijn;
pub mod eval;
pub mod label;
pub mod pipeline;
pub mod test_support;

pub use ast::{AtomId, Constant, Dist, Term, TermKind};
pub use cfa::{analyze, AbsVal, Analysis};
pub use cps::Cps;
pub use eval::{Interpreter, Outcome};
pub use label::label_program;
pub use pipeline::{compile, compile_with_core, CompiledProgram};
