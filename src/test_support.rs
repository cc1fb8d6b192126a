//! Test support for the compilation pipeline
//!
//! Term builders (the input surface in place of a parser) and stage
//! shorthands returning `String` errors, so integration tests can assert on
//! any stage without threading the per-stage error types around.

use std::rc::Rc;

use crate::ast::{AtomId, Ident, Label, Term, TermKind};
use crate::cfa::{self, Analysis};
use crate::eval::{Interpreter, Outcome};
use crate::label::{label_program, Labeled};
use crate::pipeline::{compile_with_core, CompiledProgram};

// ============================================================================
// Term builders
// ============================================================================

/// `let name = value in body`, encoded as an immediate application.
pub fn let_in(name: &str, value: Term, body: Term) -> Term {
    Term::app(Term::lam(name, body), value)
}

/// `if cond then t else e`: the branches become thunks, as the surface
/// language always produces them.
pub fn if_then_else(cond: Term, then_t: Term, else_t: Term) -> Term {
    Term::apps(
        Term::if_exp(),
        [cond, Term::lam("_", then_t), Term::lam("_", else_t)],
    )
}

/// Binary operator application. The head is the atom constant itself, the
/// shape the surface language produces for operators; the analysis matches
/// on it to flow both operands to the application.
pub fn op2(id: AtomId, a: Term, b: Term) -> Term {
    Term::apps(Term::atom(id), [a, b])
}

/// Unary operator application, constant-headed like [`op2`].
pub fn op1(id: AtomId, a: Term) -> Term {
    Term::app(Term::atom(id), a)
}

/// `sample d` through the builtin variable.
pub fn sample(dist: Term) -> Term {
    Term::app(Term::var("sample"), dist)
}

/// `weight w` through the builtin variable.
pub fn weight(w: Term) -> Term {
    Term::app(Term::var("weight"), w)
}

// ============================================================================
// Stage shorthands
// ============================================================================

/// Label a term against the stock builtin table.
pub fn label_core(term: &Term) -> Result<Labeled, String> {
    let names: Vec<Ident> = crate::builtins::core_builtins()
        .into_iter()
        .chain(crate::builtins::pre_cps_atoms())
        .chain(crate::builtins::post_cps_atoms())
        .map(|(name, _)| name)
        .collect();
    label_program(&names, term).map_err(|e| format!("label error: {}", e))
}

/// Label and analyze a term against the stock builtin table.
pub fn analyze_core(term: &Term) -> Result<(Labeled, Analysis), String> {
    let labeled = label_core(term)?;
    let analysis = cfa::analyze(&labeled.bmap, &labeled.term, labeled.n_labels)
        .map_err(|e| format!("analysis error: {}", e))?;
    Ok((labeled, analysis))
}

/// Full pipeline against the stock builtin table.
pub fn compile_core(term: &Term) -> Result<CompiledProgram, String> {
    compile_with_core(term).map_err(|e| format!("compile error: {}", e))
}

/// Compile and run to the first outcome.
pub fn run_core(term: &Term) -> Result<Outcome, String> {
    let compiled = compile_core(term)?;
    Interpreter::new()
        .run(&compiled)
        .map_err(|e| format!("eval error: {}", e))
}

/// Compile and run, expecting a plain value.
pub fn run_to_value(term: &Term) -> Result<Rc<Term>, String> {
    match run_core(term)? {
        Outcome::Value(v) => Ok(v),
        other => Err(format!("expected a value, got {:?}", other)),
    }
}

// ============================================================================
// Structure inspection
// ============================================================================

/// Every label attached to the term: node labels everywhere plus the binder
/// labels on lambdas. Together with the builtin labels these must be exactly
/// `[0, n_labels)`.
pub fn collect_labels(term: &Term) -> Vec<Label> {
    let mut out = Vec::new();
    walk(term, &mut |t| {
        out.push(t.attr.label);
        if matches!(t.kind, TermKind::Lam { .. }) {
            out.push(t.attr.var_label);
        }
    });
    out
}

/// True when no `Closure` node appears anywhere in the tree.
pub fn closure_free(term: &Term) -> bool {
    let mut ok = true;
    walk(term, &mut |t| {
        if matches!(t.kind, TermKind::Closure { .. }) {
            ok = false;
        }
    });
    ok
}

/// Visit every labeled node (the substructure of records and projections is
/// atomic to the pipeline and carries no labels).
pub fn walk(term: &Term, f: &mut impl FnMut(&Term)) {
    f(term);
    match &term.kind {
        TermKind::Lam { body, .. } => walk(body, f),
        TermKind::App { func, arg } => {
            walk(func, f);
            walk(arg, f);
        }
        TermKind::Utest { lhs, rhs, next } => {
            walk(lhs, f);
            walk(rhs, f);
            walk(next, f);
        }
        _ => {}
    }
}
