//! de Bruijn indexing
//!
//! Resolves every variable occurrence to its lexical depth: the number of
//! binders between the use and its binder. Runs after CPS, on the main
//! program (with the builtin table names in scope) and on every builtin
//! term (closed). Names, including the `$n` binders introduced by CPS, are
//! kept for debugging; only `idx` is consulted by the evaluator.

use std::rc::Rc;

use thiserror::Error;

use crate::ast::{Ident, Term, TermKind};

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("unbound variable during indexing: {0}")]
    Unbound(Ident),
    #[error("closure before evaluation")]
    ClosureBeforeEval,
}

/// Index a term against the given scope of free names, outermost first.
pub fn index_term(names: &[Ident], term: &Term) -> Result<Term, IndexError> {
    let mut scope: Vec<Ident> = names.to_vec();
    index(&mut scope, term)
}

fn index(scope: &mut Vec<Ident>, term: &Term) -> Result<Term, IndexError> {
    let attr = term.attr;
    match &term.kind {
        TermKind::Var { name, .. } => {
            let pos = scope
                .iter()
                .rposition(|n| n == name)
                .ok_or_else(|| IndexError::Unbound(name.clone()))?;
            Ok(Term {
                kind: TermKind::Var {
                    name: name.clone(),
                    idx: scope.len() - 1 - pos,
                },
                attr,
            })
        }
        TermKind::Lam { param, body } => {
            scope.push(param.clone());
            let body = index(scope, body);
            scope.pop();
            Ok(Term {
                kind: TermKind::Lam {
                    param: param.clone(),
                    body: Rc::new(body?),
                },
                attr,
            })
        }
        TermKind::App { func, arg } => {
            let func = index(scope, func)?;
            let arg = index(scope, arg)?;
            Ok(Term {
                kind: TermKind::App {
                    func: Rc::new(func),
                    arg: Rc::new(arg),
                },
                attr,
            })
        }
        TermKind::Utest { lhs, rhs, next } => {
            let lhs = index(scope, lhs)?;
            let rhs = index(scope, rhs)?;
            let next = index(scope, next)?;
            Ok(Term {
                kind: TermKind::Utest {
                    lhs: Rc::new(lhs),
                    rhs: Rc::new(rhs),
                    next: Rc::new(next),
                },
                attr,
            })
        }
        // Records and projections are atomic to the earlier passes, but the
        // evaluator does reach into them, so their names must resolve.
        TermKind::Record(fields) => {
            let mut indexed = Vec::with_capacity(fields.len());
            for (name, field) in fields {
                indexed.push((name.clone(), Rc::new(index(scope, field)?)));
            }
            Ok(Term {
                kind: TermKind::Record(indexed),
                attr,
            })
        }
        TermKind::Proj { term: inner, field } => {
            let inner = index(scope, inner)?;
            Ok(Term {
                kind: TermKind::Proj {
                    term: Rc::new(inner),
                    field: field.clone(),
                },
                attr,
            })
        }
        TermKind::Const(_) | TermKind::If | TermKind::Fix | TermKind::Nop => Ok(term.clone()),
        TermKind::Closure { .. } => Err(IndexError::ClosureBeforeEval),
    }
}
