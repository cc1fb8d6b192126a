//! Labeling Pass
//!
//! Assigns a unique integer label to every subterm and every binding site.
//! Builtin names are consumed first, in table order, so that label assignment
//! and evaluator environment position agree. Two passes over the term follow:
//!
//! 1. Bind variables: allocate a fresh label per `Lam` binder and resolve
//!    every `Var` to the label of its binder, innermost binding winning.
//! 2. Label terms: assign a label to every node.
//!
//! Labels are dense in `[0, n_labels)`; the analysis arrays are indexed by
//! them directly.

use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;

use crate::ast::{Attr, Ident, Label, Term, TermKind};

#[derive(Error, Debug)]
pub enum LabelError {
    #[error("unbound variable: {0}")]
    Unbound(Ident),
    #[error("closure in source program")]
    ClosureInSource,
}

/// Map from builtin name to its label.
#[derive(Debug, Clone, Default)]
pub struct BindMap {
    map: HashMap<Ident, Label>,
}

impl BindMap {
    pub fn get(&self, name: &str) -> Option<Label> {
        self.map.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Ident, Label)> {
        self.map.iter().map(|(name, label)| (name, *label))
    }
}

/// Result of labeling: the relabeled term, the builtin map, and the total
/// number of labels allocated.
#[derive(Debug, Clone)]
pub struct Labeled {
    pub term: Term,
    pub bmap: BindMap,
    pub n_labels: usize,
}

/// Monotonic label allocator.
#[derive(Debug, Default)]
struct LabelGen {
    next: Label,
}

impl LabelGen {
    fn fresh(&mut self) -> Label {
        let label = self.next;
        self.next += 1;
        label
    }
}

/// Label a program against an ordered list of builtin names.
pub fn label_program(builtins: &[Ident], term: &Term) -> Result<Labeled, LabelError> {
    let mut gen = LabelGen::default();

    let mut bmap = BindMap::default();
    for name in builtins {
        let label = gen.fresh();
        bmap.map.insert(name.clone(), label);
    }

    let env: HashMap<Ident, Label> = bmap.map.clone();
    let bound = bind_vars(&mut gen, &env, term)?;
    let term = assign_labels(&mut gen, &bound)?;

    Ok(Labeled {
        term,
        bmap,
        n_labels: gen.next,
    })
}

/// Pass 1: resolve every variable occurrence to the label of its binder.
fn bind_vars(
    gen: &mut LabelGen,
    env: &HashMap<Ident, Label>,
    term: &Term,
) -> Result<Term, LabelError> {
    let attr = term.attr;
    match &term.kind {
        TermKind::Var { name, idx } => {
            let binder = *env
                .get(name)
                .ok_or_else(|| LabelError::Unbound(name.clone()))?;
            Ok(Term {
                kind: TermKind::Var {
                    name: name.clone(),
                    idx: *idx,
                },
                attr: Attr {
                    label: attr.label,
                    var_label: binder,
                },
            })
        }
        TermKind::Lam { param, body } => {
            let binder = gen.fresh();
            let mut inner = env.clone();
            inner.insert(param.clone(), binder);
            let body = bind_vars(gen, &inner, body)?;
            Ok(Term {
                kind: TermKind::Lam {
                    param: param.clone(),
                    body: Rc::new(body),
                },
                attr: Attr {
                    label: attr.label,
                    var_label: binder,
                },
            })
        }
        TermKind::App { func, arg } => {
            let func = bind_vars(gen, env, func)?;
            let arg = bind_vars(gen, env, arg)?;
            Ok(Term {
                kind: TermKind::App {
                    func: Rc::new(func),
                    arg: Rc::new(arg),
                },
                attr,
            })
        }
        TermKind::Utest { lhs, rhs, next } => {
            let lhs = bind_vars(gen, env, lhs)?;
            let rhs = bind_vars(gen, env, rhs)?;
            let next = bind_vars(gen, env, next)?;
            Ok(Term {
                kind: TermKind::Utest {
                    lhs: Rc::new(lhs),
                    rhs: Rc::new(rhs),
                    next: Rc::new(next),
                },
                attr,
            })
        }
        // Atomic to this pass: no substructure rebinding.
        TermKind::Const(_)
        | TermKind::If
        | TermKind::Fix
        | TermKind::Record(_)
        | TermKind::Proj { .. }
        | TermKind::Nop => Ok(term.clone()),
        TermKind::Closure { .. } => Err(LabelError::ClosureInSource),
    }
}

/// Pass 2: assign a fresh label to every node.
fn assign_labels(gen: &mut LabelGen, term: &Term) -> Result<Term, LabelError> {
    let label = gen.fresh();
    let attr = Attr {
        label,
        var_label: term.attr.var_label,
    };
    match &term.kind {
        TermKind::Var { .. } => Ok(Term {
            kind: term.kind.clone(),
            attr,
        }),
        TermKind::Lam { param, body } => {
            let body = assign_labels(gen, body)?;
            Ok(Term {
                kind: TermKind::Lam {
                    param: param.clone(),
                    body: Rc::new(body),
                },
                attr,
            })
        }
        TermKind::App { func, arg } => {
            let func = assign_labels(gen, func)?;
            let arg = assign_labels(gen, arg)?;
            Ok(Term {
                kind: TermKind::App {
                    func: Rc::new(func),
                    arg: Rc::new(arg),
                },
                attr,
            })
        }
        TermKind::Utest { lhs, rhs, next } => {
            let lhs = assign_labels(gen, lhs)?;
            let rhs = assign_labels(gen, rhs)?;
            let next = assign_labels(gen, next)?;
            Ok(Term {
                kind: TermKind::Utest {
                    lhs: Rc::new(lhs),
                    rhs: Rc::new(rhs),
                    next: Rc::new(next),
                },
                attr,
            })
        }
        // Labeled but atomic: no substructure relabeling.
        TermKind::Const(_)
        | TermKind::If
        | TermKind::Fix
        | TermKind::Record(_)
        | TermKind::Proj { .. }
        | TermKind::Nop => Ok(Term {
            kind: term.kind.clone(),
            attr,
        }),
        TermKind::Closure { .. } => Err(LabelError::ClosureInSource),
    }
}
