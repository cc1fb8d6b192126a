//! 0-CFA constraint generation
//!
//! Walks a labeled term and emits set constraints over the abstract domain.
//! Application chains are inspected through the head-and-arguments spine view,
//! with the special shapes checked before the general application rule:
//! binary operator, unary operator, `if` with thunked branches, a direct
//! `sample` call, and `fix`.
//!
//! Builtins are assumed to be fully applied at their syntactic use sites and
//! never passed around as values; that is what lets the operator rules flow
//! argument labels straight to the application label.

use crate::ast::{spine, Label, Term, TermKind};
use crate::cfa::CfaError;
use crate::label::BindMap;

/// Element of the analysis domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbsVal {
    /// A value derived, directly or transitively, from `sample`.
    Stoch,
    /// The fixpoint combinator as a value.
    Fix,
    /// The closure of a lambda: its own label, its body's label, and the
    /// label of its parameter.
    Fun {
        outer: Label,
        inner: Label,
        param: Label,
    },
}

/// A 0-CFA set constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// `val ∈ data[at]`, unconditionally.
    Direct { val: AbsVal, at: Label },
    /// `data[from] ⊆ data[to]`.
    Subset { from: Label, to: Label },
    /// If `val ∈ data[at]` then `data[from] ⊆ data[to]`.
    Cond {
        val: AbsVal,
        at: Label,
        from: Label,
        to: Label,
    },
}

/// Generate the constraint set for a labeled term.
pub fn generate(bmap: &BindMap, term: &Term) -> Result<Vec<Constraint>, CfaError> {
    let sample_label = bmap
        .get("sample")
        .ok_or(CfaError::MissingBuiltin("sample"))?;

    let mut funs = Vec::new();
    collect_funs(term, &mut funs);

    let mut gen = Generator {
        sample_label,
        funs,
        out: Vec::new(),
    };
    gen.visit(term)?;
    Ok(gen.out)
}

/// Collect the `Fun` abstraction of every lambda in the term. These are the
/// only closures an application or `fix` site can ever invoke.
fn collect_funs(term: &Term, out: &mut Vec<AbsVal>) {
    match &term.kind {
        TermKind::Lam { body, .. } => {
            out.push(AbsVal::Fun {
                outer: term.attr.label,
                inner: body.attr.label,
                param: term.attr.var_label,
            });
            collect_funs(body, out);
        }
        TermKind::App { func, arg } => {
            collect_funs(func, out);
            collect_funs(arg, out);
        }
        TermKind::Utest { lhs, rhs, next } => {
            collect_funs(lhs, out);
            collect_funs(rhs, out);
            collect_funs(next, out);
        }
        _ => {}
    }
}

struct Generator {
    sample_label: Label,
    funs: Vec<AbsVal>,
    out: Vec<Constraint>,
}

impl Generator {
    fn subset(&mut self, from: Label, to: Label) {
        self.out.push(Constraint::Subset { from, to });
    }

    fn visit(&mut self, term: &Term) -> Result<(), CfaError> {
        let l = term.attr.label;
        match &term.kind {
            TermKind::App { func, arg } => {
                let (head, args) = spine(term);
                match (&head.kind, args.len()) {
                    // Binary operator application
                    (TermKind::Const(c), 2) if c.arity() == 2 => {
                        self.subset(args[0].attr.label, l);
                        self.subset(args[1].attr.label, l);
                        self.visit(args[0])?;
                        self.visit(args[1])
                    }
                    // Unary operator application
                    (TermKind::Const(c), 1) if c.arity() == 1 => {
                        self.subset(args[0].attr.label, l);
                        self.visit(args[0])
                    }
                    // If expression over thunked branches. The thunks are not
                    // promoted to Fun here; their bodies flow to the result.
                    (TermKind::If, 3) => {
                        match (&args[1].kind, &args[2].kind) {
                            (
                                TermKind::Lam {
                                    body: then_body, ..
                                },
                                TermKind::Lam {
                                    body: else_body, ..
                                },
                            ) => {
                                self.subset(then_body.attr.label, l);
                                self.subset(else_body.attr.label, l);
                                self.visit(args[0])?;
                                self.visit(then_body)?;
                                self.visit(else_body)
                            }
                            _ => self.general_app(func, arg, l),
                        }
                    }
                    // Direct sample call
                    (TermKind::Var { .. }, 1) if head.attr.var_label == self.sample_label => {
                        self.out.push(Constraint::Direct {
                            val: AbsVal::Stoch,
                            at: l,
                        });
                        self.visit(args[0])
                    }
                    // Fix application: every lambda may be the fixed function
                    (TermKind::Fix, 1) => {
                        let operand = args[0].attr.label;
                        for i in 0..self.funs.len() {
                            let av = self.funs[i];
                            let AbsVal::Fun { inner, param, .. } = av else {
                                continue;
                            };
                            self.out.push(Constraint::Cond {
                                val: av,
                                at: operand,
                                from: inner,
                                to: param,
                            });
                            self.out.push(Constraint::Cond {
                                val: av,
                                at: operand,
                                from: inner,
                                to: l,
                            });
                        }
                        self.visit(args[0])
                    }
                    _ => self.general_app(func, arg, l),
                }
            }
            TermKind::Var { .. } => {
                self.subset(term.attr.var_label, l);
                Ok(())
            }
            TermKind::Lam { body, .. } => {
                self.out.push(Constraint::Direct {
                    val: AbsVal::Fun {
                        outer: l,
                        inner: body.attr.label,
                        param: term.attr.var_label,
                    },
                    at: l,
                });
                self.visit(body)
            }
            TermKind::Utest { lhs, rhs, next } => {
                // The expression continues as `next`.
                self.subset(next.attr.label, l);
                self.visit(lhs)?;
                self.visit(rhs)?;
                self.visit(next)
            }
            TermKind::Const(_)
            | TermKind::If
            | TermKind::Fix
            | TermKind::Record(_)
            | TermKind::Proj { .. }
            | TermKind::Nop => Ok(()),
            TermKind::Closure { .. } => Err(CfaError::ClosureInAnalysis),
        }
    }

    /// The general application rule: any collected lambda may flow to the
    /// callee, in which case the argument flows to its parameter and its body
    /// flows to the application's result.
    fn general_app(&mut self, func: &Term, arg: &Term, l: Label) -> Result<(), CfaError> {
        for i in 0..self.funs.len() {
            let av = self.funs[i];
            let AbsVal::Fun { inner, param, .. } = av else {
                continue;
            };
            self.out.push(Constraint::Cond {
                val: av,
                at: func.attr.label,
                from: arg.attr.label,
                to: param,
            });
            self.out.push(Constraint::Cond {
                val: av,
                at: func.attr.label,
                from: inner,
                to: l,
            });
        }
        self.visit(func)?;
        self.visit(arg)
    }
}
