//! CPS Transformation Pass
//!
//! Rewrites terms so that control is an explicit argument and the
//! probabilistic checkpoints can be intercepted by inference.
//!
//! ## Transformation Rules
//!
//! 1. Function: add a continuation parameter
//!    `λx. body` → `λk. λx. [[body]]_k`
//!
//! 2. A transformed function never returns; it tail-applies its continuation
//!    to its result.
//!
//! 3. Constant of arity n: n-ary curried wrapper, each layer accepting a
//!    continuation first, then the original argument:
//!    `c` → `λk₁.λv₁. k₁ (… (λkₙ.λvₙ. kₙ (c v₁ … vₙ)) …)`
//!
//! 4. `if`: the explicit three-continuation form; the branch thunks receive
//!    the if-expression's own continuation, so branch results are never
//!    re-applied to it.
//!
//! 5. `fix`: `λk.λv. k (Fix (v idFun))` — the fixed function expects a
//!    continuation first, but `Fix` itself needs the unwrapped value.
//!
//! 6. `sample` and `weight` keep their raw form; the continuation reaches
//!    them as an ordinary argument and their declared arity accounts for it.
//!
//! Fresh variables are drawn as `$0, $1, …`; `$` is lexically unavailable to
//! source programs, so no user binding can be shadowed. Fresh variables carry
//! a placeholder de Bruijn index resolved by the indexing pass.

use std::rc::Rc;

use thiserror::Error;

use crate::ast::{Constant, Ident, Term, TermKind};

#[derive(Error, Debug)]
pub enum CpsError {
    #[error("application in atomic position")]
    AppNotAtomic,
    #[error("closure before evaluation")]
    ClosureBeforeEval,
}

/// Fresh-variable generator for CPS binders.
#[derive(Debug, Default)]
struct NameGen {
    next: usize,
}

impl NameGen {
    fn fresh(&mut self) -> Ident {
        let name = format!("${}", self.next);
        self.next += 1;
        name
    }
}

/// CPS transformation context holding the fresh-name allocator.
///
/// One instance per compilation; fresh names are unique within it.
#[derive(Debug, Default)]
pub struct Cps {
    gen: NameGen,
}

impl Cps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transform a whole program under the identity continuation.
    pub fn program(&mut self, term: &Term) -> Result<Term, CpsError> {
        let id = self.id_fun();
        self.transform(id, term)
    }

    /// Transform a term that is already a value, without a continuation.
    pub fn atomic(&mut self, term: &Term) -> Result<Term, CpsError> {
        match &term.kind {
            TermKind::Var { .. }
            | TermKind::Nop
            | TermKind::Record(_)
            | TermKind::Proj { .. } => Ok(term.clone()),

            TermKind::Lam { param, body } => {
                let k = self.gen.fresh();
                let body = self.transform(Term::var(k.clone()), body)?;
                let inner = Term {
                    kind: TermKind::Lam {
                        param: param.clone(),
                        body: Rc::new(body),
                    },
                    attr: term.attr,
                };
                Ok(Term::lam(k, inner))
            }

            TermKind::Const(c) => {
                if c.arity() == 0 {
                    Ok(term.clone())
                } else {
                    Ok(self.wrap_const(c))
                }
            }

            TermKind::If => Ok(self.wrap_if()),

            TermKind::Fix => Ok(self.wrap_fix()),

            TermKind::Utest { lhs, rhs, next } => {
                // Assertions are driven to a value by the identity
                // continuation.
                let id = self.id_fun();
                let lhs = self.transform(id, lhs)?;
                let id = self.id_fun();
                let rhs = self.transform(id, rhs)?;
                let id = self.id_fun();
                let next = self.transform(id, next)?;
                Ok(Term {
                    kind: TermKind::Utest {
                        lhs: Rc::new(lhs),
                        rhs: Rc::new(rhs),
                        next: Rc::new(next),
                    },
                    attr: term.attr,
                })
            }

            TermKind::App { .. } => Err(CpsError::AppNotAtomic),
            TermKind::Closure { .. } => Err(CpsError::ClosureBeforeEval),
        }
    }

    /// Transform a computation against an explicit continuation.
    pub fn transform(&mut self, cont: Term, term: &Term) -> Result<Term, CpsError> {
        match &term.kind {
            TermKind::App { func, arg } => {
                let (func_bind, func_val) = if matches!(func.kind, TermKind::App { .. }) {
                    let name = self.gen.fresh();
                    (Some(name.clone()), Term::var(name))
                } else {
                    (None, self.atomic(func)?)
                };
                let (arg_bind, arg_val) = if matches!(arg.kind, TermKind::App { .. }) {
                    let name = self.gen.fresh();
                    (Some(name.clone()), Term::var(name))
                } else {
                    (None, self.atomic(arg)?)
                };

                let core = Term::app(Term::app(func_val, cont), arg_val);
                let inner = match arg_bind {
                    Some(name) => self.transform(Term::lam(name, core), arg)?,
                    None => core,
                };
                match func_bind {
                    Some(name) => self.transform(Term::lam(name, inner), func),
                    None => Ok(inner),
                }
            }
            _ => {
                let value = self.atomic(term)?;
                Ok(Term::app(cont, value))
            }
        }
    }

    /// Arity-based curried wrapping for a constant of nonzero arity.
    fn wrap_const(&mut self, c: &Constant) -> Term {
        let n = c.arity();
        debug_assert!(n > 0, "literals are atomic as-is");

        let ks: Vec<Ident> = (0..n).map(|_| self.gen.fresh()).collect();
        let vs: Vec<Ident> = (0..n).map(|_| self.gen.fresh()).collect();

        let fired = Term::apps(
            Term::cnst(c.clone()),
            vs.iter().map(|v| Term::var(v.clone())),
        );
        let mut acc = Term::lam(
            ks[n - 1].clone(),
            Term::lam(
                vs[n - 1].clone(),
                Term::app(Term::var(ks[n - 1].clone()), fired),
            ),
        );
        for i in (0..n - 1).rev() {
            acc = Term::lam(
                ks[i].clone(),
                Term::lam(
                    vs[i].clone(),
                    Term::app(Term::var(ks[i].clone()), acc),
                ),
            );
        }
        acc
    }

    /// The explicit three-continuation `if` form. The third continuation is
    /// the continuation of the whole if-expression; both branch thunks
    /// receive it, so the selected branch runs straight into it.
    fn wrap_if(&mut self) -> Term {
        let k1 = self.gen.fresh();
        let a = self.gen.fresh();
        let k2 = self.gen.fresh();
        let b = self.gen.fresh();
        let k3 = self.gen.fresh();
        let c = self.gen.fresh();

        let selection = Term::apps(
            Term::if_exp(),
            [
                Term::var(a.clone()),
                Term::app(Term::var(b.clone()), Term::var(k3.clone())),
                Term::app(Term::var(c.clone()), Term::var(k3.clone())),
            ],
        );
        let layer3 = Term::lam(k3, Term::lam(c, selection));
        let layer2 = Term::lam(
            k2.clone(),
            Term::lam(b, Term::app(Term::var(k2), layer3)),
        );
        Term::lam(
            k1.clone(),
            Term::lam(a, Term::app(Term::var(k1), layer2)),
        )
    }

    /// `λk.λv. k (Fix (v idFun))`: strip the continuation layer off the
    /// fixed function before handing it to `Fix`.
    fn wrap_fix(&mut self) -> Term {
        let k = self.gen.fresh();
        let v = self.gen.fresh();
        let id = self.id_fun();
        let unwrapped = Term::app(Term::fix(), Term::app(Term::var(v.clone()), id));
        Term::lam(
            k.clone(),
            Term::lam(v, Term::app(Term::var(k), unwrapped)),
        )
    }

    fn id_fun(&mut self) -> Term {
        let x = self.gen.fresh();
        Term::lam(x.clone(), Term::var(x))
    }
}
