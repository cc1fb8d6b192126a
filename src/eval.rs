//! Tree-walking evaluator for compiled Tuff programs
//!
//! Call-by-value evaluation of CPS-transformed, de Bruijn-indexed terms.
//! Values are terms: constants, closures, `Nop`, records of values, and the
//! recursive-closure form `Fix f`. Environments are persistent cons lists
//! indexed by de Bruijn depth.
//!
//! The probabilistic checkpoints are not interpreted here: firing `sample`
//! or `weight` stops evaluation and surfaces an [`Outcome`] carrying the
//! captured continuation. The inference backend decides what happens next
//! and re-enters through [`Interpreter::resume`].

use std::rc::Rc;

use thiserror::Error;

use crate::ast::{AtomId, Constant, Dist, Env, Ident, Term, TermKind};
use crate::pipeline::CompiledProgram;

#[derive(Error, Debug)]
pub enum EvalError {
    #[error("unbound de Bruijn index {0}")]
    UnboundIndex(usize),
    #[error("not a function: {0}")]
    NotAFunction(String),
    #[error("type error: {0}")]
    TypeError(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("missing record field: {0}")]
    MissingField(Ident),
    #[error("no inference backend for `{0}`")]
    ExternalAtom(&'static str),
    #[error("checkpoint while evaluating a builtin")]
    CheckpointInBuiltin,
}

/// Result of driving a compiled term: either a value, or a checkpoint at
/// which inference intervenes.
#[derive(Debug)]
pub enum Outcome {
    Value(Rc<Term>),
    /// A `sample` fired: the backend draws from `dist` and resumes `cont`
    /// with the draw.
    Sample { dist: Dist, cont: Rc<Term> },
    /// A `weight` fired: the backend records the weight and resumes `cont`
    /// with unit.
    Weight { weight: f64, cont: Rc<Term> },
}

/// Recorded result of one `utest` assertion.
#[derive(Debug)]
pub struct UtestOutcome {
    pub passed: bool,
    pub lhs: Rc<Term>,
    pub rhs: Rc<Term>,
}

/// Unwrap a value outcome, or propagate a checkpoint to the caller.
macro_rules! value {
    ($e:expr) => {
        match $e? {
            Outcome::Value(v) => v,
            stop => return Ok(stop),
        }
    };
}

/// The interpreter. Owns the unit-test log; everything else is threaded
/// through arguments.
#[derive(Debug, Default)]
pub struct Interpreter {
    pub utests: Vec<UtestOutcome>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate the builtin terms of a compiled program into the initial
    /// environment. The last table entry ends up innermost, matching the
    /// indices the de Bruijn pass assigned.
    pub fn base_env(&mut self, compiled: &CompiledProgram) -> Result<Rc<Env>, EvalError> {
        let mut env = Env::nil();
        for term in &compiled.env_terms {
            match self.eval(&Env::nil(), term)? {
                Outcome::Value(value) => env = Env::cons(value, env),
                _ => return Err(EvalError::CheckpointInBuiltin),
            }
        }
        Ok(env)
    }

    /// Run a compiled program to its first outcome.
    pub fn run(&mut self, compiled: &CompiledProgram) -> Result<Outcome, EvalError> {
        let env = self.base_env(compiled)?;
        self.eval(&env, &compiled.term)
    }

    /// Resume a checkpointed continuation with a value.
    pub fn resume(&mut self, cont: Rc<Term>, value: Rc<Term>) -> Result<Outcome, EvalError> {
        self.apply(cont, value)
    }

    pub fn eval(&mut self, env: &Rc<Env>, term: &Term) -> Result<Outcome, EvalError> {
        match &term.kind {
            TermKind::Var { idx, .. } => env
                .lookup(*idx)
                .cloned()
                .map(Outcome::Value)
                .ok_or(EvalError::UnboundIndex(*idx)),

            TermKind::Lam { param, body } => Ok(Outcome::Value(Rc::new(Term::new(
                TermKind::Closure {
                    param: param.clone(),
                    body: body.clone(),
                    env: env.clone(),
                },
            )))),

            TermKind::App { func, arg } => {
                let func = value!(self.eval(env, func));
                let arg = value!(self.eval(env, arg));
                self.apply(func, arg)
            }

            TermKind::Record(fields) => {
                let mut values = Vec::with_capacity(fields.len());
                for (name, field) in fields {
                    let value = value!(self.eval(env, field));
                    values.push((name.clone(), value));
                }
                Ok(Outcome::Value(Rc::new(Term::new(TermKind::Record(values)))))
            }

            TermKind::Proj { term: inner, field } => {
                let record = value!(self.eval(env, inner));
                let TermKind::Record(fields) = &record.kind else {
                    return Err(EvalError::TypeError(format!(
                        "projection from non-record: {:?}",
                        record.kind
                    )));
                };
                fields
                    .iter()
                    .find(|(name, _)| name == field)
                    .map(|(_, value)| Outcome::Value(value.clone()))
                    .ok_or_else(|| EvalError::MissingField(field.clone()))
            }

            TermKind::Utest { lhs, rhs, next } => {
                let lhs = value!(self.eval(env, lhs));
                let rhs = value!(self.eval(env, rhs));
                self.utests.push(UtestOutcome {
                    passed: val_eq(&lhs, &rhs),
                    lhs,
                    rhs,
                });
                self.eval(env, next)
            }

            // Already values.
            TermKind::Const(_)
            | TermKind::If
            | TermKind::Fix
            | TermKind::Nop
            | TermKind::Closure { .. } => Ok(Outcome::Value(Rc::new(term.clone()))),
        }
    }

    fn apply(&mut self, func: Rc<Term>, arg: Rc<Term>) -> Result<Outcome, EvalError> {
        match &func.kind {
            TermKind::Closure { body, env, .. } => {
                let inner = Env::cons(arg, env.clone());
                self.eval(&inner, body)
            }

            TermKind::Const(Constant::Atom { id, args_rev }) => {
                let mut args_rev = args_rev.clone();
                args_rev.insert(0, arg);
                if id.max_arity() > args_rev.len() {
                    Ok(Outcome::Value(Rc::new(Term::cnst(Constant::Atom {
                        id: *id,
                        args_rev,
                    }))))
                } else {
                    self.delta(*id, args_rev)
                }
            }

            // `Fix f` is a value; applying it unfolds one step.
            TermKind::Fix => Ok(Outcome::Value(Rc::new(Term::new(TermKind::App {
                func: Rc::new(Term::fix()),
                arg,
            })))),

            // `If` accumulates its three arguments as an application spine
            // and fires on the third by forcing the selected thunk.
            TermKind::If => Ok(Outcome::Value(Rc::new(Term::new(TermKind::App {
                func,
                arg,
            })))),

            TermKind::App {
                func: inner_func,
                arg: inner_arg,
            } => match &inner_func.kind {
                TermKind::Fix => {
                    let unrolled = value!(self.apply(inner_arg.clone(), func.clone()));
                    self.apply(unrolled, arg)
                }
                TermKind::If => Ok(Outcome::Value(Rc::new(Term::new(TermKind::App {
                    func,
                    arg,
                })))),
                TermKind::App { func: head, arg: cond }
                    if matches!(head.kind, TermKind::If) =>
                {
                    let selected = match &cond.kind {
                        TermKind::Const(Constant::Bool(true)) => inner_arg.clone(),
                        TermKind::Const(Constant::Bool(false)) => arg,
                        other => {
                            return Err(EvalError::TypeError(format!(
                                "if condition must be a boolean, got {:?}",
                                other
                            )))
                        }
                    };
                    self.apply(selected, Rc::new(Term::nop()))
                }
                _ => Err(EvalError::NotAFunction(format!("{:?}", func.kind))),
            },

            other => Err(EvalError::NotAFunction(format!("{:?}", other))),
        }
    }

    /// Fire a saturated atom. `args_rev` holds the arguments newest-first.
    fn delta(&mut self, id: AtomId, args_rev: Vec<Rc<Term>>) -> Result<Outcome, EvalError> {
        let mut args = args_rev;
        args.reverse();

        let value = |t: Term| Ok(Outcome::Value(Rc::new(t)));
        match id {
            // Checkpoints: the continuation arrived first, by the CPS
            // calling convention.
            AtomId::Sample => Ok(Outcome::Sample {
                dist: as_dist(&args[1])?,
                cont: args[0].clone(),
            }),
            AtomId::Weight => Ok(Outcome::Weight {
                weight: as_float(&args[1])?,
                cont: args[0].clone(),
            }),

            AtomId::Not => value(Term::bool(!as_bool(&args[0])?)),
            AtomId::And => value(Term::bool(as_bool(&args[0])? && as_bool(&args[1])?)),
            AtomId::Or => value(Term::bool(as_bool(&args[0])? || as_bool(&args[1])?)),

            AtomId::Add | AtomId::Sub | AtomId::Mul | AtomId::Div => {
                value(arith(id, &args[0], &args[1])?)
            }
            AtomId::Neg => match &args[0].kind {
                TermKind::Const(Constant::Int(n)) => value(Term::int(-n)),
                TermKind::Const(Constant::Float(x)) => value(Term::float(-x)),
                other => Err(EvalError::TypeError(format!(
                    "cannot negate {:?}",
                    other
                ))),
            },

            AtomId::Eq => value(Term::bool(val_eq(&args[0], &args[1]))),
            AtomId::Neq => value(Term::bool(!val_eq(&args[0], &args[1]))),
            AtomId::Lt | AtomId::Leq | AtomId::Gt | AtomId::Geq => {
                value(compare(id, &args[0], &args[1])?)
            }

            AtomId::Normal => value(Term::cnst(Constant::Dist(Dist::Normal {
                mu: as_float(&args[0])?,
                sigma: as_float(&args[1])?,
            }))),
            AtomId::Uniform => value(Term::cnst(Constant::Dist(Dist::Uniform {
                a: as_float(&args[0])?,
                b: as_float(&args[1])?,
            }))),
            AtomId::Gamma => value(Term::cnst(Constant::Dist(Dist::Gamma {
                shape: as_float(&args[0])?,
                scale: as_float(&args[1])?,
            }))),
            AtomId::Exponential => value(Term::cnst(Constant::Dist(Dist::Exponential {
                rate: as_float(&args[0])?,
            }))),
            AtomId::Bernoulli => value(Term::cnst(Constant::Dist(Dist::Bernoulli {
                p: as_float(&args[0])?,
            }))),

            // Delegated to the inference backend.
            AtomId::Infer => Err(EvalError::ExternalAtom("infer")),
            AtomId::Prob => Err(EvalError::ExternalAtom("prob")),
        }
    }
}

fn as_bool(t: &Term) -> Result<bool, EvalError> {
    match &t.kind {
        TermKind::Const(Constant::Bool(b)) => Ok(*b),
        other => Err(EvalError::TypeError(format!("expected boolean, got {:?}", other))),
    }
}

fn as_float(t: &Term) -> Result<f64, EvalError> {
    match &t.kind {
        TermKind::Const(Constant::Float(x)) => Ok(*x),
        other => Err(EvalError::TypeError(format!("expected float, got {:?}", other))),
    }
}

fn as_dist(t: &Term) -> Result<Dist, EvalError> {
    match &t.kind {
        TermKind::Const(Constant::Dist(d)) => Ok(*d),
        other => Err(EvalError::TypeError(format!(
            "expected distribution, got {:?}",
            other
        ))),
    }
}

fn arith(id: AtomId, a: &Term, b: &Term) -> Result<Term, EvalError> {
    match (&a.kind, &b.kind) {
        (TermKind::Const(Constant::Int(x)), TermKind::Const(Constant::Int(y))) => {
            let r = match id {
                AtomId::Add => x.wrapping_add(*y),
                AtomId::Sub => x.wrapping_sub(*y),
                AtomId::Mul => x.wrapping_mul(*y),
                AtomId::Div => {
                    if *y == 0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    x / y
                }
                _ => unreachable!("non-arithmetic atom in arith"),
            };
            Ok(Term::int(r))
        }
        (TermKind::Const(Constant::Float(x)), TermKind::Const(Constant::Float(y))) => {
            let r = match id {
                AtomId::Add => x + y,
                AtomId::Sub => x - y,
                AtomId::Mul => x * y,
                AtomId::Div => x / y,
                _ => unreachable!("non-arithmetic atom in arith"),
            };
            Ok(Term::float(r))
        }
        _ => Err(EvalError::TypeError(format!(
            "arithmetic on non-numbers: {:?} and {:?}",
            a.kind, b.kind
        ))),
    }
}

fn compare(id: AtomId, a: &Term, b: &Term) -> Result<Term, EvalError> {
    let ord = match (&a.kind, &b.kind) {
        (TermKind::Const(Constant::Int(x)), TermKind::Const(Constant::Int(y))) => {
            x.partial_cmp(y)
        }
        (TermKind::Const(Constant::Float(x)), TermKind::Const(Constant::Float(y))) => {
            x.partial_cmp(y)
        }
        _ => None,
    };
    let Some(ord) = ord else {
        return Err(EvalError::TypeError(format!(
            "comparison on incompatible values: {:?} and {:?}",
            a.kind, b.kind
        )));
    };
    let r = match id {
        AtomId::Lt => ord.is_lt(),
        AtomId::Leq => ord.is_le(),
        AtomId::Gt => ord.is_gt(),
        AtomId::Geq => ord.is_ge(),
        _ => unreachable!("non-comparison atom in compare"),
    };
    Ok(Term::bool(r))
}

/// Structural value equality. Functions never compare equal.
pub fn val_eq(a: &Term, b: &Term) -> bool {
    match (&a.kind, &b.kind) {
        (TermKind::Nop, TermKind::Nop) => true,
        (TermKind::Const(x), TermKind::Const(y)) => const_eq(x, y),
        (TermKind::Record(xs), TermKind::Record(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .zip(ys)
                    .all(|((nx, vx), (ny, vy))| nx == ny && val_eq(vx, vy))
        }
        _ => false,
    }
}

fn const_eq(a: &Constant, b: &Constant) -> bool {
    match (a, b) {
        (Constant::Bool(x), Constant::Bool(y)) => x == y,
        (Constant::Int(x), Constant::Int(y)) => x == y,
        (Constant::Float(x), Constant::Float(y)) => x == y,
        (Constant::Char(x), Constant::Char(y)) => x == y,
        (Constant::Dist(x), Constant::Dist(y)) => x == y,
        _ => false,
    }
}
