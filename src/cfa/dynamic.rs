//! Dynamic marking
//!
//! Second fixpoint over the solved data: a label is dynamic when its set
//! contains `Stoch`, when it sits under an if-branch whose condition is
//! stochastic, or when the lambda it belongs to may flow to a dynamic call
//! site. Each pass carries a flag for "under a dynamic branch"; marked nodes
//! promote every closure that flows to them. Passes repeat until one changes
//! nothing; marks only ever go from false to true.

use crate::ast::{spine, Label, Term, TermKind};
use crate::cfa::constraints::AbsVal;
use crate::cfa::solve::Data;
use crate::cfa::CfaError;

/// Compute the dynamic mark vector for a labeled term.
pub fn mark(term: &Term, data: &Data) -> Result<Vec<bool>, CfaError> {
    let mut marker = Marker {
        data,
        mark: vec![false; data.len()],
        changed: false,
    };
    loop {
        marker.changed = false;
        marker.visit(term, false)?;
        if !marker.changed {
            break;
        }
    }
    Ok(marker.mark)
}

struct Marker<'a> {
    data: &'a Data,
    mark: Vec<bool>,
    changed: bool,
}

impl Marker<'_> {
    fn set(&mut self, label: Label) {
        if !self.mark[label] {
            self.mark[label] = true;
            self.changed = true;
        }
    }

    /// The node rule: a label under a dynamic context, already marked, or
    /// carrying `Stoch` becomes dynamic, and every closure flowing to it is
    /// promoted.
    fn touch(&mut self, label: Label, flag: bool) {
        if flag || self.mark[label] || self.data[label].contains(&AbsVal::Stoch) {
            self.set(label);
            let outers: Vec<Label> = self.data[label]
                .iter()
                .filter_map(|av| match av {
                    AbsVal::Fun { outer, .. } => Some(*outer),
                    _ => None,
                })
                .collect();
            for outer in outers {
                self.set(outer);
            }
        }
    }

    fn visit(&mut self, term: &Term, flag: bool) -> Result<(), CfaError> {
        let l = term.attr.label;
        self.touch(l, flag);
        // Binder labels receive flows through parameter passing; they are
        // marked at their lambda since no term node carries them.
        if matches!(term.kind, TermKind::Lam { .. }) {
            self.touch(term.attr.var_label, flag);
        }

        match &term.kind {
            TermKind::App { func, arg } => {
                if !flag {
                    let (head, args) = spine(term);
                    if matches!(head.kind, TermKind::If) && args.len() == 3 {
                        self.visit(args[0], false)?;
                        let branch_flag =
                            self.data[args[0].attr.label].contains(&AbsVal::Stoch);
                        self.visit(args[1], branch_flag)?;
                        return self.visit(args[2], branch_flag);
                    }
                }
                self.visit(func, flag)?;
                self.visit(arg, flag)
            }
            TermKind::Lam { body, .. } => {
                let body_flag = flag || self.mark[l];
                self.visit(body, body_flag)
            }
            TermKind::Utest { lhs, rhs, next } => {
                self.visit(lhs, flag)?;
                self.visit(rhs, flag)?;
                self.visit(next, flag)
            }
            TermKind::Var { .. }
            | TermKind::Const(_)
            | TermKind::If
            | TermKind::Fix
            | TermKind::Record(_)
            | TermKind::Proj { .. }
            | TermKind::Nop => Ok(()),
            TermKind::Closure { .. } => Err(CfaError::ClosureInAnalysis),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Ident, Term};
    use crate::cfa::{generate, solve};
    use crate::label::label_program;

    fn analyze(term: Term) -> (crate::label::Labeled, Data, Vec<bool>) {
        let names: Vec<Ident> = vec!["sample".into()];
        let labeled = label_program(&names, &term).unwrap();
        let cs = generate(&labeled.bmap, &labeled.term).unwrap();
        let data = solve(&cs, labeled.n_labels);
        let marks = mark(&labeled.term, &data).unwrap();
        (labeled, data, marks)
    }

    #[test]
    fn pure_identity_marks_nothing() {
        let (_, _, marks) = analyze(Term::lam("x", Term::var("x")));
        assert!(marks.iter().all(|m| !m));
    }

    #[test]
    fn stochastic_labels_are_marked() {
        let (labeled, data, marks) = analyze(Term::app(Term::var("sample"), Term::nop()));
        assert!(data[labeled.term.attr.label].contains(&AbsVal::Stoch));
        assert!(marks[labeled.term.attr.label]);
    }

    #[test]
    fn stoch_implies_mark_everywhere() {
        // sample flowing through a let-style redex taints the body label too.
        let t = Term::app(
            Term::lam("x", Term::var("x")),
            Term::app(Term::var("sample"), Term::nop()),
        );
        let (_, data, marks) = analyze(t);
        for (label, set) in data.iter().enumerate() {
            if set.contains(&AbsVal::Stoch) {
                assert!(marks[label], "label {} has Stoch but no mark", label);
            }
        }
    }
}
