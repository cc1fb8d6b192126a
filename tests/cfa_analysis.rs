//! Stochastic 0-CFA behavior
//!
//! Taint introduction at `sample` call sites, propagation through data and
//! control flow, the if-branch rule, and the `fix` constraints.

use tuff::ast::{AtomId, Term, TermKind};
use tuff::cfa::{generate, AbsVal, Constraint};
use tuff::test_support::{analyze_core, if_then_else, label_core, let_in, op1, op2, sample};

/// `let d = normal 0.0 1.0 in sample d`
fn sample_normal() -> Term {
    let_in(
        "d",
        op2(AtomId::Normal, Term::float(0.0), Term::float(1.0)),
        sample(Term::var("d")),
    )
}

mod taint_introduction {
    use super::*;

    #[test]
    fn sample_application_is_stochastic_and_marked() {
        let (labeled, analysis) = analyze_core(&sample_normal()).unwrap();

        // The sample application is the body of the let-lambda.
        let TermKind::App { func, .. } = &labeled.term.kind else {
            panic!("expected App");
        };
        let TermKind::Lam { body: sample_app, .. } = &func.kind else {
            panic!("expected Lam");
        };
        assert!(analysis.data[sample_app.attr.label].contains(&AbsVal::Stoch));
        assert!(analysis.dynamic[sample_app.attr.label]);
    }

    #[test]
    fn taint_flows_through_a_let_binding() {
        // let x = sample d in x — the variable occurrence is stochastic too.
        let t = let_in(
            "x",
            sample(op1(AtomId::Exponential, Term::float(1.0))),
            Term::var("x"),
        );
        let (labeled, analysis) = analyze_core(&t).unwrap();
        let TermKind::App { func, .. } = &labeled.term.kind else {
            panic!("expected App");
        };
        let TermKind::Lam { body: var_x, .. } = &func.kind else {
            panic!("expected Lam");
        };
        assert!(analysis.data[var_x.attr.label].contains(&AbsVal::Stoch));
        // And the whole program's result is stochastic.
        assert!(analysis.data[labeled.term.attr.label].contains(&AbsVal::Stoch));
    }

    #[test]
    fn pure_programs_have_no_taint() {
        let t = op2(AtomId::Add, Term::int(1), Term::int(2));
        let (_, analysis) = analyze_core(&t).unwrap();
        assert!(analysis.data.iter().all(|set| !set.contains(&AbsVal::Stoch)));
        assert!(analysis.dynamic.iter().all(|m| !m));
    }

    #[test]
    fn stoch_implies_dynamic() {
        for t in [
            sample_normal(),
            op2(
                AtomId::Add,
                sample(op1(AtomId::Bernoulli, Term::float(0.5))),
                Term::int(1),
            ),
        ] {
            let (_, analysis) = analyze_core(&t).unwrap();
            for (label, set) in analysis.data.iter().enumerate() {
                if set.contains(&AbsVal::Stoch) {
                    assert!(analysis.dynamic[label], "label {} not dynamic", label);
                }
            }
        }
    }
}

mod if_branches {
    use super::*;

    #[test]
    fn stochastic_condition_taints_both_branches() {
        // if sample (bernoulli 0.5) then 1 else 2
        let t = if_then_else(
            sample(op1(AtomId::Bernoulli, Term::float(0.5))),
            Term::int(1),
            Term::int(2),
        );
        let (labeled, analysis) = analyze_core(&t).unwrap();

        // Walk down the if-application spine.
        let TermKind::App { func, arg: else_t } = &labeled.term.kind else {
            panic!("expected App");
        };
        let TermKind::App { func: inner, arg: then_t } = &func.kind else {
            panic!("expected App");
        };
        let TermKind::App { arg: cond, .. } = &inner.kind else {
            panic!("expected App");
        };

        assert!(analysis.data[cond.attr.label].contains(&AbsVal::Stoch));

        for thunk in [then_t, else_t] {
            let TermKind::Lam { body, .. } = &thunk.kind else {
                panic!("branches are thunks");
            };
            assert!(analysis.dynamic[thunk.attr.label]);
            assert!(analysis.dynamic[body.attr.label]);
        }
    }

    #[test]
    fn negated_stochastic_condition_taints_both_branches() {
        // if not (sample (bernoulli 0.5)) then 1 else 2 — the taint must
        // survive the operator between the draw and the branch.
        let t = if_then_else(
            op1(AtomId::Not, sample(op1(AtomId::Bernoulli, Term::float(0.5)))),
            Term::int(1),
            Term::int(2),
        );
        let (labeled, analysis) = analyze_core(&t).unwrap();

        let TermKind::App { func, arg: else_t } = &labeled.term.kind else {
            panic!("expected App");
        };
        let TermKind::App { func: inner, arg: then_t } = &func.kind else {
            panic!("expected App");
        };
        let TermKind::App { arg: cond, .. } = &inner.kind else {
            panic!("expected App");
        };

        assert!(analysis.data[cond.attr.label].contains(&AbsVal::Stoch));
        for thunk in [then_t, else_t] {
            let TermKind::Lam { body, .. } = &thunk.kind else {
                panic!("branches are thunks");
            };
            assert!(analysis.dynamic[thunk.attr.label]);
            assert!(analysis.dynamic[body.attr.label]);
        }
    }

    #[test]
    fn comparison_over_a_draw_taints_both_branches() {
        // if gt (sample (normal 0.0 1.0)) 0.5 then 1 else 2
        let t = if_then_else(
            op2(
                AtomId::Gt,
                sample(op2(AtomId::Normal, Term::float(0.0), Term::float(1.0))),
                Term::float(0.5),
            ),
            Term::int(1),
            Term::int(2),
        );
        let (labeled, analysis) = analyze_core(&t).unwrap();

        let TermKind::App { func, arg: else_t } = &labeled.term.kind else {
            panic!("expected App");
        };
        let TermKind::App { arg: then_t, .. } = &func.kind else {
            panic!("expected App");
        };
        let mut branch_labels = Vec::new();
        for thunk in [then_t, else_t] {
            tuff::test_support::walk(thunk, &mut |node| branch_labels.push(node.attr.label));
        }
        assert!(!branch_labels.is_empty());
        for label in branch_labels {
            assert!(analysis.dynamic[label], "label {} should be dynamic", label);
        }
    }

    #[test]
    fn deterministic_condition_leaves_branches_static() {
        let t = if_then_else(Term::bool(true), Term::int(1), Term::int(2));
        let (_, analysis) = analyze_core(&t).unwrap();
        assert!(analysis.dynamic.iter().all(|m| !m));
    }

    #[test]
    fn branch_results_flow_to_the_if_label() {
        // if c then (λa. a) else (λb. b) — both closures reach the result.
        let t = if_then_else(
            Term::bool(true),
            Term::lam("a", Term::var("a")),
            Term::lam("b", Term::var("b")),
        );
        let (labeled, analysis) = analyze_core(&t).unwrap();
        let funs: Vec<&AbsVal> = analysis.data[labeled.term.attr.label]
            .iter()
            .filter(|av| matches!(av, AbsVal::Fun { .. }))
            .collect();
        assert_eq!(funs.len(), 2);
    }
}

mod functions_and_fix {
    use super::*;

    fn factorial() -> Term {
        Term::app(
            Term::fix(),
            Term::lam(
                "f",
                Term::lam(
                    "n",
                    if_then_else(
                        op2(AtomId::Eq, Term::var("n"), Term::int(0)),
                        Term::int(1),
                        op2(
                            AtomId::Mul,
                            Term::var("n"),
                            Term::app(
                                Term::var("f"),
                                op2(AtomId::Sub, Term::var("n"), Term::int(1)),
                            ),
                        ),
                    ),
                ),
            ),
        )
    }

    #[test]
    fn application_result_carries_the_callee_body() {
        // (λx. x) (λy. y): the inner closure flows to the result label.
        let arg = Term::lam("y", Term::var("y"));
        let t = Term::app(Term::lam("x", Term::var("x")), arg);
        let (labeled, analysis) = analyze_core(&t).unwrap();

        let TermKind::App { arg: inner_lam, .. } = &labeled.term.kind else {
            panic!("expected App");
        };
        let expected_outer = inner_lam.attr.label;
        assert!(analysis.data[labeled.term.attr.label]
            .iter()
            .any(|av| matches!(av, AbsVal::Fun { outer, .. } if *outer == expected_outer)));
    }

    #[test]
    fn fix_rule_emits_conditional_constraints() {
        let labeled = label_core(&factorial()).unwrap();
        let cs = generate(&labeled.bmap, &labeled.term).unwrap();

        let TermKind::App { arg: fixed_fun, .. } = &labeled.term.kind else {
            panic!("expected App");
        };
        let at_operand = cs
            .iter()
            .filter(|c| matches!(c, Constraint::Cond { at, .. } if *at == fixed_fun.attr.label))
            .count();
        // Two conditional constraints per collected lambda.
        assert!(at_operand >= 2);
        assert_eq!(at_operand % 2, 0);
    }

    #[test]
    fn factorial_reaches_fixpoint_with_no_marks() {
        let (_, analysis) = analyze_core(&factorial()).unwrap();
        assert!(analysis.dynamic.iter().all(|m| !m));
        assert!(analysis.data.iter().all(|set| !set.contains(&AbsVal::Stoch)));
    }

    #[test]
    fn recursive_parameter_sees_the_fixed_closure() {
        let labeled = label_core(&factorial()).unwrap();
        let cs = generate(&labeled.bmap, &labeled.term).unwrap();
        let data = tuff::cfa::solve(&cs, labeled.n_labels);

        // The parameter `f` of the fixed function receives the inner lambda.
        let TermKind::App { arg: outer_lam, .. } = &labeled.term.kind else {
            panic!("expected App");
        };
        let TermKind::Lam { body: inner_lam, .. } = &outer_lam.kind else {
            panic!("expected Lam f");
        };
        let f_param = outer_lam.attr.var_label;
        assert!(data[f_param]
            .iter()
            .any(|av| matches!(av, AbsVal::Fun { outer, .. } if *outer == inner_lam.attr.label)));
    }
}

mod marked_closures {
    use super::*;

    #[test]
    fn closure_flowing_to_a_dynamic_site_is_marked() {
        // let g = (if sample (bernoulli 0.5) then (λa. a) else (λb. b)) in g 1
        // Both branch closures may be called from a stochastic context.
        let t = let_in(
            "g",
            if_then_else(
                sample(op1(AtomId::Bernoulli, Term::float(0.5))),
                Term::lam("a", Term::var("a")),
                Term::lam("b", Term::var("b")),
            ),
            Term::app(Term::var("g"), Term::int(1)),
        );
        let (labeled, analysis) = analyze_core(&t).unwrap();

        // Find both branch lambdas and check their labels are dynamic.
        let mut lam_labels = Vec::new();
        tuff::test_support::walk(&labeled.term, &mut |t| {
            if let TermKind::Lam { param, .. } = &t.kind {
                if param == "a" || param == "b" {
                    lam_labels.push(t.attr.label);
                }
            }
        });
        assert_eq!(lam_labels.len(), 2);
        for label in lam_labels {
            assert!(analysis.dynamic[label]);
        }
    }
}
