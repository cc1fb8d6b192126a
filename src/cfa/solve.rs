//! Worklist constraint solver
//!
//! Computes, per label, the set of abstract values flowing there. Direct
//! constraints seed the data arrays; subset and conditional constraints are
//! installed as edges on the labels whose growth can re-trigger them. The
//! worklist holds labels whose sets have grown since they were last
//! processed; sets only ever grow within a finite domain, so the iteration
//! terminates.

use std::collections::{HashSet, VecDeque};

use crate::ast::Label;
use crate::cfa::constraints::{AbsVal, Constraint};

/// Per-label abstract value sets, indexed by label.
pub type Data = Vec<HashSet<AbsVal>>;

/// Solve a constraint set over `n_labels` labels.
pub fn solve(constraints: &[Constraint], n_labels: usize) -> Data {
    let mut solver = Solver {
        data: vec![HashSet::new(); n_labels],
        edges: vec![Vec::new(); n_labels],
        work: VecDeque::new(),
    };

    for c in constraints {
        match c {
            Constraint::Direct { val, at } => solver.add_one(*at, *val),
            Constraint::Subset { from, .. } => solver.edges[*from].push(c.clone()),
            Constraint::Cond { at, from, .. } => {
                // Re-examined when either the guarded source set or the
                // guard's own set grows.
                solver.edges[*from].push(c.clone());
                solver.edges[*at].push(c.clone());
            }
        }
    }

    while let Some(q) = solver.work.pop_front() {
        for i in 0..solver.edges[q].len() {
            match solver.edges[q][i].clone() {
                Constraint::Subset { from, to } => solver.add_all(to, from),
                Constraint::Cond { val, at, from, to } => {
                    if solver.data[at].contains(&val) {
                        solver.add_all(to, from);
                    }
                }
                Constraint::Direct { .. } => {
                    unreachable!("direct constraint stored as an edge")
                }
            }
        }
    }

    solver.data
}

struct Solver {
    data: Data,
    edges: Vec<Vec<Constraint>>,
    work: VecDeque<Label>,
}

impl Solver {
    fn add_one(&mut self, at: Label, val: AbsVal) {
        if self.data[at].insert(val) {
            self.work.push_back(at);
        }
    }

    fn add_all(&mut self, to: Label, from: Label) {
        if from == to {
            return;
        }
        let vals: Vec<AbsVal> = self.data[from].iter().copied().collect();
        let mut grew = false;
        for val in vals {
            grew |= self.data[to].insert(val);
        }
        if grew {
            self.work.push_back(to);
        }
    }
}
