//! Naive bottom-up reference evaluator.
//!
//! Supports exactly what the rewrite tests need: positive atoms over
//! number tuples, negation against the accumulated database, and
//! equality/comparison constraints. Rules are applied to a global
//! fixpoint, so demand-transformed programs (whose magic seeds are
//! plain facts) evaluate with no special handling.

use datalog_ast::{
    ArgKind, Argument, BinaryConstraintOp, Clause, Literal, Program, QualifiedName, Symbol,
};
use std::collections::{BTreeMap, BTreeSet};

pub type Tuple = Vec<i64>;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Database {
    facts: BTreeMap<QualifiedName, BTreeSet<Tuple>>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<QualifiedName>, tuple: Tuple) -> bool {
        self.facts.entry(name.into()).or_default().insert(tuple)
    }

    pub fn tuples(&self, name: &QualifiedName) -> BTreeSet<Tuple> {
        self.facts.get(name).cloned().unwrap_or_default()
    }

    fn contains(&self, name: &QualifiedName, tuple: &Tuple) -> bool {
        self.facts
            .get(name)
            .map(|set| set.contains(tuple))
            .unwrap_or(false)
    }
}

type Substitution = BTreeMap<Symbol, i64>;

fn eval_argument(arg: &Argument, subst: &Substitution) -> Option<i64> {
    match &arg.kind {
        ArgKind::Number(value) => Some(*value),
        ArgKind::Variable(name) => subst.get(name).copied(),
        _ => None,
    }
}

/// Match an atom's arguments against a tuple, extending the
/// substitution.
fn unify(args: &[Argument], tuple: &Tuple, subst: &Substitution) -> Option<Substitution> {
    if args.len() != tuple.len() {
        return None;
    }
    let mut result = subst.clone();
    for (arg, value) in args.iter().zip(tuple) {
        match &arg.kind {
            ArgKind::Variable(name) => match result.get(name) {
                Some(bound) if bound != value => return None,
                Some(_) => {}
                None => {
                    result.insert(*name, *value);
                }
            },
            ArgKind::Number(expected) if expected == value => {}
            ArgKind::Unnamed => {}
            _ => return None,
        }
    }
    Some(result)
}

/// Whether the literal can make progress under the substitution.
fn is_ready(lit: &Literal, subst: &Substitution) -> bool {
    match lit {
        Literal::Atom(_) => true,
        Literal::Negation(atom) => atom
            .args
            .iter()
            .all(|arg| eval_argument(arg, subst).is_some()),
        Literal::Constraint(c) => {
            let lhs = eval_argument(&c.lhs, subst);
            let rhs = eval_argument(&c.rhs, subst);
            match c.op {
                BinaryConstraintOp::Eq => lhs.is_some() || rhs.is_some(),
                _ => lhs.is_some() && rhs.is_some(),
            }
        }
        Literal::Boolean(_) => true,
    }
}

fn satisfy(
    remaining: &[&Literal],
    db: &Database,
    subst: &Substitution,
    out: &mut Vec<Substitution>,
) {
    if remaining.is_empty() {
        out.push(subst.clone());
        return;
    }

    let Some(position) = remaining.iter().position(|lit| is_ready(lit, subst)) else {
        // No literal can fire; the substitution dies.
        return;
    };
    let lit = remaining[position];
    let rest: Vec<&Literal> = remaining
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != position)
        .map(|(_, l)| *l)
        .collect();

    match lit {
        Literal::Atom(atom) => {
            for tuple in db.tuples(&atom.name) {
                if let Some(extended) = unify(&atom.args, &tuple, subst) {
                    satisfy(&rest, db, &extended, out);
                }
            }
        }
        Literal::Negation(atom) => {
            let tuple: Option<Tuple> = atom
                .args
                .iter()
                .map(|arg| eval_argument(arg, subst))
                .collect();
            if let Some(tuple) = tuple {
                if !db.contains(&atom.name, &tuple) {
                    satisfy(&rest, db, subst, out);
                }
            }
        }
        Literal::Constraint(c) => {
            let lhs = eval_argument(&c.lhs, subst);
            let rhs = eval_argument(&c.rhs, subst);
            match (c.op, lhs, rhs) {
                (BinaryConstraintOp::Eq, Some(l), Some(r)) => {
                    if l == r {
                        satisfy(&rest, db, subst, out);
                    }
                }
                (BinaryConstraintOp::Eq, Some(value), None) => {
                    if let Some(name) = c.rhs.variable_name() {
                        let mut extended = subst.clone();
                        extended.insert(name, value);
                        satisfy(&rest, db, &extended, out);
                    }
                }
                (BinaryConstraintOp::Eq, None, Some(value)) => {
                    if let Some(name) = c.lhs.variable_name() {
                        let mut extended = subst.clone();
                        extended.insert(name, value);
                        satisfy(&rest, db, &extended, out);
                    }
                }
                (op, Some(l), Some(r)) => {
                    let holds = match op {
                        BinaryConstraintOp::Ne => l != r,
                        BinaryConstraintOp::Lt => l < r,
                        BinaryConstraintOp::Le => l <= r,
                        BinaryConstraintOp::Gt => l > r,
                        BinaryConstraintOp::Ge => l >= r,
                        _ => false,
                    };
                    if holds {
                        satisfy(&rest, db, subst, out);
                    }
                }
                _ => {}
            }
        }
        Literal::Boolean(b) => {
            if b.value {
                satisfy(&rest, db, subst, out);
            }
        }
    }
}

fn derive(clause: &Clause, db: &Database) -> Vec<(QualifiedName, Tuple)> {
    let literals: Vec<&Literal> = clause.body.iter().collect();
    let mut substitutions = Vec::new();
    satisfy(&literals, db, &Substitution::new(), &mut substitutions);

    let mut derived = Vec::new();
    for subst in substitutions {
        let tuple: Option<Tuple> = clause
            .head
            .args
            .iter()
            .map(|arg| eval_argument(arg, &subst))
            .collect();
        if let Some(tuple) = tuple {
            derived.push((clause.head.name.clone(), tuple));
        }
    }
    derived
}

/// Run all clauses to a global fixpoint over the given extensional
/// facts.
pub fn evaluate(program: &Program, edb: &Database) -> Database {
    let mut db = edb.clone();
    let mut changed = true;
    while changed {
        changed = false;
        for clause in &program.clauses {
            for (name, tuple) in derive(clause, &db) {
                changed |= db.insert(name, tuple);
            }
        }
    }
    db
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{number_relation, var_rule};
    use datalog_ast::Program;

    #[test]
    fn test_transitive_closure_evaluation() {
        let mut program = Program::new();
        program.add_relation(number_relation("e", 2));
        program.add_relation(number_relation("p", 2));
        program.add_clause(var_rule(("p", &["x", "y"]), &[("e", &["x", "y"])]));
        program.add_clause(var_rule(
            ("p", &["x", "z"]),
            &[("p", &["x", "y"]), ("e", &["y", "z"])],
        ));

        let mut edb = Database::new();
        edb.insert("e", vec![1, 2]);
        edb.insert("e", vec![2, 3]);

        let result = evaluate(&program, &edb);
        assert_eq!(
            result.tuples(&"p".into()),
            BTreeSet::from([vec![1, 2], vec![2, 3], vec![1, 3]])
        );
    }

    #[test]
    fn test_equality_binding_drives_rule() {
        // p(x) :- x = 4.
        use datalog_ast::{Argument, Atom, BinaryConstraint, Clause, Literal};
        let mut program = Program::new();
        program.add_relation(number_relation("p", 1));
        program.add_clause(Clause::new(
            Atom::new("p", vec![Argument::var("x")]),
            vec![Literal::Constraint(BinaryConstraint::new(
                BinaryConstraintOp::Eq,
                Argument::var("x"),
                Argument::number(4),
            ))],
        ));

        let result = evaluate(&program, &Database::new());
        assert_eq!(result.tuples(&"p".into()), BTreeSet::from([vec![4]]));
    }

    #[test]
    fn test_zero_arity_seed_fires_rule() {
        // seed(). p(x) :- seed(), e(x).
        use datalog_ast::{Atom, Clause};
        let mut program = Program::new();
        program.add_clause(Clause::fact(Atom::new("seed", vec![])));
        program.add_clause(var_rule(("p", &["x"]), &[("seed", &[]), ("e", &["x"])]));

        let mut edb = Database::new();
        edb.insert("e", vec![9]);

        let result = evaluate(&program, &edb);
        assert_eq!(result.tuples(&"p".into()), BTreeSet::from([vec![9]]));
    }
}
