//! End-to-end tests for the middle-end
//!
//! Scenario tests drive the checker and the magic-set pipeline over
//! hand-built programs; the property tests validate the rewrite
//! invariants against the naive reference evaluator in [`eval`].

pub mod eval;

#[cfg(test)]
mod checker_scenarios;
#[cfg(test)]
mod magic_scenarios;
#[cfg(test)]
mod proptest_rewrites;

use datalog_ast::{Argument, Atom, Attribute, Clause, Literal, Relation};

/// Relation with `n` number-typed columns.
pub fn number_relation(name: &str, arity: usize) -> Relation {
    let columns = ["a", "b", "c", "d"];
    Relation::new(
        name,
        (0..arity).map(|i| Attribute::new(columns[i], "number")).collect(),
    )
}

/// `head(vars…) :- body…` over plain variables.
pub fn var_rule(head: (&str, &[&str]), body: &[(&str, &[&str])]) -> Clause {
    Clause::new(
        var_atom(head.0, head.1),
        body.iter()
            .map(|(name, vars)| Literal::Atom(var_atom(name, vars)))
            .collect(),
    )
}

pub fn var_atom(name: &str, vars: &[&str]) -> Atom {
    Atom::new(name, vars.iter().map(|v| Argument::var(v)).collect())
}
