//! Grounded-terms analysis.
//!
//! Computes, per clause, which argument nodes are bound to concrete
//! values under fixpoint semantics. The result is keyed by [`ArgId`]:
//! clones of a clause get fresh ids and therefore fresh maps.
//!
//! Closure rules:
//!
//! - constants, counters and aggregator results are grounded
//! - every direct argument of a positive body atom is grounded
//!   (aggregator bodies included, negated atoms excluded)
//! - groundedness of a variable is shared by all its occurrences
//! - an `=` constraint propagates groundedness both ways
//! - a type cast is grounded iff its operand is
//! - a functor is grounded once all its arguments are
//! - a record is grounded iff all its fields are, in both directions
//!
//! Head arguments are only grounded through these rules, never by
//! virtue of being in the head.

use datalog_ast::{visit, ArgId, ArgKind, Argument, Atom, BinaryConstraintOp, Clause, Literal, Symbol};
use std::collections::BTreeMap;

pub type GroundingMap = BTreeMap<ArgId, bool>;

enum NodeRule {
    /// Grounded from the start: constants, counters, aggregators.
    Intrinsic,
    /// Grounded via the rules only.
    Inert,
    Variable(Symbol),
    /// node <=> child (type cast)
    Mirror(ArgId),
    /// node <= all children (functors)
    FromChildren(Vec<ArgId>),
    /// node <=> all children (records)
    Congruent(Vec<ArgId>),
}

/// Compute the grounding map of a clause.
pub fn grounded_terms(clause: &Clause) -> GroundingMap {
    let mut nodes: BTreeMap<ArgId, NodeRule> = BTreeMap::new();
    visit::for_each_argument_in_clause(clause, &mut |arg| {
        nodes.insert(arg.id, rule_for(arg));
    });

    let mut seeds: Vec<ArgId> = Vec::new();
    let mut equalities: Vec<(ArgId, ArgId)> = Vec::new();
    for lit in &clause.body {
        collect_literal(lit, &mut seeds, &mut equalities);
    }
    // The head provides no values; only its nested aggregators do.
    for arg in &clause.head.args {
        collect_argument(arg, &mut seeds, &mut equalities);
    }

    let mut grounded: BTreeMap<ArgId, bool> = nodes
        .iter()
        .map(|(&id, rule)| (id, matches!(rule, NodeRule::Intrinsic)))
        .collect();
    for id in seeds {
        grounded.insert(id, true);
    }

    // Same-named occurrences share groundedness.
    let mut classes: BTreeMap<Symbol, Vec<ArgId>> = BTreeMap::new();
    for (&id, rule) in &nodes {
        if let NodeRule::Variable(name) = rule {
            classes.entry(*name).or_default().push(id);
        }
    }

    let mut changed = true;
    while changed {
        changed = false;

        for ids in classes.values() {
            if ids.iter().any(|id| grounded[id]) {
                for id in ids {
                    changed |= mark(&mut grounded, *id);
                }
            }
        }

        for &(lhs, rhs) in &equalities {
            if grounded[&lhs] {
                changed |= mark(&mut grounded, rhs);
            }
            if grounded[&rhs] {
                changed |= mark(&mut grounded, lhs);
            }
        }

        for (&id, rule) in &nodes {
            match rule {
                NodeRule::Mirror(child) => {
                    if grounded[&id] {
                        changed |= mark(&mut grounded, *child);
                    }
                    if grounded[child] {
                        changed |= mark(&mut grounded, id);
                    }
                }
                NodeRule::FromChildren(children) => {
                    if children.iter().all(|c| grounded[c]) {
                        changed |= mark(&mut grounded, id);
                    }
                }
                NodeRule::Congruent(children) => {
                    if grounded[&id] {
                        for child in children {
                            changed |= mark(&mut grounded, *child);
                        }
                    }
                    if children.iter().all(|c| grounded[c]) {
                        changed |= mark(&mut grounded, id);
                    }
                }
                _ => {}
            }
        }
    }

    grounded
}

fn mark(grounded: &mut BTreeMap<ArgId, bool>, id: ArgId) -> bool {
    let slot = grounded.get_mut(&id).expect("node collected before marking");
    if *slot {
        false
    } else {
        *slot = true;
        true
    }
}

fn rule_for(arg: &Argument) -> NodeRule {
    match &arg.kind {
        ArgKind::Number(_) | ArgKind::Text(_) | ArgKind::Counter => NodeRule::Intrinsic,
        ArgKind::Aggregator(_) => NodeRule::Intrinsic,
        ArgKind::Variable(name) => NodeRule::Variable(*name),
        ArgKind::Unnamed => NodeRule::Inert,
        ArgKind::TypeCast(inner, _) => NodeRule::Mirror(inner.id),
        ArgKind::IntrinsicFunctor(_, args) | ArgKind::UserFunctor(_, args) => {
            NodeRule::FromChildren(args.iter().map(|a| a.id).collect())
        }
        ArgKind::RecordInit(_, args) => {
            NodeRule::Congruent(args.iter().map(|a| a.id).collect())
        }
    }
}

fn collect_literal(lit: &Literal, seeds: &mut Vec<ArgId>, equalities: &mut Vec<(ArgId, ArgId)>) {
    match lit {
        Literal::Atom(atom) => {
            for arg in &atom.args {
                seeds.push(arg.id);
            }
            collect_atom_arguments(atom, seeds, equalities);
        }
        Literal::Negation(atom) => {
            collect_atom_arguments(atom, seeds, equalities);
        }
        Literal::Constraint(c) => {
            if c.op == BinaryConstraintOp::Eq {
                equalities.push((c.lhs.id, c.rhs.id));
            }
            collect_argument(&c.lhs, seeds, equalities);
            collect_argument(&c.rhs, seeds, equalities);
        }
        Literal::Boolean(_) => {}
    }
}

fn collect_atom_arguments(
    atom: &Atom,
    seeds: &mut Vec<ArgId>,
    equalities: &mut Vec<(ArgId, ArgId)>,
) {
    for arg in &atom.args {
        collect_argument(arg, seeds, equalities);
    }
}

// Descend looking for aggregator bodies: their positive atoms and
// equality constraints take part in the clause-wide closure.
fn collect_argument(arg: &Argument, seeds: &mut Vec<ArgId>, equalities: &mut Vec<(ArgId, ArgId)>) {
    match &arg.kind {
        ArgKind::TypeCast(inner, _) => collect_argument(inner, seeds, equalities),
        ArgKind::IntrinsicFunctor(_, args)
        | ArgKind::UserFunctor(_, args)
        | ArgKind::RecordInit(_, args) => {
            for child in args {
                collect_argument(child, seeds, equalities);
            }
        }
        ArgKind::Aggregator(aggr) => {
            if let Some(target) = &aggr.target {
                collect_argument(target, seeds, equalities);
            }
            for lit in &aggr.body {
                collect_literal(lit, seeds, equalities);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datalog_ast::{Atom, BinaryConstraint, Span};

    fn grounding_of<'a>(clause: &'a Clause, map: &GroundingMap) -> BTreeMap<String, bool> {
        let mut result = BTreeMap::new();
        visit::for_each_variable_in_clause(clause, &mut |arg, name| {
            let entry = result.entry(name.to_string()).or_insert(true);
            *entry = *entry && map[&arg.id];
        });
        result
    }

    #[test]
    fn test_positive_atom_grounds_variable() {
        // p(x) :- q(x, y).
        let clause = Clause::new(
            Atom::new("p", vec![Argument::var("x")]),
            vec![Literal::Atom(Atom::new(
                "q",
                vec![Argument::var("x"), Argument::var("y")],
            ))],
        );
        let map = grounded_terms(&clause);
        let by_var = grounding_of(&clause, &map);
        assert!(by_var["x"]);
        assert!(by_var["y"]);
    }

    #[test]
    fn test_head_only_variable_is_ungrounded() {
        // p(x) :- q(y).
        let clause = Clause::new(
            Atom::new("p", vec![Argument::var("x")]),
            vec![Literal::Atom(Atom::new("q", vec![Argument::var("y")]))],
        );
        let map = grounded_terms(&clause);
        let by_var = grounding_of(&clause, &map);
        assert!(!by_var["x"]);
        assert!(by_var["y"]);
    }

    #[test]
    fn test_negation_grounds_nothing() {
        // p(x) :- !q(x).
        let clause = Clause::new(
            Atom::new("p", vec![Argument::var("x")]),
            vec![Literal::Negation(Atom::new("q", vec![Argument::var("x")]))],
        );
        let map = grounded_terms(&clause);
        assert!(!grounding_of(&clause, &map)["x"]);
    }

    #[test]
    fn test_equality_propagates_both_ways() {
        // p(x) :- q(y), x = y.
        let clause = Clause::new(
            Atom::new("p", vec![Argument::var("x")]),
            vec![
                Literal::Atom(Atom::new("q", vec![Argument::var("y")])),
                Literal::Constraint(BinaryConstraint::new(
                    BinaryConstraintOp::Eq,
                    Argument::var("x"),
                    Argument::var("y"),
                )),
            ],
        );
        let map = grounded_terms(&clause);
        assert!(grounding_of(&clause, &map)["x"]);
    }

    #[test]
    fn test_record_grounds_fields_both_directions() {
        // p(x) :- q(r), r = [x, y].
        let record = Argument::new(
            ArgKind::RecordInit(
                "pair".into(),
                vec![Argument::var("x"), Argument::var("y")],
            ),
            Span::internal(),
        );
        let clause = Clause::new(
            Atom::new("p", vec![Argument::var("x")]),
            vec![
                Literal::Atom(Atom::new("q", vec![Argument::var("r")])),
                Literal::Constraint(BinaryConstraint::new(
                    BinaryConstraintOp::Eq,
                    Argument::var("r"),
                    record,
                )),
            ],
        );
        let map = grounded_terms(&clause);
        let by_var = grounding_of(&clause, &map);
        assert!(by_var["x"]);
        assert!(by_var["y"]);
    }

    #[test]
    fn test_functor_needs_all_arguments() {
        // p(z) :- q(x), z = x + w.   (w free, so z stays free)
        let clause = Clause::new(
            Atom::new("p", vec![Argument::var("z")]),
            vec![
                Literal::Atom(Atom::new("q", vec![Argument::var("x")])),
                Literal::Constraint(BinaryConstraint::new(
                    BinaryConstraintOp::Eq,
                    Argument::var("z"),
                    Argument::new(
                        ArgKind::IntrinsicFunctor(
                            datalog_ast::FunctorOp::Add,
                            vec![Argument::var("x"), Argument::var("w")],
                        ),
                        Span::internal(),
                    ),
                )),
            ],
        );
        let map = grounded_terms(&clause);
        let by_var = grounding_of(&clause, &map);
        assert!(by_var["x"]);
        assert!(!by_var["w"]);
        assert!(!by_var["z"]);
    }

    #[test]
    fn test_aggregator_grounds_result_not_witness() {
        // head(x) :- x = max y : { body(y, z) }.
        // x is grounded (aggregator result); z is grounded only inside.
        let aggr = Argument::new(
            ArgKind::Aggregator(Box::new(datalog_ast::Aggregator {
                op: datalog_ast::AggregateOp::Max,
                target: Some(Argument::var("y")),
                body: vec![Literal::Atom(Atom::new(
                    "body",
                    vec![Argument::var("y"), Argument::var("z")],
                ))],
            })),
            Span::internal(),
        );
        let clause = Clause::new(
            Atom::new("head", vec![Argument::var("x")]),
            vec![Literal::Constraint(BinaryConstraint::new(
                BinaryConstraintOp::Eq,
                Argument::var("x"),
                aggr,
            ))],
        );
        let map = grounded_terms(&clause);
        let by_var = grounding_of(&clause, &map);
        assert!(by_var["x"]);
        assert!(by_var["y"]);
        assert!(by_var["z"]);
    }
}
