//! Legality of the `inline` qualifier.

use datalog_analysis::{IoTypes, PrecedenceGraph};
use datalog_ast::{
    visit, ArgKind, Argument, Atom, ErrorReport, Literal, Program, QualifiedName, Span,
};
use std::collections::{BTreeMap, BTreeSet};

pub fn check_inlining(
    program: &Program,
    precedence: &PrecedenceGraph,
    io: &IoTypes,
    report: &mut ErrorReport,
) {
    let mut inlined: BTreeSet<QualifiedName> = BTreeSet::new();
    for rel in &program.relations {
        if rel.is_inline() {
            inlined.insert(rel.name.clone());
            if io.is_io(&rel.name) {
                report.add_error(
                    format!("IO relation {} cannot be inlined", rel.name),
                    rel.span,
                );
            }
        }
    }

    // The subgraph of the precedence graph induced by inlined relations
    // must be acyclic.
    if let Some(cycle) = find_inline_cycle(precedence, &inlined) {
        let origin = cycle.last().expect("cycle is non-empty");
        let mut rendered = format!("{{{}", origin);
        for name in cycle.iter().rev().skip(1) {
            rendered.push_str(&format!(", {}", name));
        }
        rendered.push('}');
        let span = program
            .relation(origin)
            .map(|rel| rel.span)
            .unwrap_or_else(Span::internal);
        report.add_error(
            format!("Cannot inline cyclically dependent relations {}", rendered),
            span,
        );
    }

    // No counter may flow through an inlined relation, neither at use
    // sites nor inside its defining clauses.
    visit::for_each_atom_in_program(program, &mut |atom| {
        if inlined.contains(&atom.name) {
            visit::for_each_argument_in_atom(atom, &mut |arg| {
                if matches!(arg.kind, ArgKind::Counter) {
                    report.add_error(
                        "Cannot inline literal containing a counter argument '$'",
                        arg.span,
                    );
                }
            });
        }
    });
    for name in &inlined {
        for clause in program.clauses_of(name) {
            visit::for_each_argument_in_clause(clause, &mut |arg| {
                if matches!(arg.kind, ArgKind::Counter) {
                    report.add_error(
                        "Cannot inline clause containing a counter argument '$'",
                        arg.span,
                    );
                }
            });
        }
    }

    // A negated inline relation must not introduce body variables that
    // are absent from its head.
    let mut non_negatable: BTreeSet<QualifiedName> = BTreeSet::new();
    for name in &inlined {
        'clauses: for clause in program.clauses_of(name) {
            let mut head_vars = BTreeSet::new();
            visit::for_each_variable_in_atom(&clause.head, &mut |_, var| {
                head_vars.insert(var);
            });
            let mut body_vars = BTreeSet::new();
            for lit in &clause.body {
                visit::for_each_argument_in_literal(lit, &mut |arg| {
                    if let ArgKind::Variable(var) = &arg.kind {
                        body_vars.insert(*var);
                    }
                });
            }
            for var in body_vars {
                if !head_vars.contains(&var) {
                    non_negatable.insert(name.clone());
                    break 'clauses;
                }
            }
        }
    }
    for_each_negation(program, &mut |atom| {
        if non_negatable.contains(&atom.name) {
            report.add_error(
                "Cannot inline negated relation which may introduce new variables",
                atom.span,
            );
        }
    });

    // Inlining an aggregated relation changes aggregate results when
    // one of the unfolded bodies is empty.
    for clause in &program.clauses {
        visit::for_each_argument_in_clause(clause, &mut |arg| {
            if let ArgKind::Aggregator(aggr) = &arg.kind {
                for lit in &aggr.body {
                    visit::for_each_atom_in_literal(lit, &mut |atom| {
                        if inlined.contains(&atom.name) {
                            report.add_error(
                                "Cannot inline relations that appear in aggregator",
                                atom.span,
                            );
                        }
                    });
                }
            }
        });
    }

    // Unnamed variables get named during inlining and would turn
    // ungrounded under negation, except inside nested aggregators.
    for_each_negation(program, &mut |atom| {
        if inlined.contains(&atom.name) {
            if let Some(span) = find_invalid_underscore(atom) {
                report.add_error(
                    "Cannot inline negated atom containing an unnamed variable unless the variable is within an aggregator",
                    span,
                );
            }
        }
    });
}

/// Depth-first search over the inlined subgraph; returns a cycle in
/// traversal order if one exists.
fn find_inline_cycle(
    precedence: &PrecedenceGraph,
    inlined: &BTreeSet<QualifiedName>,
) -> Option<Vec<QualifiedName>> {
    let mut unvisited: BTreeSet<QualifiedName> = inlined.clone();
    let mut visiting: BTreeSet<QualifiedName> = BTreeSet::new();
    let mut visited: BTreeSet<QualifiedName> = BTreeSet::new();
    let mut origins: BTreeMap<QualifiedName, Option<QualifiedName>> = BTreeMap::new();

    while let Some(start) = unvisited.iter().next().cloned() {
        unvisited.remove(&start);
        visiting.insert(start.clone());
        origins.insert(start.clone(), None);

        if let Some(cycle) = visit_for_cycle(
            precedence,
            inlined,
            &start,
            &mut unvisited,
            &mut visiting,
            &mut visited,
            &mut origins,
        ) {
            return Some(cycle);
        }
    }
    None
}

fn visit_for_cycle(
    precedence: &PrecedenceGraph,
    inlined: &BTreeSet<QualifiedName>,
    current: &QualifiedName,
    unvisited: &mut BTreeSet<QualifiedName>,
    visiting: &mut BTreeSet<QualifiedName>,
    visited: &mut BTreeSet<QualifiedName>,
    origins: &mut BTreeMap<QualifiedName, Option<QualifiedName>>,
) -> Option<Vec<QualifiedName>> {
    for successor in precedence.successors(current) {
        if !inlined.contains(successor) || visited.contains(successor) {
            continue;
        }
        if visiting.contains(successor) {
            // Cycle found; walk the origin chain backwards.
            let mut cycle = Vec::new();
            let mut walk = Some(current.clone());
            while let Some(name) = walk {
                walk = origins.get(&name).cloned().flatten();
                cycle.push(name);
            }
            return Some(cycle);
        }

        origins.insert(successor.clone(), Some(current.clone()));
        unvisited.remove(successor);
        visiting.insert(successor.clone());
        let successor = successor.clone();
        if let Some(cycle) = visit_for_cycle(
            precedence, inlined, &successor, unvisited, visiting, visited, origins,
        ) {
            return Some(cycle);
        }
    }

    visiting.remove(current);
    visited.insert(current.clone());
    None
}

/// Visit every negated atom of the program, aggregator bodies included.
fn for_each_negation(program: &Program, f: &mut impl FnMut(&Atom)) {
    fn walk_literal(lit: &Literal, f: &mut impl FnMut(&Atom)) {
        match lit {
            Literal::Negation(atom) => {
                f(atom);
                for arg in &atom.args {
                    walk_argument(arg, f);
                }
            }
            Literal::Atom(atom) => {
                for arg in &atom.args {
                    walk_argument(arg, f);
                }
            }
            Literal::Constraint(c) => {
                walk_argument(&c.lhs, f);
                walk_argument(&c.rhs, f);
            }
            Literal::Boolean(_) => {}
        }
    }
    fn walk_argument(arg: &Argument, f: &mut impl FnMut(&Atom)) {
        match &arg.kind {
            ArgKind::TypeCast(inner, _) => walk_argument(inner, f),
            ArgKind::IntrinsicFunctor(_, args)
            | ArgKind::UserFunctor(_, args)
            | ArgKind::RecordInit(_, args) => {
                for child in args {
                    walk_argument(child, f);
                }
            }
            ArgKind::Aggregator(aggr) => {
                for lit in &aggr.body {
                    walk_literal(lit, f);
                }
            }
            _ => {}
        }
    }
    for clause in &program.clauses {
        for lit in &clause.body {
            walk_literal(lit, f);
        }
    }
}

/// First unnamed variable under the atom that is not shielded by an
/// aggregator.
fn find_invalid_underscore(atom: &Atom) -> Option<Span> {
    fn walk(arg: &Argument) -> Option<Span> {
        match &arg.kind {
            ArgKind::Unnamed => Some(arg.span),
            ArgKind::Aggregator(_) => None,
            ArgKind::TypeCast(inner, _) => walk(inner),
            ArgKind::IntrinsicFunctor(_, args)
            | ArgKind::UserFunctor(_, args)
            | ArgKind::RecordInit(_, args) => args.iter().find_map(walk),
            _ => None,
        }
    }
    atom.args.iter().find_map(walk)
}
