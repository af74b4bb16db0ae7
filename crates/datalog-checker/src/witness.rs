//! Aggregator witness legality.
//!
//! An aggregator's inner scope may ground variables of its own; such a
//! variable must not be used in the outer scope with no other source of
//! groundedness. The check builds two copies of each body: the original,
//! and one with every aggregator replaced by a fresh, forcibly grounded
//! variable. An argument grounded in the original but not in the
//! aggregator-free copy can only have been witnessed through an
//! aggregator body, which is illegal.

use datalog_analysis::grounded_terms;
use datalog_ast::{
    visit, ArgId, ArgKind, Argument, Atom, Clause, ErrorReport, Literal, Program, Span, Symbol,
};
use internment::Intern;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_AGGR_VAR: AtomicUsize = AtomicUsize::new(0);

pub fn check_witness_problem(program: &Program, report: &mut ErrorReport) {
    for clause in &program.clauses {
        // Head variables take part as initially ungrounded terms: a
        // negated pseudo-atom mentions them without grounding them.
        let mut literals: Vec<Literal> = clause.body.clone();
        let mut head_vars = Vec::new();
        visit::for_each_variable_in_atom(&clause.head, &mut |arg, _| {
            head_vars.push(arg.clone());
        });
        literals.push(Literal::Negation(Atom::new("*", head_vars)));

        for span in uses_invalid_witness(&literals, &[]) {
            report.add_error(
                "Witness problem: argument grounded by an aggregator's inner scope is used ungrounded in outer scope",
                span,
            );
        }
    }
}

/// Spans of arguments witnessed only through an aggregator body.
/// `grounded_args` are forced grounded in both copies, representing
/// bindings inherited from the enclosing scope.
fn uses_invalid_witness(literals: &[Literal], grounded_args: &[Argument]) -> Vec<Span> {
    let mut result = Vec::new();

    // Copy 1 keeps the aggregators; copy 2 replaces them. Clones get
    // fresh node ids, so pair them up positionally before rewriting.
    let original_body: Vec<Literal> = literals.to_vec();
    let mut aggregatorless_body: Vec<Literal> = literals.to_vec();

    let mut twin: BTreeMap<ArgId, ArgId> = BTreeMap::new();
    for (first, second) in original_body.iter().zip(&aggregatorless_body) {
        let mut first_args = Vec::new();
        visit::for_each_argument_in_literal(first, &mut |arg| first_args.push(arg.id));
        let mut second_args = Vec::new();
        visit::for_each_argument_in_literal(second, &mut |arg| second_args.push(arg.id));
        for (a, b) in second_args.into_iter().zip(first_args) {
            twin.insert(a, b);
        }
    }

    let mut aggregator_vars: Vec<Symbol> = Vec::new();
    for lit in &mut aggregatorless_body {
        replace_aggregators_in_literal(lit, &mut aggregator_vars);
    }

    // Synthetic atom forcing the replacement variables (and the
    // inherited bindings) to be grounded.
    let mut forced: Vec<Argument> = aggregator_vars
        .iter()
        .map(|name| Argument::new(ArgKind::Variable(*name), Span::internal()))
        .collect();
    forced.extend(grounded_args.iter().cloned());
    let mut aggregatorless_clause = Clause::new(Atom::new("*", Vec::new()), aggregatorless_body);
    aggregatorless_clause
        .body
        .push(Literal::Atom(Atom::new("grounding_atom", forced)));

    let mut original_clause = Clause::new(Atom::new("*", Vec::new()), original_body);
    original_clause.body.push(Literal::Atom(Atom::new(
        "grounding_atom",
        grounded_args.to_vec(),
    )));

    let original_grounded = grounded_terms(&original_clause);
    let aggregatorless_grounded = grounded_terms(&aggregatorless_clause);

    // Everything added to copy 2 was forced grounded, so an ungrounded
    // argument there that is grounded in copy 1 was witnessed through
    // an aggregator body.
    let mut newly_grounded: Vec<Argument> = Vec::new();
    let mut spans: BTreeMap<ArgId, Span> = BTreeMap::new();
    let mut args_of_copy: Vec<ArgId> = Vec::new();
    for (index, lit) in aggregatorless_clause.body.iter().enumerate() {
        // skip the synthetic grounding atom
        if index + 1 == aggregatorless_clause.body.len() {
            break;
        }
        visit::for_each_argument_in_literal(lit, &mut |arg| {
            args_of_copy.push(arg.id);
            spans.insert(arg.id, arg.span);
            newly_grounded.push(arg.clone());
        });
    }
    for id in args_of_copy {
        if !aggregatorless_grounded[&id] {
            if let Some(first_id) = twin.get(&id) {
                if original_grounded
                    .get(first_id)
                    .copied()
                    .unwrap_or(false)
                {
                    result.push(spans[&id]);
                }
            }
        }
    }

    newly_grounded.extend(grounded_args.iter().cloned());

    // Recurse into each aggregator body with the enlarged grounded set.
    for lit in literals {
        visit::for_each_argument_in_literal(lit, &mut |arg| {
            if let ArgKind::Aggregator(aggr) = &arg.kind {
                result.extend(uses_invalid_witness(&aggr.body, &newly_grounded));
            }
        });
    }

    result
}

/// Replace every aggregator in the literal by a fresh `+aggr_var_<k>`
/// variable, outermost first.
fn replace_aggregators_in_literal(lit: &mut Literal, names: &mut Vec<Symbol>) {
    match lit {
        Literal::Atom(atom) | Literal::Negation(atom) => {
            for arg in &mut atom.args {
                replace_aggregators_in_argument(arg, names);
            }
        }
        Literal::Constraint(c) => {
            replace_aggregators_in_argument(&mut c.lhs, names);
            replace_aggregators_in_argument(&mut c.rhs, names);
        }
        Literal::Boolean(_) => {}
    }
}

fn replace_aggregators_in_argument(arg: &mut Argument, names: &mut Vec<Symbol>) {
    if matches!(arg.kind, ArgKind::Aggregator(_)) {
        let k = NEXT_AGGR_VAR.fetch_add(1, Ordering::Relaxed);
        let name = Intern::new(format!("+aggr_var_{}", k));
        names.push(name);
        *arg = Argument::new(ArgKind::Variable(name), arg.span);
        return;
    }
    match &mut arg.kind {
        ArgKind::TypeCast(inner, _) => replace_aggregators_in_argument(inner, names),
        ArgKind::IntrinsicFunctor(_, args)
        | ArgKind::UserFunctor(_, args)
        | ArgKind::RecordInit(_, args) => {
            for child in args {
                replace_aggregators_in_argument(child, names);
            }
        }
        _ => {}
    }
}
