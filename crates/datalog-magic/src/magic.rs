//! The magic-set core rewrite.
//!
//! Runs on the adorned program. Each clause with an adorned head is
//! refined by a leading magic atom carrying the head's bound columns,
//! and every adorned body atom yields a supplementary rule deriving its
//! magic relation from the demand context to its left. The demand seed
//! needs no special case: the querified output's rule has no bound
//! columns, so its supplementary rule is a bodyless magic fact.

use crate::adorn::{adornment_of, is_adorned_name};
use datalog_analysis::{TranslationUnit, Transformer};
use datalog_ast::{
    visit, ArgKind, Atom, BinaryConstraint, BinaryConstraintOp, Clause, Literal, Program,
    QualifiedName, Relation, Symbol,
};
use std::collections::BTreeSet;

pub struct MagicSetCoreTransformer;

fn is_magic_name(name: &QualifiedName) -> bool {
    name.first() == "@magic"
}

/// The magic atom of an adorned atom: `@magic.R.{s}` applied to the
/// arguments in bound positions. Declares the magic relation with the
/// projected attributes on first use.
fn magic_atom(
    program: &Program,
    atom: &Atom,
    declared: &mut BTreeSet<QualifiedName>,
    new_relations: &mut Vec<Relation>,
) -> Atom {
    let magic_name = atom.name.prepended("@magic");
    let marker = adornment_of(&atom.name).to_string();

    let args = atom
        .args
        .iter()
        .zip(marker.chars())
        .filter(|(_, flag)| *flag == 'b')
        .map(|(arg, _)| arg.clone())
        .collect();

    if declared.insert(magic_name.clone()) {
        if let Some(rel) = program.relation(&atom.name) {
            let attributes = rel
                .attributes
                .iter()
                .zip(marker.chars())
                .filter(|(_, flag)| *flag == 'b')
                .map(|(attr, _)| attr.clone())
                .collect();
            new_relations.push(Relation::new(magic_name.clone(), attributes));
        }
    }

    Atom::new(magic_name, args).with_span(atom.span)
}

/// Equality constraints eligible for supplementary rules: `=` with a
/// variable left side or a constant right side, aggregator-free.
fn eligible_equalities(clause: &Clause) -> Vec<&BinaryConstraint> {
    clause
        .body
        .iter()
        .filter_map(|lit| match lit {
            Literal::Constraint(c) if c.op == BinaryConstraintOp::Eq => Some(c),
            _ => None,
        })
        .filter(|c| {
            matches!(c.lhs.kind, ArgKind::Variable(_)) || c.rhs.is_constant()
        })
        .filter(|c| {
            let mut has_aggregator = false;
            for side in [&c.lhs, &c.rhs] {
                visit::for_each_argument(side, &mut |arg| {
                    if matches!(arg.kind, ArgKind::Aggregator(_)) {
                        has_aggregator = true;
                    }
                });
            }
            !has_aggregator
        })
        .collect()
}

fn variables_of(atom: &Atom) -> BTreeSet<Symbol> {
    let mut vars = BTreeSet::new();
    visit::for_each_variable_in_atom(atom, &mut |_, name| {
        vars.insert(name);
    });
    vars
}

fn constraint_variables(constraint: &BinaryConstraint) -> BTreeSet<Symbol> {
    let mut vars = BTreeSet::new();
    for side in [&constraint.lhs, &constraint.rhs] {
        visit::for_each_argument(side, &mut |arg| {
            if let ArgKind::Variable(name) = &arg.kind {
                vars.insert(*name);
            }
        });
    }
    vars
}

/// Supplementary rule for `atom`: its magic head derives from the
/// constraining atoms to the left plus every equality whose variables
/// are all in scope. Record equalities widen the scope to fixpoint
/// first: a bound variable equated to a record pattern binds everything
/// reachable through the pattern.
fn build_magic_clause(
    program: &Program,
    atom: &Atom,
    constraining: &[Atom],
    equalities: &[&BinaryConstraint],
    declared: &mut BTreeSet<QualifiedName>,
    new_relations: &mut Vec<Relation>,
) -> Clause {
    let head = magic_atom(program, atom, declared, new_relations);

    let mut in_scope: BTreeSet<Symbol> = variables_of(&head);
    for constraining_atom in constraining {
        in_scope.extend(variables_of(constraining_atom));
    }

    let mut widened = true;
    while widened {
        widened = false;
        for eq in equalities {
            let record_bound = (matches!(eq.rhs.kind, ArgKind::RecordInit(_, _))
                && eq
                    .lhs
                    .variable_name()
                    .is_some_and(|name| in_scope.contains(&name)))
                || (matches!(eq.lhs.kind, ArgKind::RecordInit(_, _))
                    && eq
                        .rhs
                        .variable_name()
                        .is_some_and(|name| in_scope.contains(&name)));
            if record_bound {
                for name in constraint_variables(eq) {
                    if in_scope.insert(name) {
                        widened = true;
                    }
                }
            }
        }
    }

    let mut body: Vec<Literal> = constraining
        .iter()
        .map(|a| Literal::Atom(a.clone()))
        .collect();
    for eq in equalities {
        if constraint_variables(eq).is_subset(&in_scope) {
            body.push(Literal::Constraint((*eq).clone()));
        }
    }

    Clause::generated(head, body)
}

impl Transformer for MagicSetCoreTransformer {
    fn name(&self) -> &'static str {
        "MagicSetCoreTransformer"
    }

    fn transform(&mut self, tu: &mut TranslationUnit) -> bool {
        let mut declared: BTreeSet<QualifiedName> = tu
            .program
            .relations
            .iter()
            .filter(|rel| is_magic_name(&rel.name))
            .map(|rel| rel.name.clone())
            .collect();
        let mut new_relations: Vec<Relation> = Vec::new();
        let mut new_clauses: Vec<Clause> = Vec::new();

        // Supplementary rules already present (from an earlier run) are
        // not minted again.
        let mut emitted_magic: BTreeSet<String> = tu
            .program
            .clauses
            .iter()
            .filter(|clause| is_magic_name(&clause.head.name))
            .map(Clause::to_string)
            .collect();

        for clause in &tu.program.clauses {
            let head_adorned = is_adorned_name(&clause.head.name);
            let already_refined = clause.body.iter().any(|lit| {
                matches!(lit, Literal::Atom(atom) if is_magic_name(&atom.name))
            });
            if is_magic_name(&clause.head.name) || already_refined {
                new_clauses.push(clause.clone());
                continue;
            }

            // (1) Refine: adorned heads only fire under demand.
            if head_adorned {
                let mut refined = clause.clone();
                let magic = magic_atom(
                    &tu.program,
                    &clause.head,
                    &mut declared,
                    &mut new_relations,
                );
                refined.body.insert(0, Literal::Atom(magic));
                new_clauses.push(refined);
            } else {
                new_clauses.push(clause.clone());
            }

            // (2) Supplementary rules: one per adorned body atom.
            let equalities = eligible_equalities(clause);
            let mut constraining: Vec<Atom> = Vec::new();
            if head_adorned {
                constraining.push(magic_atom(
                    &tu.program,
                    &clause.head,
                    &mut declared,
                    &mut new_relations,
                ));
            }
            for lit in &clause.body {
                let Literal::Atom(atom) = lit else {
                    continue;
                };
                if !is_adorned_name(&atom.name) {
                    constraining.push(atom.clone());
                    continue;
                }
                let supplementary = build_magic_clause(
                    &tu.program,
                    atom,
                    &constraining,
                    &equalities,
                    &mut declared,
                    &mut new_relations,
                );
                if emitted_magic.insert(supplementary.to_string()) {
                    new_clauses.push(supplementary);
                }
                constraining.push(atom.clone());
            }
        }

        let changed = new_clauses != tu.program.clauses || !new_relations.is_empty();
        tu.program.clauses = new_clauses;
        for rel in new_relations {
            tu.program.add_relation(rel);
        }
        changed
    }
}
