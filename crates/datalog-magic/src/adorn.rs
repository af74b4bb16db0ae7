//! Adornment of the query-driven fragment.
//!
//! Every reachable `(relation, adornment)` pair gets a specialised
//! relation `R.{s}` with `s` over `{b,f}` marking the columns bound on
//! entry. Body atoms are placed by the configured SIPS; the placement
//! order is the order the rewritten clause keeps.

use crate::binding::BindingStore;
use crate::sips::{MaxBoundSips, Sips};
use datalog_analysis::{TranslationUnit, Transformer};
use datalog_ast::{
    visit, ArgKind, Atom, BinaryConstraintOp, Clause, Literal, Program, QualifiedName, Relation,
    RelationRepresentation,
};
use std::collections::BTreeSet;

/// Whether the last name component is an adornment marker `{bf…}`.
pub fn is_adorned_name(name: &QualifiedName) -> bool {
    let last = name.last();
    last.len() >= 2
        && last.starts_with('{')
        && last.ends_with('}')
        && last[1..last.len() - 1].chars().all(|c| c == 'b' || c == 'f')
}

/// The `b`/`f` string encoded in an adorned name.
pub fn adornment_of(name: &QualifiedName) -> &str {
    debug_assert!(is_adorned_name(name));
    let last = name.last();
    &last[1..last.len() - 1]
}

fn adornment_id(name: &QualifiedName, marker: &str) -> QualifiedName {
    if marker.is_empty() {
        name.clone()
    } else {
        name.appended(format!("{{{}}}", marker))
    }
}

pub struct AdornDatabaseTransformer {
    sips: Box<dyn Sips>,
}

impl AdornDatabaseTransformer {
    /// Default strategy: max-bound with EDB tie-break.
    pub fn new() -> Self {
        Self::with_sips(Box::new(MaxBoundSips))
    }

    pub fn with_sips(sips: Box<dyn Sips>) -> Self {
        AdornDatabaseTransformer { sips }
    }
}

impl Default for AdornDatabaseTransformer {
    fn default() -> Self {
        Self::new()
    }
}

fn relation_has_rules(program: &Program, name: &QualifiedName) -> bool {
    program.clauses_of(name).any(|clause| {
        let mut has_atom = false;
        for lit in &clause.body {
            visit::for_each_atom_in_literal(lit, &mut |_| has_atom = true);
        }
        has_atom
    })
}

/// Relations kept out of the demand-driven fragment.
fn ignored_relations(tu: &TranslationUnit) -> BTreeSet<QualifiedName> {
    let program = &tu.program;
    let io = tu.io_types();
    let mut ignored = BTreeSet::new();

    // Only relations named by `magic-transform` take part; `*` opts in
    // everything.
    let specified = tu.config.list("magic-transform");
    if !specified.iter().any(|entry| entry == "*") {
        for rel in &program.relations {
            if !specified.contains(&rel.name.to_string()) {
                ignored.insert(rel.name.clone());
            }
        }
    }

    for rel in &program.relations {
        // Inputs and purely extensional relations are known in constant
        // time.
        if io.is_input(&rel.name) || !relation_has_rules(program, &rel.name) {
            ignored.insert(rel.name.clone());
        }
        if rel.representation == RelationRepresentation::Eqrel {
            ignored.insert(rel.name.clone());
        }
    }

    // Negatively-labelled relations must stay complete.
    visit::for_each_atom_in_program(program, &mut |atom| {
        if atom.name.first() == "@neglabel" {
            ignored.insert(atom.name.clone());
        }
    });

    for clause in &program.clauses {
        let mut unstable = false;
        visit::for_each_literal_in_clause(clause, &mut |lit| {
            if let Literal::Constraint(c) = lit {
                if c.op.is_float() {
                    unstable = true;
                }
            }
        });
        visit::for_each_argument_in_clause(clause, &mut |arg| {
            if let ArgKind::IntrinsicFunctor(op, _) = &arg.kind {
                if op.is_order_dependent() {
                    unstable = true;
                }
            }
        });
        if unstable || clause.plan.is_some() {
            ignored.insert(clause.head.name.clone());
        }
    }

    ignored
}

impl Transformer for AdornDatabaseTransformer {
    fn name(&self) -> &'static str {
        "AdornDatabaseTransformer"
    }

    fn transform(&mut self, tu: &mut TranslationUnit) -> bool {
        let io = tu.io_types();
        let ignored = ignored_relations(tu);

        let edb: BTreeSet<QualifiedName> = tu
            .program
            .relations
            .iter()
            .filter(|rel| {
                io.is_input(&rel.name) || !relation_has_rules(&tu.program, &rel.name)
            })
            .map(|rel| rel.name.clone())
            .collect();

        let is_ignored =
            |name: &QualifiedName| ignored.contains(name) || is_adorned_name(name);

        // Work-list of (relation, adornment) pairs; outputs start the
        // process at the unbound entry.
        let mut todo: BTreeSet<(QualifiedName, String)> = BTreeSet::new();
        let mut seen: BTreeSet<QualifiedName> = BTreeSet::new();
        for rel in &tu.program.relations {
            if is_adorned_name(&rel.name) {
                seen.insert(rel.name.clone());
            }
        }
        for rel in &tu.program.relations {
            if io.is_output(&rel.name) || io.is_print_size(&rel.name) {
                if seen.insert(rel.name.clone()) {
                    todo.insert((rel.name.clone(), String::new()));
                }
            } else if ignored.contains(&rel.name) && seen.insert(rel.name.clone()) {
                todo.insert((rel.name.clone(), String::new()));
            }
        }

        let mut adorned_clauses: Vec<Clause> = Vec::new();
        let mut relations_to_add: Vec<Relation> = Vec::new();
        let mut plain_processed: BTreeSet<QualifiedName> = BTreeSet::new();

        while let Some(pair) = todo.iter().next().cloned() {
            todo.remove(&pair);
            let (rel_name, marker) = pair;
            let Some(rel) = tu.program.relation(&rel_name) else {
                continue;
            };

            if !marker.is_empty() && tu.program.relation(&adornment_id(&rel_name, &marker)).is_none()
            {
                relations_to_add.push(Relation::new(
                    adornment_id(&rel_name, &marker),
                    rel.attributes.clone(),
                ));
            }
            if marker.is_empty() {
                plain_processed.insert(rel_name.clone());
            }

            for clause in tu.program.clauses_of(&rel_name) {
                let mut bindings = BindingStore::new(clause);

                // Head columns marked bound seed the store.
                for (arg, flag) in clause.head.args.iter().zip(marker.chars()) {
                    if flag == 'b' {
                        if let Some(var) = arg.variable_name() {
                            bindings.bind_head_variable(var);
                        }
                    }
                }
                // So do equalities with constants anywhere in the body.
                visit::for_each_literal_in_clause(clause, &mut |lit| {
                    if let Literal::Constraint(c) = lit {
                        if c.op == BinaryConstraintOp::Eq && c.rhs.is_constant() {
                            if let Some(var) = c.lhs.variable_name() {
                                bindings.bind_variable(var);
                            }
                        }
                    }
                });

                let atoms: Vec<&Atom> = clause
                    .body
                    .iter()
                    .filter_map(|lit| match lit {
                        Literal::Atom(atom) => Some(atom),
                        _ => None,
                    })
                    .collect();
                let others: Vec<Literal> = clause
                    .body
                    .iter()
                    .filter(|lit| !lit.is_positive_atom())
                    .cloned()
                    .collect();

                // Place atoms in SIPS order, adorning as we go.
                let mut slots: Vec<Option<&Atom>> = atoms.iter().copied().map(Some).collect();
                let mut remaining = slots.len();
                let mut placed: Vec<Literal> = Vec::new();
                while remaining > 0 {
                    let index = self.sips.next_atom(&slots, &bindings, &edb);
                    let atom = slots[index].take().expect("SIPS picked an unplaced atom");
                    remaining -= 1;

                    let mut adorned_atom = atom.clone();
                    if !is_ignored(&atom.name) {
                        let mut atom_marker = String::new();
                        for arg in &atom.args {
                            let bound = match &arg.kind {
                                ArgKind::Variable(var) => bindings.is_bound(*var),
                                _ => arg.is_constant(),
                            };
                            atom_marker.push(if bound { 'b' } else { 'f' });
                        }
                        let adorned_name = adornment_id(&atom.name, &atom_marker);
                        if seen.insert(adorned_name.clone()) {
                            todo.insert((atom.name.clone(), atom_marker));
                        }
                        adorned_atom.name = adorned_name;
                    }

                    visit::for_each_variable_in_atom(atom, &mut |_, var| {
                        bindings.bind_variable(var);
                    });
                    placed.push(Literal::Atom(adorned_atom));
                }
                placed.extend(others);

                let mut adorned_clause = Clause::new(
                    Atom::new(adornment_id(&rel_name, &marker), clause.head.args.clone())
                        .with_span(clause.head.span),
                    placed,
                );
                adorned_clause.plan = clause.plan.clone();
                adorned_clause.generated = clause.generated;
                adorned_clause.span = clause.span;
                adorned_clauses.push(adorned_clause);
            }
        }

        // Swap the redundant plain clauses for the adorned set.
        let before: Vec<String> = tu.program.clauses.iter().map(Clause::to_string).collect();
        tu.program
            .clauses
            .retain(|clause| !plain_processed.contains(&clause.head.name));
        tu.program.clauses.extend(adorned_clauses);
        for rel in relations_to_add {
            tu.program.add_relation(rel);
        }

        let mut before_sorted = before;
        before_sorted.sort();
        let mut after_sorted: Vec<String> =
            tu.program.clauses.iter().map(Clause::to_string).collect();
        after_sorted.sort();
        before_sorted != after_sorted
    }
}
