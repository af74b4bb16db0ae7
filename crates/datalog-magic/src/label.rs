//! Stratified-negation labelling.
//!
//! Negated atoms and aggregator bodies must not consume tuples from the
//! demand-restricted relations the magic-set core produces, so their
//! targets are redirected to `@neglabel` copies evaluated in full.
//! Positive labelling then untangles strata that feed both the labelled
//! and the unlabelled world by duplicating them under `@poscopy_<k>`.

use datalog_analysis::{TranslationUnit, Transformer};
use datalog_ast::{
    visit, ArgKind, Argument, Atom, Clause, Literal, Program, QualifiedName,
};
use std::collections::{BTreeMap, BTreeSet};

pub struct LabelDatabaseTransformer;

impl Transformer for LabelDatabaseTransformer {
    fn name(&self) -> &'static str {
        "LabelDatabaseTransformer"
    }

    fn transform(&mut self, tu: &mut TranslationUnit) -> bool {
        let mut changed = run_negative_labelling(tu);
        if changed {
            tu.invalidate_analyses();
        }
        changed |= run_positive_labelling(tu);
        changed
    }
}

fn negative_label(name: &QualifiedName) -> QualifiedName {
    name.prepended("@neglabel")
}

pub(crate) fn is_negatively_labelled(name: &QualifiedName) -> bool {
    name.first() == "@neglabel"
}

fn is_positively_labelled(name: &QualifiedName) -> bool {
    name.first().starts_with("@poscopy_")
}

fn clone_relation_without_io(program: &Program, name: &QualifiedName, new_name: QualifiedName) -> Option<datalog_ast::Relation> {
    let rel = program.relation(name)?;
    let mut clone = rel.cloned_as(new_name);
    clone.qualifiers.input = false;
    clone.qualifiers.output = false;
    clone.qualifiers.print_size = false;
    Some(clone)
}

fn run_negative_labelling(tu: &mut TranslationUnit) -> bool {
    let io = tu.io_types();
    let sccs = tu.scc_graph();

    let input_relations: BTreeSet<QualifiedName> = tu
        .program
        .relations
        .iter()
        .filter(|rel| io.is_input(&rel.name))
        .map(|rel| rel.name.clone())
        .collect();

    // Redirect negated atoms and aggregator-body atoms of derived
    // relations to their negative labels.
    let mut demanded: BTreeSet<QualifiedName> = BTreeSet::new();
    for clause in &mut tu.program.clauses {
        for lit in &mut clause.body {
            relabel_literal(lit, false, &input_relations, &mut demanded);
        }
    }

    if demanded.is_empty() {
        return false;
    }

    // Clone the defining rules of each demanded relation's SCC, with
    // same-SCC atoms renamed, stratum by stratum.
    let mut strata_to_copy: BTreeSet<usize> = BTreeSet::new();
    for name in &demanded {
        if let Some(stratum) = sccs.scc_of(name) {
            strata_to_copy.insert(stratum);
        }
    }

    let mut relations_to_label: BTreeSet<QualifiedName> = demanded.clone();
    let mut clauses_to_add: Vec<Clause> = Vec::new();
    for &stratum in &strata_to_copy {
        let members: BTreeSet<QualifiedName> = sccs.relations(stratum).iter().cloned().collect();
        for member in &members {
            for clause in tu.program.clauses_of(member) {
                let mut copy = clause.clone();
                copy.generated = true;
                visit::for_each_atom_mut_in_clause(&mut copy, &mut |atom| {
                    if members.contains(&atom.name) {
                        relations_to_label.insert(atom.name.clone());
                        atom.name = negative_label(&atom.name);
                    }
                });
                clauses_to_add.push(copy);
            }
        }
    }

    for name in &relations_to_label {
        if let Some(clone) =
            clone_relation_without_io(&tu.program, name, negative_label(name))
        {
            tu.program.add_relation(clone);
        }
    }
    for clause in clauses_to_add {
        tu.program.add_clause(clause);
    }

    true
}

/// Rename the relevant atoms below one literal. `in_aggregator` marks
/// that every atom (not only negated ones) must be redirected.
fn relabel_literal(
    lit: &mut Literal,
    in_aggregator: bool,
    inputs: &BTreeSet<QualifiedName>,
    demanded: &mut BTreeSet<QualifiedName>,
) {
    let mut relabel_atom = |atom: &mut Atom, force: bool| {
        if force
            && !inputs.contains(&atom.name)
            && !is_negatively_labelled(&atom.name)
        {
            demanded.insert(atom.name.clone());
            atom.name = negative_label(&atom.name);
        }
    };
    match lit {
        Literal::Atom(atom) => {
            relabel_atom(atom, in_aggregator);
            for arg in &mut atom.args {
                relabel_argument(arg, in_aggregator, inputs, demanded);
            }
        }
        Literal::Negation(atom) => {
            relabel_atom(atom, true);
            for arg in &mut atom.args {
                relabel_argument(arg, in_aggregator, inputs, demanded);
            }
        }
        Literal::Constraint(c) => {
            relabel_argument(&mut c.lhs, in_aggregator, inputs, demanded);
            relabel_argument(&mut c.rhs, in_aggregator, inputs, demanded);
        }
        Literal::Boolean(_) => {}
    }
}

fn relabel_argument(
    arg: &mut Argument,
    in_aggregator: bool,
    inputs: &BTreeSet<QualifiedName>,
    demanded: &mut BTreeSet<QualifiedName>,
) {
    match &mut arg.kind {
        ArgKind::TypeCast(inner, _) => relabel_argument(inner, in_aggregator, inputs, demanded),
        ArgKind::IntrinsicFunctor(_, args)
        | ArgKind::UserFunctor(_, args)
        | ArgKind::RecordInit(_, args) => {
            for child in args {
                relabel_argument(child, in_aggregator, inputs, demanded);
            }
        }
        ArgKind::Aggregator(aggr) => {
            for lit in &mut aggr.body {
                relabel_literal(lit, true, inputs, demanded);
            }
        }
        _ => {}
    }
}

fn run_positive_labelling(tu: &mut TranslationUnit) -> bool {
    let sccs = tu.scc_graph();
    let precedence = tu.precedence_graph();
    let io = tu.io_types();
    let mut changed = false;

    let input_relations: BTreeSet<QualifiedName> = tu
        .program
        .relations
        .iter()
        .filter(|rel| io.is_input(&rel.name))
        .map(|rel| rel.name.clone())
        .collect();

    // Partition strata; a stratum never mixes labelled and unlabelled
    // relations.
    let mut labelled_strata: BTreeSet<usize> = BTreeSet::new();
    let mut copy_counts: BTreeMap<usize, usize> = BTreeMap::new();
    for stratum in 0..sccs.num_sccs() {
        let members = sccs.relations(stratum);
        let labelled = members
            .iter()
            .filter(|name| is_negatively_labelled(name))
            .count();
        debug_assert!(
            labelled == 0 || labelled == members.len(),
            "stratum mixes neglabelled and unlabelled relations"
        );
        if labelled > 0 {
            labelled_strata.insert(stratum);
        } else {
            copy_counts.insert(stratum, 0);
        }
    }

    // Strata reachable downstream of each stratum.
    let mut dependent_strata: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
    for rel in &tu.program.relations {
        let Some(stratum) = sccs.scc_of(&rel.name) else {
            continue;
        };
        let entry = dependent_strata.entry(stratum).or_default();
        for dependent in precedence.reachable_from(&rel.name) {
            if let Some(dep_stratum) = sccs.scc_of(&dependent) {
                entry.insert(dep_stratum);
            }
        }
    }

    let relabel_target = |name: &QualifiedName| {
        !input_relations.contains(name)
            && !is_negatively_labelled(name)
            && !is_positively_labelled(name)
            && name.first() != "@magic"
    };

    let mut clauses_to_add: Vec<Clause> = Vec::new();
    for stratum in 0..sccs.num_sccs() {
        if !labelled_strata.contains(&stratum) {
            continue;
        }
        let members: BTreeSet<QualifiedName> = sccs.relations(stratum).iter().cloned().collect();

        // Redirect the positive dependencies of this labelled stratum
        // to the copies minted in this round.
        for clause in &mut tu.program.clauses {
            if !members.contains(&clause.head.name) {
                continue;
            }
            visit::for_each_atom_mut_in_clause(clause, &mut |atom| {
                if relabel_target(&atom.name) {
                    if let Some(atom_stratum) = sccs.scc_of(&atom.name) {
                        let count = copy_counts.get(&atom_stratum).copied().unwrap_or(0);
                        atom.name = atom.name.prepended(format!("@poscopy_{}", count + 1));
                        changed = true;
                    }
                }
            });
        }

        // Duplicate every feeding unlabelled stratum under the new
        // copy index.
        for pre_stratum in (0..stratum).rev() {
            if labelled_strata.contains(&pre_stratum) {
                continue;
            }
            let feeds_labelled = dependent_strata
                .get(&pre_stratum)
                .map(|deps| deps.contains(&stratum))
                .unwrap_or(false);
            if !feeds_labelled {
                continue;
            }
            let pre_members: BTreeSet<QualifiedName> =
                sccs.relations(pre_stratum).iter().cloned().collect();
            if pre_members.iter().all(|name| !relabel_target(name)) {
                continue;
            }

            for member in &pre_members {
                if input_relations.contains(member) {
                    continue;
                }
                for clause in tu.program.clauses_of(member) {
                    let mut copy = clause.clone();
                    copy.generated = true;
                    visit::for_each_atom_mut_in_clause(&mut copy, &mut |atom| {
                        if relabel_target(&atom.name) {
                            if let Some(atom_stratum) = sccs.scc_of(&atom.name) {
                                let count =
                                    copy_counts.get(&atom_stratum).copied().unwrap_or(0);
                                atom.name =
                                    atom.name.prepended(format!("@poscopy_{}", count + 1));
                            }
                        }
                    });
                    clauses_to_add.push(copy);
                }
            }
            *copy_counts.entry(pre_stratum).or_insert(0) += 1;
            changed = true;
        }
    }
    for clause in clauses_to_add {
        tu.program.add_clause(clause);
    }

    // Declare the copies.
    let mut relations_to_add = Vec::new();
    for (&stratum, &count) in &copy_counts {
        for copy in 0..count {
            for name in sccs.relations(stratum) {
                if input_relations.contains(name) || !relabel_target(name) {
                    continue;
                }
                if let Some(clone) = clone_relation_without_io(
                    &tu.program,
                    name,
                    name.prepended(format!("@poscopy_{}", copy + 1)),
                ) {
                    relations_to_add.push(clone);
                }
            }
        }
    }
    for rel in relations_to_add {
        tu.program.add_relation(rel);
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use datalog_ast::{Attribute, Relation};

    fn unary(name: &str) -> Relation {
        Relation::new(name, vec![Attribute::new("x", "number")])
    }

    fn rule(head: &str, body: &[(&str, bool)]) -> Clause {
        Clause::new(
            Atom::new(head, vec![Argument::var("x")]),
            body.iter()
                .map(|(name, negated)| {
                    let atom = Atom::new(*name, vec![Argument::var("x")]);
                    if *negated {
                        Literal::Negation(atom)
                    } else {
                        Literal::Atom(atom)
                    }
                })
                .collect(),
        )
    }

    fn label(program: Program) -> TranslationUnit {
        let mut tu = TranslationUnit::new(program);
        LabelDatabaseTransformer.run(&mut tu);
        tu
    }

    #[test]
    fn test_negated_atom_redirected() {
        // a(x) :- b(x), !c(x).   c(x) :- b(x).
        let mut program = Program::new();
        for name in ["a", "b", "c"] {
            program.add_relation(unary(name));
        }
        program.add_clause(rule("a", &[("b", false), ("c", true)]));
        program.add_clause(rule("c", &[("b", false)]));
        program.add_clause(Clause::fact(Atom::new("b", vec![Argument::number(1)])));

        let tu = label(program);
        let neglabel = QualifiedName::parse("@neglabel.c");
        assert!(tu.program.has_relation(&neglabel));

        // The negation now points at the labelled copy.
        let a_name = "a".into();
        let a_rule = tu.program.clauses_of(&a_name).next().unwrap();
        match &a_rule.body[1] {
            Literal::Negation(atom) => assert_eq!(atom.name, neglabel),
            other => panic!("expected negation, got {}", other),
        }

        // The labelled copy has its own defining rule.
        assert_eq!(tu.program.clauses_of(&neglabel).count(), 1);
    }

    #[test]
    fn test_negative_labelling_clones_whole_scc() {
        // p and q are mutually recursive; negating p clones both.
        let mut program = Program::new();
        for name in ["p", "q", "r", "s"] {
            program.add_relation(unary(name));
        }
        program.add_clause(rule("p", &[("q", false)]));
        program.add_clause(rule("q", &[("p", false)]));
        program.add_clause(rule("s", &[("r", false), ("p", true)]));
        program.add_clause(Clause::fact(Atom::new("r", vec![Argument::number(1)])));

        let tu = label(program);
        assert!(tu.program.has_relation(&QualifiedName::parse("@neglabel.p")));
        assert!(tu.program.has_relation(&QualifiedName::parse("@neglabel.q")));

        // @neglabel.p's rule references @neglabel.q, not q.
        let neglabel_p = QualifiedName::parse("@neglabel.p");
        let p_rule = tu.program.clauses_of(&neglabel_p).next().unwrap();
        assert_eq!(
            p_rule.body[0].atom().unwrap().name,
            QualifiedName::parse("@neglabel.q")
        );
    }

    #[test]
    fn test_input_relations_not_labelled() {
        let mut program = Program::new();
        let mut edge = unary("edge");
        edge.qualifiers.input = true;
        program.add_relation(edge);
        program.add_relation(unary("a"));
        program.add_relation(unary("b"));
        program.add_clause(rule("a", &[("b", false), ("edge", true)]));
        program.add_clause(rule("b", &[("edge", false)]));

        let tu = label(program);
        assert!(!tu
            .program
            .has_relation(&QualifiedName::parse("@neglabel.edge")));
    }

    #[test]
    fn test_labelling_is_idempotent() {
        let mut program = Program::new();
        for name in ["a", "b", "c"] {
            program.add_relation(unary(name));
        }
        program.add_clause(rule("a", &[("b", false), ("c", true)]));
        program.add_clause(rule("c", &[("b", false)]));
        program.add_clause(Clause::fact(Atom::new("b", vec![Argument::number(1)])));

        let mut tu = TranslationUnit::new(program);
        assert!(LabelDatabaseTransformer.run(&mut tu));
        assert!(!LabelDatabaseTransformer.run(&mut tu));
    }

    #[test]
    fn test_positive_labelling_copies_shared_stratum() {
        // base feeds both the labelled copy of c and the positive world.
        // a(x) :- b(x), !c(x).  c(x) :- b(x).  b(x) :- base(x).
        let mut program = Program::new();
        for name in ["a", "b", "c", "base"] {
            program.add_relation(unary(name));
        }
        program.add_clause(rule("a", &[("b", false), ("c", true)]));
        program.add_clause(rule("c", &[("b", false)]));
        program.add_clause(rule("b", &[("base", false)]));
        program.add_clause(Clause::fact(Atom::new("base", vec![Argument::number(1)])));

        let tu = label(program);

        // @neglabel.c's rule feeds from a positive copy of b.
        let neglabel_c = QualifiedName::parse("@neglabel.c");
        let c_rule = tu.program.clauses_of(&neglabel_c).next().unwrap();
        let body_name = &c_rule.body[0].atom().unwrap().name;
        assert!(body_name.first().starts_with("@poscopy_"));
        assert!(tu.program.has_relation(body_name));
    }
}
