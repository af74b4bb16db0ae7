//! Pipeline scenarios and structural invariants of the rewrite.

use crate::{number_relation, var_rule};
use datalog_analysis::{Config, TranslationUnit, Transformer};
use datalog_ast::{
    Argument, Atom, Clause, Directive, DirectiveKind, Literal, Program, QualifiedName,
};
use datalog_magic::{adornment_of, is_adorned_name, MagicSetPipeline};
use std::collections::BTreeSet;

fn demand_config() -> Config {
    let mut config = Config::new();
    config.set("magic-transform", "*");
    config
}

fn reachability_program() -> Program {
    // p(x) :- e(x, y), p(y).   p(x) :- s(x).   .input e, s; .output p
    let mut program = Program::new();
    program.add_relation(number_relation("e", 2));
    program.add_relation(number_relation("p", 1));
    program.add_relation(number_relation("s", 1));
    program.add_directive(Directive::new(DirectiveKind::Input, "e"));
    program.add_directive(Directive::new(DirectiveKind::Input, "s"));
    program.add_directive(Directive::new(DirectiveKind::Output, "p"));
    program.add_clause(var_rule(("p", &["x"]), &[("e", &["x", "y"]), ("p", &["y"])]));
    program.add_clause(var_rule(("p", &["x"]), &[("s", &["x"])]));
    program
}

fn negation_program() -> Program {
    // unreachable(x) :- node(x), !reach(x).  reach(x) :- edge(x, y).
    let mut program = Program::new();
    program.add_relation(number_relation("node", 1));
    program.add_relation(number_relation("edge", 2));
    program.add_relation(number_relation("reach", 1));
    program.add_relation(number_relation("unreachable", 1));
    program.add_directive(Directive::new(DirectiveKind::Input, "node"));
    program.add_directive(Directive::new(DirectiveKind::Input, "edge"));
    program.add_directive(Directive::new(DirectiveKind::Output, "unreachable"));
    program.add_clause(Clause::new(
        crate::var_atom("unreachable", &["x"]),
        vec![
            Literal::Atom(crate::var_atom("node", &["x"])),
            Literal::Negation(crate::var_atom("reach", &["x"])),
        ],
    ));
    program.add_clause(var_rule(("reach", &["x"]), &[("edge", &["x", "y"])]));
    program
}

fn run_pipeline(program: Program) -> TranslationUnit {
    let mut tu = TranslationUnit::with_config(program, demand_config());
    MagicSetPipeline::new().run(&mut tu);
    tu
}

/// Every adorned atom occurrence has a marker as long as its arity.
fn assert_adornment_consistency(tu: &TranslationUnit) {
    datalog_ast::visit::for_each_atom_in_program(&tu.program, &mut |atom| {
        if is_adorned_name(&atom.name) {
            assert_eq!(
                adornment_of(&atom.name).len(),
                atom.arity(),
                "adornment width of {}",
                atom.name
            );
        }
    });
}

/// Every magic relation's arity equals the bound positions of its
/// source adornment.
fn assert_magic_arity(tu: &TranslationUnit) {
    for rel in &tu.program.relations {
        if rel.name.first() != "@magic" {
            continue;
        }
        let inner = QualifiedName::from_components(rel.name.components()[1..].to_vec());
        let bound = adornment_of(&inner).chars().filter(|&c| c == 'b').count();
        assert_eq!(rel.arity(), bound, "magic arity of {}", rel.name);
    }
}

#[test]
fn test_adornment_and_magic_invariants() {
    let tu = run_pipeline(reachability_program());
    assert_adornment_consistency(&tu);
    assert_magic_arity(&tu);
}

#[test]
fn test_supplementary_rule_for_bound_recursion() {
    // Scenario: under a bound call, the recursive body becomes
    // e(x,y), p{b}(y) and the supplementary rule derives the new
    // demand from the old one through e.
    let tu = run_pipeline(reachability_program());

    let magic_b = QualifiedName::parse("@magic.@interm_out.p.{b}");
    let bodies: BTreeSet<String> = tu
        .program
        .clauses_of(&magic_b)
        .map(|clause| clause.to_string())
        .collect();
    assert!(
        bodies
            .iter()
            .any(|rendered| rendered.contains("@magic.@interm_out.p.{b}(x)")
                && rendered.contains("e(x,y)")),
        "got: {:?}",
        bodies
    );
}

#[test]
fn test_stratification_invariant_after_labelling() {
    // No SCC of the rewritten program mixes @neglabel and plain
    // relations.
    let tu = run_pipeline(negation_program());
    let sccs = tu.scc_graph();
    for stratum in 0..sccs.num_sccs() {
        let members = sccs.relations(stratum);
        let labelled = members
            .iter()
            .filter(|name| name.first() == "@neglabel")
            .count();
        assert!(
            labelled == 0 || labelled == members.len(),
            "mixed stratum: {:?}",
            members
        );
    }
}

#[test]
fn test_negation_still_reads_complete_relation() {
    let tu = run_pipeline(negation_program());

    // The negated occurrence reads the @neglabel copy, never a magic
    // fragment.
    let mut negated_names = Vec::new();
    for clause in &tu.program.clauses {
        for lit in &clause.body {
            if let Literal::Negation(atom) = lit {
                negated_names.push(atom.name.clone());
            }
        }
    }
    assert!(!negated_names.is_empty());
    for name in negated_names {
        assert_eq!(name.first(), "@neglabel", "negation reads {}", name);
    }
}

#[test]
fn test_pipeline_idempotent_with_negation() {
    let mut tu = TranslationUnit::with_config(negation_program(), demand_config());
    assert!(MagicSetPipeline::new().run(&mut tu));
    assert!(!MagicSetPipeline::new().run(&mut tu));
}

#[test]
fn test_refinement_preserves_reachability_outputs() {
    use crate::eval::{evaluate, Database};

    let original = reachability_program();
    let tu = run_pipeline(original.clone());

    let mut edb = Database::new();
    for (a, b) in [(1, 2), (2, 3), (3, 4), (6, 7)] {
        edb.insert("e", vec![a, b]);
    }
    edb.insert("s", vec![4]);

    let plain = evaluate(&original, &edb);
    let transformed = evaluate(&tu.program, &edb);

    // The demand-transformed program computes the same output
    // relation.
    assert_eq!(
        transformed.tuples(&"p".into()),
        plain.tuples(&"p".into())
    );
    assert_eq!(
        plain.tuples(&"p".into()),
        BTreeSet::from([vec![1], vec![2], vec![3], vec![4]])
    );
}

#[test]
fn test_eqrel_relations_stay_unadorned() {
    let mut program = reachability_program();
    let mut eq = number_relation("same", 2);
    eq.representation = datalog_ast::RelationRepresentation::Eqrel;
    program.add_relation(eq);
    program.add_clause(var_rule(("same", &["x", "y"]), &[("e", &["x", "y"])]));

    let tu = run_pipeline(program);
    assert!(!tu
        .program
        .relations
        .iter()
        .any(|rel| rel.name.to_string().starts_with("same.{")));
}

#[test]
fn test_plain_facts_survive_pipeline() {
    let mut program = reachability_program();
    program.add_clause(Clause::fact(Atom::new("s", vec![Argument::number(9)])));

    let tu = run_pipeline(program);
    // The fact was rewritten into variable form by constant naming but
    // still defines s.
    let s = QualifiedName::new("s");
    assert!(tu.program.clauses_of(&s).next().is_some());
}
