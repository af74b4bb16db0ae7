//! Property-based tests for the rewrite invariants.

use crate::eval::{evaluate, Database};
use crate::{number_relation, var_rule};
use datalog_analysis::{grounded_terms, Config, TranslationUnit, Transformer};
use datalog_ast::{
    visit, Argument, Atom, BinaryConstraint, BinaryConstraintOp, Clause, Directive, DirectiveKind,
    Literal, Program,
};
use datalog_magic::{adornment_of, is_adorned_name, MagicSetPipeline};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

fn reachability_program() -> Program {
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

fn transformed(program: Program) -> TranslationUnit {
    let mut config = Config::new();
    config.set("magic-transform", "*");
    let mut tu = TranslationUnit::with_config(program, config);
    MagicSetPipeline::new().run(&mut tu);
    tu
}

/// Grounded variable names of a clause built from one grounding atom
/// over `v0` and a set of equality edges between variables.
fn grounded_names(equalities: &[(u8, u8)]) -> BTreeSet<String> {
    let var = |i: u8| format!("v{}", i);
    let mut body = vec![Literal::Atom(Atom::new("seed", vec![Argument::var("v0")]))];
    for (a, b) in equalities {
        body.push(Literal::Constraint(BinaryConstraint::new(
            BinaryConstraintOp::Eq,
            Argument::var(&var(*a)),
            Argument::var(&var(*b)),
        )));
    }
    let clause = Clause::new(Atom::new("goal", vec![Argument::var("v0")]), body);
    let map = grounded_terms(&clause);

    let mut grounded = BTreeSet::new();
    visit::for_each_variable_in_clause(&clause, &mut |arg, name| {
        if map[&arg.id] {
            grounded.insert(name.to_string());
        }
    });
    grounded
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// The demand-transformed program computes exactly the same output
    /// relation as the original, whatever the input data.
    #[test]
    fn prop_refinement_law(
        edges in prop::collection::btree_set((0i64..7, 0i64..7), 0..24),
        seeds in prop::collection::btree_set(0i64..7, 0..4),
    ) {
        let original = reachability_program();
        let tu = transformed(original.clone());

        let mut edb = Database::new();
        for (a, b) in &edges {
            edb.insert("e", vec![*a, *b]);
        }
        for s in &seeds {
            edb.insert("s", vec![*s]);
        }

        let plain = evaluate(&original, &edb);
        let demanded = evaluate(&tu.program, &edb);
        prop_assert_eq!(plain.tuples(&"p".into()), demanded.tuples(&"p".into()));
    }

    /// Adding equality constraints never un-grounds a variable.
    #[test]
    fn prop_grounding_is_monotone(
        equalities in prop::collection::vec((0u8..6, 0u8..6), 0..10),
        extra in (0u8..6, 0u8..6),
    ) {
        let before = grounded_names(&equalities);
        let mut extended = equalities.clone();
        extended.push(extra);
        let after = grounded_names(&extended);
        prop_assert!(before.is_subset(&after));
    }

    /// Adornment markers always match atom arities, and magic
    /// relations project exactly the bound columns.
    #[test]
    fn prop_structural_invariants_hold(
        seeds in prop::collection::btree_set(0i64..7, 0..4),
    ) {
        // The data does not influence the rewrite, but re-running the
        // pipeline per case guards against order-dependent state.
        let _ = seeds;
        let tu = transformed(reachability_program());

        visit::for_each_atom_in_program(&tu.program, &mut |atom| {
            if is_adorned_name(&atom.name) {
                assert_eq!(adornment_of(&atom.name).len(), atom.arity());
            }
        });

        let mut magic_arity: BTreeMap<String, usize> = BTreeMap::new();
        for rel in &tu.program.relations {
            if rel.name.first() == "@magic" {
                magic_arity.insert(rel.name.to_string(), rel.arity());
            }
        }
        visit::for_each_atom_in_program(&tu.program, &mut |atom| {
            if let Some(expected) = magic_arity.get(&atom.name.to_string()) {
                assert_eq!(atom.arity(), *expected);
            }
        });
    }
}
