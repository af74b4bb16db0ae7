//! Checker scenarios over complete programs.

use crate::{number_relation, var_atom, var_rule};
use datalog_analysis::{TranslationUnit, Transformer};
use datalog_ast::{
    AggregateOp, Aggregator, ArgKind, Argument, Atom, BinaryConstraint, BinaryConstraintOp,
    Clause, Literal, Program, Severity, Span,
};
use datalog_checker::SemanticChecker;

fn check(program: Program) -> TranslationUnit {
    let mut tu = TranslationUnit::new(program);
    SemanticChecker.run(&mut tu);
    tu
}

#[test]
fn test_scenario_ungrounded_head() {
    // A(x) :- B(y).
    let mut program = Program::new();
    program.add_relation(number_relation("A", 1));
    program.add_relation(number_relation("B", 1));
    program.add_clause(var_rule(("A", &["x"]), &[("B", &["y"])]));

    let tu = check(program);
    assert_eq!(tu.report.errors_matching("Ungrounded variable x"), 1);
    assert_eq!(tu.report.errors_matching("Ungrounded variable y"), 0);
}

#[test]
fn test_scenario_mismatched_kinds_in_comparison() {
    // A(x) :- B(x), s = "hi", s != x.     x is a number.
    let mut program = Program::new();
    program.add_relation(number_relation("A", 1));
    program.add_relation(number_relation("B", 1));
    program.add_clause(Clause::new(
        var_atom("A", &["x"]),
        vec![
            Literal::Atom(var_atom("B", &["x"])),
            Literal::Constraint(BinaryConstraint::new(
                BinaryConstraintOp::Eq,
                Argument::var("s"),
                Argument::text("hi"),
            )),
            Literal::Constraint(BinaryConstraint::new(
                BinaryConstraintOp::Ne,
                Argument::var("s"),
                Argument::var("x"),
            )),
        ],
    ));

    let tu = check(program);
    assert_eq!(
        tu.report
            .errors_matching("Cannot compare operands of different kinds"),
        1
    );
}

#[test]
fn test_scenario_negation_cycle() {
    // p(x) :- q(x).   q(x) :- !p(x), r(x).
    let mut program = Program::new();
    for name in ["p", "q", "r"] {
        program.add_relation(number_relation(name, 1));
    }
    program.add_clause(var_rule(("p", &["x"]), &[("q", &["x"])]));
    program.add_clause(Clause::new(
        var_atom("q", &["x"]),
        vec![
            Literal::Negation(var_atom("p", &["x"])),
            Literal::Atom(var_atom("r", &["x"])),
        ],
    ));
    program.add_clause(Clause::fact(Atom::new("r", vec![Argument::number(1)])));

    let tu = check(program);
    assert_eq!(
        tu.report
            .errors_matching("Unable to stratify relation(s) {p,q}"),
        1
    );

    // The diagnostic carries the offending relation and literal.
    let diagnostic = tu
        .report
        .diagnostics()
        .iter()
        .find(|d| d.primary.message.contains("Unable to stratify"))
        .unwrap();
    assert_eq!(diagnostic.severity, Severity::Error);
    assert!(diagnostic
        .secondary
        .iter()
        .any(|note| note.message.contains("has cyclic negation")));
}

#[test]
fn test_scenario_witness_violation() {
    // head(x) :- x = max y : { body(y, z) }, z > 0.
    // z is grounded only inside the aggregator; using it outside is a
    // witness problem. x itself is legal (aggregate result).
    let mut program = Program::new();
    program.add_relation(number_relation("head", 1));
    program.add_relation(number_relation("body", 2));
    program.add_clause(Clause::new(
        var_atom("head", &["x"]),
        vec![
            Literal::Constraint(BinaryConstraint::new(
                BinaryConstraintOp::Eq,
                Argument::var("x"),
                Argument::new(
                    ArgKind::Aggregator(Box::new(Aggregator {
                        op: AggregateOp::Max,
                        target: Some(Argument::var("y")),
                        body: vec![Literal::Atom(var_atom("body", &["y", "z"]))],
                    })),
                    Span::internal(),
                ),
            )),
            Literal::Constraint(BinaryConstraint::new(
                BinaryConstraintOp::Gt,
                Argument::var("z"),
                Argument::number(0),
            )),
        ],
    ));

    let tu = check(program);
    assert!(tu.report.errors_matching("Witness problem") >= 1);
}

#[test]
fn test_scenario_legal_aggregate_use_has_no_witness_error() {
    // head(x) :- x = max y : { body(y, z) }.
    let mut program = Program::new();
    program.add_relation(number_relation("head", 1));
    program.add_relation(number_relation("body", 2));
    program.add_clause(Clause::new(
        var_atom("head", &["x"]),
        vec![Literal::Constraint(BinaryConstraint::new(
            BinaryConstraintOp::Eq,
            Argument::var("x"),
            Argument::new(
                ArgKind::Aggregator(Box::new(Aggregator {
                    op: AggregateOp::Max,
                    target: Some(Argument::var("y")),
                    body: vec![Literal::Atom(var_atom("body", &["y", "z"]))],
                })),
                Span::internal(),
            ),
        ))],
    ));

    let tu = check(program);
    assert_eq!(tu.report.errors_matching("Witness problem"), 0);
    assert_eq!(tu.report.errors_matching("Ungrounded"), 0);
}

#[test]
fn test_scenario_inline_cycle() {
    // a and b both inline, mutually dependent.
    let mut program = Program::new();
    let mut a = number_relation("a", 1);
    a.qualifiers.inline = true;
    let mut b = number_relation("b", 1);
    b.qualifiers.inline = true;
    program.add_relation(a);
    program.add_relation(b);
    program.add_clause(var_rule(("a", &["x"]), &[("b", &["x"])]));
    program.add_clause(var_rule(("b", &["x"]), &[("a", &["x"])]));

    let tu = check(program);
    assert_eq!(
        tu.report
            .errors_matching("Cannot inline cyclically dependent relations"),
        1
    );
}

#[test]
fn test_scenario_inline_in_aggregator() {
    // total(x) :- x = count : { marked(y) }.   marked is inline.
    let mut program = Program::new();
    program.add_relation(number_relation("total", 1));
    let mut marked = number_relation("marked", 1);
    marked.qualifiers.inline = true;
    program.add_relation(marked);
    program.add_clause(var_rule(("marked", &["x"]), &[("total", &["x"])]));
    program.add_clause(Clause::new(
        var_atom("total", &["x"]),
        vec![Literal::Constraint(BinaryConstraint::new(
            BinaryConstraintOp::Eq,
            Argument::var("x"),
            Argument::new(
                ArgKind::Aggregator(Box::new(Aggregator {
                    op: AggregateOp::Count,
                    target: None,
                    body: vec![Literal::Atom(var_atom("marked", &["y"]))],
                })),
                Span::internal(),
            ),
        ))],
    ));

    let tu = check(program);
    assert_eq!(
        tu.report
            .errors_matching("Cannot inline relations that appear in aggregator"),
        1
    );
}

#[test]
fn test_checker_leaves_program_intact() {
    let mut program = Program::new();
    program.add_relation(number_relation("A", 1));
    program.add_relation(number_relation("B", 1));
    program.add_clause(var_rule(("A", &["x"]), &[("B", &["y"])]));
    let snapshot = program.clone();

    let tu = check(program);
    assert!(tu.report.has_errors());
    assert_eq!(tu.program, snapshot);
}
