//! The semantic checker pass.

use crate::{inlining, witness};
use datalog_analysis::{
    clause_is_typeable, grounded_terms, AnalysisType, Config, IoTypes, Kind, PrecedenceGraph,
    RecursiveClauses, TranslationUnit, Transformer, TypeAnalysis, TypeEnvironment,
};
use datalog_ast::{
    visit, ArgKind, Argument, Atom, BinaryConstraintOp, Clause, Diagnostic, DiagnosticMessage,
    ErrorReport, Literal, Program, QualifiedName, Relation, RelationRepresentation, Span, TypeDecl,
};
use std::collections::{BTreeMap, BTreeSet};

/// Number constants must fit the evaluation domain.
const MIN_CONSTANT: i64 = i32::MIN as i64;
const MAX_CONSTANT: i64 = i32::MAX as i64;

pub struct SemanticChecker;

impl Transformer for SemanticChecker {
    fn name(&self) -> &'static str {
        "SemanticChecker"
    }

    fn transform(&mut self, tu: &mut TranslationUnit) -> bool {
        apply_warning_suppression(&mut tu.program, &tu.config);

        let env = tu.type_environment();
        let precedence = tu.precedence_graph();
        let recursive = tu.recursive_clauses();
        let io = tu.io_types();

        check_program(
            &tu.program,
            &env,
            &precedence,
            &recursive,
            &io,
            &mut tu.report,
        );

        if uses_record_types(&tu.program, &env) {
            tu.disable_subprogram_engine();
        }

        // Diagnostics only; the program itself is unchanged.
        false
    }
}

/// Set the SUPPRESSED qualifier on relations named by the
/// `suppress-warnings` option; `*` mutes every relation.
fn apply_warning_suppression(program: &mut Program, config: &Config) {
    if !config.has("suppress-warnings") {
        return;
    }
    let suppressed = config.list("suppress-warnings");
    if suppressed.iter().any(|name| name == "*") {
        for rel in &mut program.relations {
            rel.qualifiers.suppressed = true;
        }
    } else {
        for name in suppressed {
            let name = QualifiedName::parse(&name);
            if let Some(rel) = program.relation_mut(&name) {
                rel.qualifiers.suppressed = true;
            }
        }
    }
}

fn uses_record_types(program: &Program, env: &TypeEnvironment) -> bool {
    let mut found = program.relations.iter().any(|rel| {
        rel.attributes
            .iter()
            .any(|attr| env.is_record(&attr.type_name))
    });
    if !found {
        for clause in &program.clauses {
            visit::for_each_argument_in_clause(clause, &mut |arg| {
                if matches!(arg.kind, ArgKind::RecordInit(_, _)) {
                    found = true;
                }
            });
        }
    }
    found
}

fn check_program(
    program: &Program,
    env: &TypeEnvironment,
    precedence: &PrecedenceGraph,
    recursive: &RecursiveClauses,
    io: &IoTypes,
    report: &mut ErrorReport,
) {
    check_types(program, report);
    check_rules(program, env, recursive, io, report);
    check_namespaces(program, report);
    check_io_directives(program, report);
    witness::check_witness_problem(program, report);
    inlining::check_inlining(program, precedence, io, report);

    check_groundedness(program, report);
    check_untyped_nodes(program, report);
    check_with_lattice(program, env, report);
    check_stratification(program, precedence, report);
}

// ---------------------------------------------------------------------
// Type declarations
// ---------------------------------------------------------------------

fn check_types(program: &Program, report: &mut ErrorReport) {
    for decl in &program.types {
        match decl {
            TypeDecl::Union(union) => check_union_type(program, union, report),
            TypeDecl::Record(record) => check_record_type(program, record, report),
            TypeDecl::Primitive(_) => {}
        }
    }
}

fn is_declared_type(program: &Program, name: &QualifiedName) -> bool {
    name == &"number".into() || name == &"symbol".into() || program.type_decl(name).is_some()
}

fn union_reaches_kind(program: &Program, union: &datalog_ast::UnionType, numeric: bool) -> bool {
    let mut stack: Vec<QualifiedName> = union.elements.clone();
    let mut seen = BTreeSet::new();
    while let Some(element) = stack.pop() {
        if !seen.insert(element.clone()) {
            continue;
        }
        if (numeric && element == "number".into()) || (!numeric && element == "symbol".into()) {
            return true;
        }
        match program.type_decl(&element) {
            Some(TypeDecl::Primitive(prim)) if prim.numeric == numeric => return true,
            Some(TypeDecl::Union(inner)) => stack.extend(inner.elements.iter().cloned()),
            _ => {}
        }
    }
    false
}

fn check_union_type(program: &Program, union: &datalog_ast::UnionType, report: &mut ErrorReport) {
    for element in &union.elements {
        if element == &"number".into() || element == &"symbol".into() {
            continue;
        }
        match program.type_decl(element) {
            None => report.add_error(
                format!(
                    "Undefined type {} in definition of union type {}",
                    element, union.name
                ),
                union.span,
            ),
            Some(TypeDecl::Record(_)) => report.add_error(
                format!(
                    "Union type {} contains the non-primitive type {}",
                    union.name, element
                ),
                union.span,
            ),
            _ => {}
        }
    }

    if union_reaches_kind(program, union, true) && union_reaches_kind(program, union, false) {
        report.add_error(
            format!(
                "Union type {} contains a mixture of symbol and number types",
                union.name
            ),
            union.span,
        );
    }
}

fn check_record_type(program: &Program, record: &datalog_ast::RecordType, report: &mut ErrorReport) {
    for field in &record.fields {
        if !is_declared_type(program, &field.type_name) {
            report.add_error(
                format!(
                    "Undefined type {} in definition of field {}",
                    field.type_name, field.name
                ),
                record.span,
            );
        }
    }

    for (i, field) in record.fields.iter().enumerate() {
        if record.fields[..i].iter().any(|prev| prev.name == field.name) {
            report.add_error(
                format!(
                    "Doubly defined field name {} in definition of type {}",
                    field.name, record.name
                ),
                record.span,
            );
        }
    }
}

// ---------------------------------------------------------------------
// Relations and clauses
// ---------------------------------------------------------------------

fn check_rules(
    program: &Program,
    env: &TypeEnvironment,
    recursive: &RecursiveClauses,
    io: &IoTypes,
    report: &mut ErrorReport,
) {
    for rel in &program.relations {
        check_relation(program, env, rel, io, report);
    }
    for (index, clause) in program.clauses.iter().enumerate() {
        check_clause(program, clause, recursive.is_recursive(index), report);
    }
}

fn check_relation(
    program: &Program,
    env: &TypeEnvironment,
    relation: &Relation,
    io: &IoTypes,
    report: &mut ErrorReport,
) {
    if relation.representation == RelationRepresentation::Eqrel {
        if relation.arity() == 2 {
            if relation.attributes[0].type_name != relation.attributes[1].type_name {
                report.add_error(
                    format!(
                        "Domains of equivalence relation {} are different",
                        relation.name
                    ),
                    relation.span,
                );
            }
        } else {
            report.add_error(
                format!("Equivalence relation {} is not binary", relation.name),
                relation.span,
            );
        }
    }

    for (i, attr) in relation.attributes.iter().enumerate() {
        if !is_declared_type(program, &attr.type_name) {
            report.add_error(
                format!("Undefined type in attribute {}:{}", attr.name, attr.type_name),
                attr.span,
            );
        }

        if relation.attributes[..i].iter().any(|prev| prev.name == attr.name) {
            report.add_error(
                format!(
                    "Doubly defined attribute name {}:{}",
                    attr.name, attr.type_name
                ),
                attr.span,
            );
        }

        if env.is_record(&attr.type_name) {
            if io.is_input(&relation.name) {
                report.add_error(
                    format!(
                        "Input relations must not have record types. Attribute {} has record type {}",
                        attr.name, attr.type_name
                    ),
                    attr.span,
                );
            }
            if io.is_output(&relation.name) {
                report.add_warning(
                    format!(
                        "Record types in output relations are not printed verbatim: attribute {} has record type {}",
                        attr.name, attr.type_name
                    ),
                    attr.span,
                );
            }
        }
    }

    if program.clauses_of(&relation.name).next().is_none()
        && !io.is_input(&relation.name)
        && !relation.is_suppressed()
    {
        report.add_warning(
            format!("No rules/facts defined for relation {}", relation.name),
            relation.span,
        );
    }
}

fn check_atom(program: &Program, atom: &Atom, report: &mut ErrorReport) {
    match program.relation(&atom.name) {
        None => report.add_error(format!("Undefined relation {}", atom.name), atom.span),
        Some(rel) if rel.arity() != atom.arity() => report.add_error(
            format!("Mismatching arity of relation {}", atom.name),
            atom.span,
        ),
        _ => {}
    }

    for arg in &atom.args {
        check_argument(program, arg, report);
    }
}

// Aggregator bodies carry full literals; their atoms are checked too.
fn check_argument(program: &Program, arg: &Argument, report: &mut ErrorReport) {
    match &arg.kind {
        ArgKind::Aggregator(aggr) => {
            for lit in &aggr.body {
                check_literal(program, lit, report);
            }
        }
        ArgKind::TypeCast(inner, _) => check_argument(program, inner, report),
        ArgKind::IntrinsicFunctor(_, args)
        | ArgKind::UserFunctor(_, args)
        | ArgKind::RecordInit(_, args) => {
            for child in args {
                check_argument(program, child, report);
            }
        }
        _ => {}
    }
}

/// Unnamed-variable occurrence below `arg`, aggregators excluded.
fn has_unnamed_variable(arg: &Argument) -> bool {
    match &arg.kind {
        ArgKind::Unnamed => true,
        ArgKind::TypeCast(inner, _) => has_unnamed_variable(inner),
        ArgKind::IntrinsicFunctor(_, args)
        | ArgKind::UserFunctor(_, args)
        | ArgKind::RecordInit(_, args) => args.iter().any(has_unnamed_variable),
        _ => false,
    }
}

fn atom_has_unnamed_variable(atom: &Atom) -> bool {
    atom.args.iter().any(has_unnamed_variable)
}

fn check_literal(program: &Program, lit: &Literal, report: &mut ErrorReport) {
    match lit {
        Literal::Atom(atom) | Literal::Negation(atom) => {
            check_atom(program, atom, report);
            // underscores are allowed in atoms and negations
        }
        Literal::Constraint(c) => {
            check_argument(program, &c.lhs, report);
            check_argument(program, &c.rhs, report);
            if has_unnamed_variable(&c.lhs) || has_unnamed_variable(&c.rhs) {
                report.add_error("Underscore in binary relation", c.span);
            }
        }
        Literal::Boolean(_) => {}
    }
}

fn is_constant_arith_expr(arg: &Argument) -> bool {
    match &arg.kind {
        ArgKind::Number(_) => true,
        ArgKind::IntrinsicFunctor(op, args) => {
            op.is_numerical() && args.iter().all(is_constant_arith_expr)
        }
        _ => false,
    }
}

fn check_fact_constant(arg: &Argument, report: &mut ErrorReport) {
    match &arg.kind {
        ArgKind::Variable(name) => {
            report.add_error(format!("Variable {} in fact", name), arg.span)
        }
        ArgKind::Unnamed => report.add_error("Underscore in fact", arg.span),
        ArgKind::IntrinsicFunctor(_, _) => {
            if !is_constant_arith_expr(arg) {
                report.add_error("Function in fact", arg.span);
            }
        }
        ArgKind::UserFunctor(_, _) => {
            report.add_error("User-defined functor in fact", arg.span)
        }
        ArgKind::TypeCast(inner, _) => check_fact_constant(inner, report),
        ArgKind::Counter => report.add_error("Counter in fact", arg.span),
        ArgKind::Number(_) | ArgKind::Text(_) => {}
        ArgKind::RecordInit(_, fields) => {
            for field in fields {
                check_fact_constant(field, report);
            }
        }
        ArgKind::Aggregator(_) => report.add_error("Aggregator in fact", arg.span),
    }
}

fn check_clause(program: &Program, clause: &Clause, is_recursive: bool, report: &mut ErrorReport) {
    check_atom(program, &clause.head, report);

    if atom_has_unnamed_variable(&clause.head) {
        report.add_error("Underscore in head of rule", clause.head.span);
    }

    for lit in &clause.body {
        check_literal(program, lit, report);
    }

    if clause.is_fact() {
        for arg in &clause.head.args {
            check_fact_constant(arg, report);
        }
    }

    // use-once variables
    let mut var_count: BTreeMap<String, usize> = BTreeMap::new();
    let mut var_pos: BTreeMap<String, Span> = BTreeMap::new();
    visit::for_each_variable_in_clause(clause, &mut |arg, name| {
        *var_count.entry(name.to_string()).or_insert(0) += 1;
        var_pos.insert(name.to_string(), arg.span);
    });
    if !clause.generated {
        for (name, count) in &var_count {
            if *count == 1 && !name.starts_with('_') {
                report.add_warning(
                    format!("Variable {} only occurs once", name),
                    var_pos[name],
                );
            }
        }
    }

    if let Some(plan) = &clause.plan {
        let num_atoms = clause.body_atoms().count();
        for order in plan.orders.values() {
            if !order.is_complete(num_atoms) {
                report.add_error("Invalid execution plan", order.span);
            }
        }
    }

    if is_recursive {
        visit::for_each_argument_in_clause(clause, &mut |arg| {
            if matches!(arg.kind, ArgKind::Counter) {
                report.add_error("Auto-increment functor in a recursive rule", arg.span);
            }
        });
    }
}

// ---------------------------------------------------------------------
// Namespaces and I/O directives
// ---------------------------------------------------------------------

fn check_namespaces(program: &Program, report: &mut ErrorReport) {
    let mut names: BTreeMap<String, Span> = BTreeMap::new();

    for decl in &program.types {
        let name = decl.name().to_string();
        if names.contains_key(&name) {
            report.add_error(format!("Name clash on type {}", name), decl.span());
        } else {
            names.insert(name, decl.span());
        }
    }

    for rel in &program.relations {
        let name = rel.name.to_string();
        if names.contains_key(&name) {
            report.add_error(format!("Name clash on relation {}", name), rel.span);
        } else {
            names.insert(name, rel.span);
        }
    }
}

fn check_io_directives(program: &Program, report: &mut ErrorReport) {
    for directive in &program.directives {
        if !program.has_relation(&directive.name) {
            report.add_error(
                format!("Undefined relation {}", directive.name),
                directive.span,
            );
        }
    }
}

// ---------------------------------------------------------------------
// Grounding
// ---------------------------------------------------------------------

fn check_groundedness(program: &Program, report: &mut ErrorReport) {
    for clause in &program.clauses {
        if clause.is_fact() {
            continue;
        }
        let grounded = grounded_terms(clause);

        let mut reported: BTreeSet<String> = BTreeSet::new();
        visit::for_each_variable_in_clause(clause, &mut |arg, name| {
            if !grounded[&arg.id] && reported.insert(name.to_string()) {
                report.add_error(format!("Ungrounded variable {}", name), arg.span);
            }
        });

        visit::for_each_argument_in_clause(clause, &mut |arg| {
            if matches!(arg.kind, ArgKind::RecordInit(_, _)) && !grounded[&arg.id] {
                report.add_error("Ungrounded record", arg.span);
            }
        });
    }
}

// ---------------------------------------------------------------------
// Node checks that need no lattice
// ---------------------------------------------------------------------

fn check_untyped_nodes(program: &Program, report: &mut ErrorReport) {
    for clause in &program.clauses {
        visit::for_each_argument_in_clause(clause, &mut |arg| match &arg.kind {
            ArgKind::TypeCast(_, type_name) => {
                if !is_declared_type(program, type_name) {
                    report.add_error(
                        format!("Type cast is to undeclared type {}", type_name),
                        arg.span,
                    );
                }
            }
            ArgKind::RecordInit(type_name, fields) => match program.type_decl(type_name) {
                Some(TypeDecl::Record(decl)) => {
                    if fields.len() != decl.fields.len() {
                        report.add_error("Wrong number of arguments given to record", arg.span);
                    }
                }
                Some(_) => report.add_error(
                    format!("Type {} is not a record type", type_name),
                    arg.span,
                ),
                None => report.add_error(
                    format!("Type {} has not been declared", type_name),
                    arg.span,
                ),
            },
            ArgKind::Number(value) => {
                if *value < MIN_CONSTANT || *value > MAX_CONSTANT {
                    report.add_error(
                        format!(
                            "Number constant not in range [{}, {}]",
                            MIN_CONSTANT, MAX_CONSTANT
                        ),
                        arg.span,
                    );
                }
            }
            ArgKind::UserFunctor(name, args) => match program.functor(*name) {
                None => {
                    report.add_error("User-defined functor hasn't been declared", arg.span)
                }
                Some(decl) if decl.arity() != args.len() => {
                    report.add_error("Mismatching number of arguments of functor", arg.span)
                }
                _ => {}
            },
            _ => {},
        });
    }
}

// ---------------------------------------------------------------------
// Lattice-guarded type checks
// ---------------------------------------------------------------------

fn check_with_lattice(program: &Program, env: &TypeEnvironment, report: &mut ErrorReport) {
    if !env.is_valid() {
        report.add_error(
            "No type checking could occur due to other errors present",
            Span::internal(),
        );
        return;
    }

    let typeable: Vec<&Clause> = program
        .clauses
        .iter()
        .filter(|clause| clause_is_typeable(clause, program))
        .collect();
    if typeable.len() != program.clauses.len() {
        report.add_error(
            "Not all clauses could be typechecked due to other errors present",
            Span::internal(),
        );
    }

    for clause in typeable {
        let grounded = grounded_terms(clause);
        let analysis = TypeAnalysis::analyse(clause, program, env);

        check_invalid_argument_types(clause, &grounded, &analysis, report);
        check_functor_inputs(clause, program, env, &analysis, report);
        check_record_inits(clause, env, &grounded, &analysis, report);
        check_aggregator_targets(clause, env, &analysis, report);
        check_casts(clause, env, &analysis, report);
        check_atom_argument_types(clause, program, env, &analysis, report);
        check_constraint_types(clause, env, &analysis, report);
    }
}

fn check_invalid_argument_types(
    clause: &Clause,
    grounded: &datalog_analysis::GroundingMap,
    analysis: &TypeAnalysis,
    report: &mut ErrorReport,
) {
    visit::for_each_argument_in_clause(clause, &mut |arg| {
        if !grounded[&arg.id] {
            // Already reported as ungrounded; a type would be noise.
            return;
        }
        match analysis.type_of(arg.id) {
            AnalysisType::BottomPrim(_) => report.add_error(
                "Unable to deduce valid type for expression, as base types are disjoint",
                arg.span,
            ),
            AnalysisType::Bottom => report.add_error(
                "Unable to deduce valid type for expression, as primitive types are disjoint",
                arg.span,
            ),
            // Top stems from a poorly typed grounded record, whose own
            // error is emitted elsewhere.
            _ => {}
        }
    });
}

fn check_functor_inputs(
    clause: &Clause,
    program: &Program,
    env: &TypeEnvironment,
    analysis: &TypeAnalysis,
    report: &mut ErrorReport,
) {
    visit::for_each_argument_in_clause(clause, &mut |arg| {
        let slots: Vec<(bool, &Argument)> = match &arg.kind {
            ArgKind::IntrinsicFunctor(op, args) => args
                .iter()
                .enumerate()
                .map(|(i, a)| (op.accepts_symbols(i), a))
                .collect(),
            ArgKind::UserFunctor(name, args) => match program.functor(*name) {
                Some(decl) if decl.arity() == args.len() => args
                    .iter()
                    .zip(&decl.args)
                    .map(|(a, kind)| (*kind == datalog_ast::FunctorArgKind::Symbol, a))
                    .collect(),
                _ => return,
            },
            _ => return,
        };

        for (wants_symbol, slot) in slots {
            let arg_type = analysis.type_of(slot.id);
            if !arg_type.is_valid() {
                continue;
            }
            if wants_symbol {
                if !env.is_subtype(arg_type, &AnalysisType::Primitive(Kind::Symbol)) {
                    report.add_error(
                        format!(
                            "Non-symbolic argument for functor, instead argument has type {}",
                            arg_type
                        ),
                        slot.span,
                    );
                }
            } else if !env.is_subtype(arg_type, &AnalysisType::Primitive(Kind::Number)) {
                report.add_error(
                    format!(
                        "Non-numeric argument for functor, instead argument has type {}",
                        arg_type
                    ),
                    slot.span,
                );
            }
        }
    });
}

fn check_record_inits(
    clause: &Clause,
    env: &TypeEnvironment,
    grounded: &datalog_analysis::GroundingMap,
    analysis: &TypeAnalysis,
    report: &mut ErrorReport,
) {
    visit::for_each_argument_in_clause(clause, &mut |arg| {
        let ArgKind::RecordInit(type_name, fields) = &arg.kind else {
            return;
        };
        if !grounded[&arg.id] {
            // Raised by the grounding check already.
            return;
        }
        let Some(decl) = env.record(type_name) else {
            return;
        };
        if fields.len() != decl.fields.len() {
            return;
        }

        if analysis.type_of(arg.id) == &AnalysisType::Top {
            report.add_error(
                format!(
                    "Unable to deduce type {} as record is not grounded as a record elsewhere, and at least one of its elements has the wrong type",
                    type_name
                ),
                arg.span,
            );
        }

        for (field, field_decl) in fields.iter().zip(&decl.fields) {
            let field_type = env.lattice_type(&field_decl.type_name);
            let actual = analysis.type_of(field.id);
            if actual.is_valid() && !env.is_subtype(actual, &field_type) {
                report.add_error(
                    format!(
                        "Record constructor expects element to have type {} but instead it has type {}",
                        field_type, actual
                    ),
                    field.span,
                );
            }
        }
    });
}

fn check_aggregator_targets(
    clause: &Clause,
    env: &TypeEnvironment,
    analysis: &TypeAnalysis,
    report: &mut ErrorReport,
) {
    visit::for_each_argument_in_clause(clause, &mut |arg| {
        let ArgKind::Aggregator(aggr) = &arg.kind else {
            return;
        };
        if aggr.op == datalog_ast::AggregateOp::Count {
            return;
        }
        let Some(target) = &aggr.target else {
            return;
        };
        let target_type = analysis.type_of(target.id);
        if target_type.is_valid()
            && !env.is_subtype(target_type, &AnalysisType::Primitive(Kind::Number))
        {
            report.add_error(
                format!(
                    "Aggregation variable is not a number, instead has type {}",
                    target_type
                ),
                target.span,
            );
        }
    });
}

fn check_casts(
    clause: &Clause,
    env: &TypeEnvironment,
    analysis: &TypeAnalysis,
    report: &mut ErrorReport,
) {
    visit::for_each_argument_in_clause(clause, &mut |arg| {
        let ArgKind::TypeCast(value, type_name) = &arg.kind else {
            return;
        };
        if !env.is_type(type_name) {
            return;
        }
        let stated = env.lattice_type(type_name);
        let Some(output_kind) = stated.kind() else {
            return;
        };

        let input_type = analysis.type_of(value.id);
        if !input_type.is_valid() {
            return;
        }
        if !env.is_subtype(input_type, &AnalysisType::Primitive(output_kind)) {
            let input_kind = input_type
                .kind()
                .map(|k| k.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            report.add_warning(
                format!(
                    "Casts from {} values to {} types may cause runtime errors",
                    input_kind, output_kind
                ),
                arg.span,
            );
        } else if output_kind == Kind::Record && !env.is_subtype(input_type, &stated) {
            report.add_warning(
                "Casting a record to the wrong record type may cause runtime errors",
                arg.span,
            );
        }
    });
}

fn check_atom_argument_types(
    clause: &Clause,
    program: &Program,
    env: &TypeEnvironment,
    analysis: &TypeAnalysis,
    report: &mut ErrorReport,
) {
    visit::for_each_atom_in_clause(clause, &mut |atom| {
        let Some(rel) = program.relation(&atom.name) else {
            return;
        };
        if rel.arity() != atom.arity() {
            return;
        }
        for (arg, attr) in atom.args.iter().zip(&rel.attributes) {
            let expected = env.lattice_type(&attr.type_name);
            if let ArgKind::TypeCast(_, stated_name) = &arg.kind {
                // A cast in a constrained position: the stated type must
                // match what the position demands.
                if !env.is_type(stated_name) {
                    continue;
                }
                let stated = env.lattice_type(stated_name);
                let solved = env.meet(&stated, &expected);
                if solved.is_valid() && solved != stated {
                    report.add_error(
                        format!(
                            "Typecast is to type {} but is used where the type {} is expected",
                            stated_name, solved
                        ),
                        arg.span,
                    );
                } else if !solved.is_valid() {
                    report.add_error(
                        format!(
                            "Relation expects value of type {} but got argument of type {}",
                            attr.type_name, stated
                        ),
                        arg.span,
                    );
                }
                continue;
            }

            let arg_type = analysis.type_of(arg.id);
            if arg_type.is_valid() && !env.is_subtype(arg_type, &expected) {
                report.add_error(
                    format!(
                        "Relation expects value of type {} but got argument of type {}",
                        attr.type_name, arg_type
                    ),
                    arg.span,
                );
            }
        }
    });
}

fn check_constraint_types(
    clause: &Clause,
    env: &TypeEnvironment,
    analysis: &TypeAnalysis,
    report: &mut ErrorReport,
) {
    visit::for_each_literal_in_clause(clause, &mut |lit| {
        let Literal::Constraint(c) = lit else {
            return;
        };
        let lhs_type = analysis.type_of(c.lhs.id);
        let rhs_type = analysis.type_of(c.rhs.id);

        match c.op {
            BinaryConstraintOp::Eq | BinaryConstraintOp::Feq => {}
            BinaryConstraintOp::Ne | BinaryConstraintOp::Fne => {
                if lhs_type.is_valid() && rhs_type.is_valid() {
                    let (lhs_kind, rhs_kind) = (lhs_type.kind(), rhs_type.kind());
                    if lhs_kind != rhs_kind {
                        report.add_error(
                            format!(
                                "Cannot compare operands of different kinds, left operand is a {} and right operand is a {}",
                                kind_name(lhs_kind),
                                kind_name(rhs_kind)
                            ),
                            c.span,
                        );
                    } else if lhs_kind == Some(Kind::Record)
                        && !(env.is_subtype(lhs_type, rhs_type)
                            || env.is_subtype(rhs_type, lhs_type))
                    {
                        report.add_error("Cannot compare records of different types", c.span);
                    }
                }
            }
            op => {
                let numerical = op.is_numerical() || op.is_float();
                for (side_type, side) in [(lhs_type, "left"), (rhs_type, "right")] {
                    if !side_type.is_valid() {
                        continue;
                    }
                    if numerical {
                        if !env.is_subtype(side_type, &AnalysisType::Primitive(Kind::Number)) {
                            report.add_error(
                                format!(
                                    "Non-numerical operand for comparison, instead {} operand has type {}",
                                    side, side_type
                                ),
                                c.span,
                            );
                        }
                    } else if op.is_symbolic()
                        && !env.is_subtype(side_type, &AnalysisType::Primitive(Kind::Symbol))
                    {
                        report.add_error(
                            format!(
                                "Non-symbolic operand for comparison, instead {} operand has type {}",
                                side, side_type
                            ),
                            c.span,
                        );
                    }
                }
            }
        }
    });
}

fn kind_name(kind: Option<Kind>) -> String {
    match kind {
        Some(kind) => kind.to_string(),
        None => "unknown".to_string(),
    }
}

// ---------------------------------------------------------------------
// Stratification
// ---------------------------------------------------------------------

fn check_stratification(program: &Program, precedence: &PrecedenceGraph, report: &mut ErrorReport) {
    for rel in &program.relations {
        if !precedence.reaches(&rel.name, &rel.name) {
            continue;
        }
        let clique = precedence.clique(&rel.name);
        for member in &clique {
            let negation = find_negation_of(program, member, &rel.name);
            let aggregation = find_aggregation_of(program, member, &rel.name);
            let (literal_span, label) = match (negation, aggregation) {
                (Some(span), _) => (span, "negation"),
                (None, Some(span)) => (span, "aggregation"),
                (None, None) => continue,
            };

            let members: Vec<String> = clique.iter().map(|name| name.to_string()).collect();
            report.add_diagnostic(
                Diagnostic::error(DiagnosticMessage::text(format!(
                    "Unable to stratify relation(s) {{{}}}",
                    members.join(",")
                )))
                .with_note(DiagnosticMessage::new(
                    format!("Relation {}", rel.name),
                    rel.span,
                ))
                .with_note(DiagnosticMessage::new(
                    format!("has cyclic {}", label),
                    literal_span,
                )),
            );
            break;
        }
    }
}

/// Span of a negated `target` atom in some clause of `owner`.
fn find_negation_of(
    program: &Program,
    owner: &QualifiedName,
    target: &QualifiedName,
) -> Option<Span> {
    for clause in program.clauses_of(owner) {
        for lit in &clause.body {
            if let Literal::Negation(atom) = lit {
                if &atom.name == target {
                    return Some(atom.span);
                }
            }
        }
    }
    None
}

/// Span of a `target` atom inside an aggregator in some clause of
/// `owner`.
fn find_aggregation_of(
    program: &Program,
    owner: &QualifiedName,
    target: &QualifiedName,
) -> Option<Span> {
    for clause in program.clauses_of(owner) {
        let mut found = None;
        visit::for_each_argument_in_clause(clause, &mut |arg| {
            if let ArgKind::Aggregator(aggr) = &arg.kind {
                for lit in &aggr.body {
                    visit::for_each_atom_in_literal(lit, &mut |atom| {
                        if &atom.name == target && found.is_none() {
                            found = Some(atom.span);
                        }
                    });
                }
            }
        });
        if found.is_some() {
            return found;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use datalog_ast::{Attribute, BinaryConstraint, Directive, DirectiveKind};

    fn run_checker(program: Program) -> ErrorReport {
        let mut tu = TranslationUnit::new(program);
        SemanticChecker.run(&mut tu);
        tu.report
    }

    fn unary(name: &str) -> Relation {
        Relation::new(name, vec![Attribute::new("x", "number")])
    }

    #[test]
    fn test_ungrounded_head_variable() {
        // a(x) :- b(y).
        let mut program = Program::new();
        program.add_relation(unary("a"));
        program.add_relation(unary("b"));
        program.add_clause(Clause::new(
            Atom::new("a", vec![Argument::var("x")]),
            vec![Literal::Atom(Atom::new("b", vec![Argument::var("y")]))],
        ));

        let report = run_checker(program);
        assert_eq!(report.errors_matching("Ungrounded variable x"), 1);
    }

    #[test]
    fn test_undefined_relation_in_body() {
        let mut program = Program::new();
        program.add_relation(unary("a"));
        program.add_clause(Clause::new(
            Atom::new("a", vec![Argument::var("x")]),
            vec![Literal::Atom(Atom::new("ghost", vec![Argument::var("x")]))],
        ));

        let report = run_checker(program);
        assert_eq!(report.errors_matching("Undefined relation ghost"), 1);
    }

    #[test]
    fn test_fact_head_must_be_constant() {
        let mut program = Program::new();
        program.add_relation(unary("a"));
        program.add_clause(Clause::fact(Atom::new("a", vec![Argument::var("x")])));

        let report = run_checker(program);
        assert_eq!(report.errors_matching("Variable x in fact"), 1);
    }

    #[test]
    fn test_underscore_in_head_and_constraint() {
        let mut program = Program::new();
        program.add_relation(unary("a"));
        program.add_relation(unary("b"));
        program.add_clause(Clause::new(
            Atom::new("a", vec![Argument::unnamed()]),
            vec![
                Literal::Atom(Atom::new("b", vec![Argument::var("x")])),
                Literal::Constraint(BinaryConstraint::new(
                    BinaryConstraintOp::Gt,
                    Argument::var("x"),
                    Argument::unnamed(),
                )),
            ],
        ));

        let report = run_checker(program);
        assert_eq!(report.errors_matching("Underscore in head of rule"), 1);
        assert_eq!(report.errors_matching("Underscore in binary relation"), 1);
    }

    #[test]
    fn test_eqrel_must_be_binary_with_one_domain() {
        let mut program = Program::new();
        let mut narrow = unary("e1");
        narrow.representation = RelationRepresentation::Eqrel;
        program.add_relation(narrow);

        let mut mixed = Relation::new(
            "e2",
            vec![Attribute::new("a", "number"), Attribute::new("b", "symbol")],
        );
        mixed.representation = RelationRepresentation::Eqrel;
        program.add_relation(mixed);

        let report = run_checker(program);
        assert_eq!(report.errors_matching("is not binary"), 1);
        assert_eq!(report.errors_matching("are different"), 1);
    }

    #[test]
    fn test_name_clash_between_type_and_relation() {
        let mut program = Program::new();
        program.add_type(TypeDecl::Primitive(datalog_ast::PrimitiveType {
            name: "a".into(),
            numeric: true,
            span: Span::internal(),
        }));
        program.add_relation(unary("a"));
        program.add_clause(Clause::fact(Atom::new("a", vec![Argument::number(1)])));

        let report = run_checker(program);
        assert_eq!(report.errors_matching("Name clash on relation a"), 1);
    }

    #[test]
    fn test_io_directive_names_unknown_relation() {
        let mut program = Program::new();
        program.add_directive(Directive::new(DirectiveKind::Output, "nope"));

        let report = run_checker(program);
        assert_eq!(report.errors_matching("Undefined relation nope"), 1);
    }

    #[test]
    fn test_single_use_variable_warns() {
        // a(x) :- b(x, y).
        let mut program = Program::new();
        program.add_relation(unary("a"));
        program.add_relation(Relation::new(
            "b",
            vec![Attribute::new("p", "number"), Attribute::new("q", "number")],
        ));
        program.add_clause(Clause::new(
            Atom::new("a", vec![Argument::var("x")]),
            vec![Literal::Atom(Atom::new(
                "b",
                vec![Argument::var("x"), Argument::var("y")],
            ))],
        ));

        let report = run_checker(program);
        assert_eq!(report.error_count(), 0);
        assert_eq!(report.warning_count(), 1);
    }

    #[test]
    fn test_suppress_warnings_star_mutes_empty_relation() {
        let mut program = Program::new();
        program.add_relation(unary("lonely"));

        let mut config = Config::new();
        config.set("suppress-warnings", "*");
        let mut tu = TranslationUnit::with_config(program, config);
        SemanticChecker.run(&mut tu);
        assert_eq!(tu.report.warning_count(), 0);
    }

    #[test]
    fn test_negation_cycle_reported_once() {
        // p(x) :- q(x). q(x) :- !p(x), r(x).
        let mut program = Program::new();
        program.add_relation(unary("p"));
        program.add_relation(unary("q"));
        program.add_relation(unary("r"));
        program.add_clause(Clause::new(
            Atom::new("p", vec![Argument::var("x")]),
            vec![Literal::Atom(Atom::new("q", vec![Argument::var("x")]))],
        ));
        program.add_clause(Clause::new(
            Atom::new("q", vec![Argument::var("x")]),
            vec![
                Literal::Negation(Atom::new("p", vec![Argument::var("x")])),
                Literal::Atom(Atom::new("r", vec![Argument::var("x")])),
            ],
        ));
        program.add_clause(Clause::fact(Atom::new("r", vec![Argument::number(1)])));

        let report = run_checker(program);
        assert_eq!(report.errors_matching("Unable to stratify relation(s) {p,q}"), 1);
    }

    #[test]
    fn test_counter_in_recursive_clause() {
        let mut program = Program::new();
        program.add_relation(unary("p"));
        program.add_clause(Clause::new(
            Atom::new("p", vec![Argument::var("x")]),
            vec![
                Literal::Atom(Atom::new("p", vec![Argument::var("x")])),
                Literal::Constraint(BinaryConstraint::new(
                    BinaryConstraintOp::Eq,
                    Argument::var("y"),
                    Argument::counter(),
                )),
            ],
        ));

        let report = run_checker(program);
        assert_eq!(
            report.errors_matching("Auto-increment functor in a recursive rule"),
            1
        );
    }

    #[test]
    fn test_number_constant_out_of_range() {
        let mut program = Program::new();
        program.add_relation(unary("a"));
        program.add_clause(Clause::fact(Atom::new(
            "a",
            vec![Argument::number(i64::from(i32::MAX) + 1)],
        )));

        let report = run_checker(program);
        assert_eq!(report.errors_matching("Number constant not in range"), 1);
    }

    #[test]
    fn test_mixed_union_is_an_error() {
        let mut program = Program::new();
        program.add_type(TypeDecl::Union(datalog_ast::UnionType {
            name: "broken".into(),
            elements: vec!["number".into(), "symbol".into()],
            span: Span::internal(),
        }));

        let report = run_checker(program);
        assert_eq!(
            report.errors_matching("contains a mixture of symbol and number types"),
            1
        );
        assert_eq!(
            report.errors_matching("No type checking could occur"),
            1
        );
    }
}
