//! Per-clause argument type inference.
//!
//! Variable types start at `Top` and are narrowed by meet against every
//! constraint until a fixpoint:
//!
//! - an occurrence at position `i` of an atom of relation `R` narrows
//!   the variable by `R`'s declared attribute type (all atoms count —
//!   head, positive, negated and aggregator-nested)
//! - an `=` constraint narrows each side by the other's type
//!
//! Expression nodes are then typed bottom-up from the final variable
//! assignment. Literals and functor results are `Constant`-kinded so
//! they fit under any declared base of the right kind.

use crate::type_env::{AnalysisType, Kind, TypeEnvironment};
use datalog_ast::{
    visit, ArgId, ArgKind, Argument, BinaryConstraintOp, Clause, FunctorArgKind, Literal, Program,
    Symbol,
};
use std::collections::BTreeMap;

/// Inferred types for every argument node of one clause.
#[derive(Clone, Debug, Default)]
pub struct TypeAnalysis {
    types: BTreeMap<ArgId, AnalysisType>,
}

impl TypeAnalysis {
    pub fn analyse(clause: &Clause, program: &Program, env: &TypeEnvironment) -> Self {
        let mut variables: BTreeMap<Symbol, AnalysisType> = BTreeMap::new();
        visit::for_each_variable_in_clause(clause, &mut |_, name| {
            variables.entry(name).or_insert(AnalysisType::Top);
        });

        // Attribute positions every variable occupies.
        let mut attribute_bounds: Vec<(Symbol, AnalysisType)> = Vec::new();
        visit::for_each_atom_in_clause(clause, &mut |atom| {
            let Some(rel) = program.relation(&atom.name) else {
                return;
            };
            if rel.arity() != atom.arity() {
                return;
            }
            for (arg, attr) in atom.args.iter().zip(&rel.attributes) {
                if let ArgKind::Variable(name) = &arg.kind {
                    attribute_bounds.push((*name, env.lattice_type(&attr.type_name)));
                }
            }
        });

        let mut equalities: Vec<(&Argument, &Argument)> = Vec::new();
        collect_equalities(clause, &mut equalities);

        let mut changed = true;
        while changed {
            changed = false;

            for (name, bound) in &attribute_bounds {
                let current = variables.get_mut(name).expect("variable collected");
                let met = env.meet(current, bound);
                if &met != current {
                    *current = met;
                    changed = true;
                }
            }

            for (lhs, rhs) in &equalities {
                let lhs_ty = type_of(lhs, &variables, program, env);
                let rhs_ty = type_of(rhs, &variables, program, env);
                if let ArgKind::Variable(name) = &lhs.kind {
                    let current = variables.get_mut(name).expect("variable collected");
                    let met = env.meet(current, &rhs_ty);
                    if &met != current {
                        *current = met;
                        changed = true;
                    }
                }
                if let ArgKind::Variable(name) = &rhs.kind {
                    let current = variables.get_mut(name).expect("variable collected");
                    let met = env.meet(current, &lhs_ty);
                    if &met != current {
                        *current = met;
                        changed = true;
                    }
                }
            }
        }

        let mut analysis = TypeAnalysis::default();
        visit::for_each_argument_in_clause(clause, &mut |arg| {
            let ty = type_of(arg, &variables, program, env);
            analysis.types.insert(arg.id, ty);
        });
        analysis
    }

    pub fn type_of(&self, id: ArgId) -> &AnalysisType {
        static TOP: AnalysisType = AnalysisType::Top;
        self.types.get(&id).unwrap_or(&TOP)
    }
}

fn collect_equalities<'a>(clause: &'a Clause, out: &mut Vec<(&'a Argument, &'a Argument)>) {
    fn walk_literal<'a>(lit: &'a Literal, out: &mut Vec<(&'a Argument, &'a Argument)>) {
        match lit {
            Literal::Constraint(c) => {
                if c.op == BinaryConstraintOp::Eq {
                    out.push((&c.lhs, &c.rhs));
                }
                walk_argument(&c.lhs, out);
                walk_argument(&c.rhs, out);
            }
            Literal::Atom(atom) | Literal::Negation(atom) => {
                for arg in &atom.args {
                    walk_argument(arg, out);
                }
            }
            Literal::Boolean(_) => {}
        }
    }
    fn walk_argument<'a>(arg: &'a Argument, out: &mut Vec<(&'a Argument, &'a Argument)>) {
        match &arg.kind {
            ArgKind::TypeCast(inner, _) => walk_argument(inner, out),
            ArgKind::IntrinsicFunctor(_, args)
            | ArgKind::UserFunctor(_, args)
            | ArgKind::RecordInit(_, args) => {
                for child in args {
                    walk_argument(child, out);
                }
            }
            ArgKind::Aggregator(aggr) => {
                for lit in &aggr.body {
                    walk_literal(lit, out);
                }
            }
            _ => {}
        }
    }
    for lit in &clause.body {
        walk_literal(lit, out);
    }
}

fn type_of(
    arg: &Argument,
    variables: &BTreeMap<Symbol, AnalysisType>,
    program: &Program,
    env: &TypeEnvironment,
) -> AnalysisType {
    match &arg.kind {
        ArgKind::Variable(name) => variables
            .get(name)
            .cloned()
            .unwrap_or(AnalysisType::Top),
        ArgKind::Unnamed => AnalysisType::Top,
        ArgKind::Number(_) | ArgKind::Counter => AnalysisType::Constant(Kind::Number),
        ArgKind::Text(_) => AnalysisType::Constant(Kind::Symbol),
        ArgKind::TypeCast(_, type_name) => {
            if env.is_type(type_name) {
                env.lattice_type(type_name)
            } else {
                AnalysisType::Top
            }
        }
        ArgKind::IntrinsicFunctor(op, _) => {
            if op.is_numerical() {
                AnalysisType::Constant(Kind::Number)
            } else {
                AnalysisType::Constant(Kind::Symbol)
            }
        }
        ArgKind::UserFunctor(name, _) => match program.functor(*name) {
            Some(decl) => match decl.result {
                FunctorArgKind::Number => AnalysisType::Constant(Kind::Number),
                FunctorArgKind::Symbol => AnalysisType::Constant(Kind::Symbol),
            },
            None => AnalysisType::Top,
        },
        ArgKind::RecordInit(type_name, fields) => {
            let Some(decl) = env.record(type_name) else {
                return AnalysisType::Top;
            };
            if decl.fields.len() != fields.len() {
                return AnalysisType::Top;
            }
            for (field, field_decl) in fields.iter().zip(&decl.fields) {
                let field_ty = type_of(field, variables, program, env);
                let declared = env.lattice_type(&field_decl.type_name);
                if !field_ty.is_valid() || !env.is_subtype(&field_ty, &declared) {
                    // A mistyped element keeps the record undeducible.
                    return AnalysisType::Top;
                }
            }
            AnalysisType::Record(type_name.clone())
        }
        ArgKind::Aggregator(_) => AnalysisType::Constant(Kind::Number),
    }
}

/// Whether the clause is structurally sound enough to typecheck: every
/// atom resolves to a declared relation with matching arity.
pub fn clause_is_typeable(clause: &Clause, program: &Program) -> bool {
    let mut typeable = true;
    visit::for_each_atom_in_clause(clause, &mut |atom| {
        match program.relation(&atom.name) {
            Some(rel) if rel.arity() == atom.arity() => {}
            _ => typeable = false,
        }
    });
    typeable
}

#[cfg(test)]
mod tests {
    use super::*;
    use datalog_ast::{Atom, Attribute, BinaryConstraint, PrimitiveType, Relation, Span, TypeDecl};

    fn program_with_bases() -> Program {
        let mut program = Program::new();
        program.add_type(TypeDecl::Primitive(PrimitiveType {
            name: "even".into(),
            numeric: true,
            span: Span::internal(),
        }));
        program.add_type(TypeDecl::Primitive(PrimitiveType {
            name: "odd".into(),
            numeric: true,
            span: Span::internal(),
        }));
        program.add_relation(Relation::new("evens", vec![Attribute::new("x", "even")]));
        program.add_relation(Relation::new("odds", vec![Attribute::new("x", "odd")]));
        program.add_relation(Relation::new("nums", vec![Attribute::new("x", "number")]));
        program
    }

    #[test]
    fn test_variable_narrowed_by_attribute() {
        let program = program_with_bases();
        let env = TypeEnvironment::build(&program);
        // nums(x) :- evens(x).
        let clause = Clause::new(
            Atom::new("nums", vec![Argument::var("x")]),
            vec![Literal::Atom(Atom::new("evens", vec![Argument::var("x")]))],
        );
        let analysis = TypeAnalysis::analyse(&clause, &program, &env);
        let x_id = clause.head.args[0].id;
        assert_eq!(
            analysis.type_of(x_id),
            &AnalysisType::Base(Kind::Number, "even".into())
        );
    }

    #[test]
    fn test_disjoint_bases_go_invalid() {
        let program = program_with_bases();
        let env = TypeEnvironment::build(&program);
        // nums(x) :- evens(x), odds(x).
        let clause = Clause::new(
            Atom::new("nums", vec![Argument::var("x")]),
            vec![
                Literal::Atom(Atom::new("evens", vec![Argument::var("x")])),
                Literal::Atom(Atom::new("odds", vec![Argument::var("x")])),
            ],
        );
        let analysis = TypeAnalysis::analyse(&clause, &program, &env);
        let x_id = clause.head.args[0].id;
        assert_eq!(analysis.type_of(x_id), &AnalysisType::BottomPrim(Kind::Number));
        assert!(!analysis.type_of(x_id).is_valid());
    }

    #[test]
    fn test_equality_with_string_narrows_to_symbol_constant() {
        let program = program_with_bases();
        let env = TypeEnvironment::build(&program);
        // nums(x) :- nums(x), s = "hi".
        let clause = Clause::new(
            Atom::new("nums", vec![Argument::var("x")]),
            vec![
                Literal::Atom(Atom::new("nums", vec![Argument::var("x")])),
                Literal::Constraint(BinaryConstraint::new(
                    BinaryConstraintOp::Eq,
                    Argument::var("s"),
                    Argument::text("hi"),
                )),
            ],
        );
        let analysis = TypeAnalysis::analyse(&clause, &program, &env);
        let s_id = match &clause.body[1] {
            Literal::Constraint(c) => c.lhs.id,
            _ => unreachable!(),
        };
        assert_eq!(analysis.type_of(s_id), &AnalysisType::Constant(Kind::Symbol));
    }

    #[test]
    fn test_clause_typeability() {
        let program = program_with_bases();
        let good = Clause::new(
            Atom::new("nums", vec![Argument::var("x")]),
            vec![Literal::Atom(Atom::new("evens", vec![Argument::var("x")]))],
        );
        assert!(clause_is_typeable(&good, &program));

        let undeclared = Clause::new(
            Atom::new("nums", vec![Argument::var("x")]),
            vec![Literal::Atom(Atom::new("ghost", vec![Argument::var("x")]))],
        );
        assert!(!clause_is_typeable(&undeclared, &program));

        let wrong_arity = Clause::new(
            Atom::new("nums", vec![Argument::var("x"), Argument::var("y")]),
            vec![],
        );
        assert!(!clause_is_typeable(&wrong_arity, &program));
    }
}
