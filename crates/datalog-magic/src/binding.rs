//! Bound-variable tracking for adornment and magic-rule generation.
//!
//! Besides directly bound variables, the store knows about *composite*
//! variables: a variable equated to a record or functor pattern is
//! bound transitively once every variable inside that pattern is bound.

use datalog_ast::{visit, ArgKind, BinaryConstraintOp, Clause, Literal, Symbol};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Clone, Debug, Default)]
pub struct BindingStore {
    bound: BTreeSet<Symbol>,
    head_bound: BTreeSet<Symbol>,
    dependencies: BTreeMap<Symbol, BTreeSet<Symbol>>,
}

impl BindingStore {
    /// Scan the clause for `v = [..]` / `v = f(..)` equalities and
    /// register the composite dependencies of each such variable.
    pub fn new(clause: &Clause) -> Self {
        let mut store = BindingStore::default();
        visit::for_each_literal_in_clause(clause, &mut |lit| {
            let Literal::Constraint(c) = lit else {
                return;
            };
            if c.op != BinaryConstraintOp::Eq {
                return;
            }
            for (var_side, pattern_side) in [(&c.lhs, &c.rhs), (&c.rhs, &c.lhs)] {
                let Some(name) = var_side.variable_name() else {
                    continue;
                };
                if !matches!(
                    pattern_side.kind,
                    ArgKind::RecordInit(_, _)
                        | ArgKind::IntrinsicFunctor(_, _)
                        | ArgKind::UserFunctor(_, _)
                ) {
                    continue;
                }
                let mut constituents = BTreeSet::new();
                visit::for_each_argument(pattern_side, &mut |arg| {
                    if let ArgKind::Variable(dep) = &arg.kind {
                        constituents.insert(*dep);
                    }
                });
                store
                    .dependencies
                    .entry(name)
                    .or_default()
                    .extend(constituents);
            }
        });
        store
    }

    pub fn bind_variable(&mut self, name: Symbol) {
        self.bound.insert(name);
    }

    /// Head bindings are ordinary bindings remembered separately, so
    /// callers can tell seeds from body-derived bindings.
    pub fn bind_head_variable(&mut self, name: Symbol) {
        self.head_bound.insert(name);
        self.bound.insert(name);
    }

    pub fn is_head_bound(&self, name: Symbol) -> bool {
        self.head_bound.contains(&name)
    }

    /// Directly bound, or a composite whose constituents are all bound.
    pub fn is_bound(&self, name: Symbol) -> bool {
        let mut visiting = BTreeSet::new();
        self.is_bound_inner(name, &mut visiting)
    }

    fn is_bound_inner(&self, name: Symbol, visiting: &mut BTreeSet<Symbol>) -> bool {
        if self.bound.contains(&name) {
            return true;
        }
        if !visiting.insert(name) {
            return false;
        }
        let result = match self.dependencies.get(&name) {
            Some(deps) if !deps.is_empty() => {
                deps.iter().all(|dep| self.is_bound_inner(*dep, visiting))
            }
            _ => false,
        };
        visiting.remove(&name);
        result
    }

    /// Constituent variables of a composite-bound variable.
    pub fn dependencies(&self, name: Symbol) -> Option<&BTreeSet<Symbol>> {
        self.dependencies.get(&name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datalog_ast::{Argument, Atom, BinaryConstraint, Span};
    use internment::Intern;

    fn sym(s: &str) -> Symbol {
        Intern::new(s.to_string())
    }

    #[test]
    fn test_direct_binding() {
        let clause = Clause::new(Atom::new("p", vec![Argument::var("x")]), vec![]);
        let mut store = BindingStore::new(&clause);
        assert!(!store.is_bound(sym("x")));
        store.bind_variable(sym("x"));
        assert!(store.is_bound(sym("x")));
    }

    #[test]
    fn test_composite_binding_through_record() {
        // p(r) :- r = [a, b].
        let record = Argument::new(
            ArgKind::RecordInit("pair".into(), vec![Argument::var("a"), Argument::var("b")]),
            Span::internal(),
        );
        let clause = Clause::new(
            Atom::new("p", vec![Argument::var("r")]),
            vec![Literal::Constraint(BinaryConstraint::new(
                BinaryConstraintOp::Eq,
                Argument::var("r"),
                record,
            ))],
        );
        let mut store = BindingStore::new(&clause);
        assert!(!store.is_bound(sym("r")));

        store.bind_variable(sym("a"));
        assert!(!store.is_bound(sym("r")));

        store.bind_variable(sym("b"));
        assert!(store.is_bound(sym("r")));
        assert_eq!(store.dependencies(sym("r")).unwrap().len(), 2);
    }

    #[test]
    fn test_head_binding_tracked_separately() {
        let clause = Clause::new(Atom::new("p", vec![Argument::var("x")]), vec![]);
        let mut store = BindingStore::new(&clause);
        store.bind_head_variable(sym("x"));
        assert!(store.is_bound(sym("x")));
        assert!(store.is_head_bound(sym("x")));
        assert!(!store.is_head_bound(sym("y")));
    }
}
