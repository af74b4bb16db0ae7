//! Sideways information passing strategies.
//!
//! A SIPS decides which body atom is adorned next given the variables
//! bound so far. The order it chooses is the order the rewritten clause
//! keeps, so the supplementary rules of the magic-set core see demand
//! flow exactly as placed here.

use crate::binding::BindingStore;
use datalog_ast::{ArgKind, Atom, QualifiedName};
use std::collections::BTreeSet;

pub trait Sips {
    fn name(&self) -> &'static str;

    /// Pick the next atom to place. `atoms` holds `None` for already
    /// placed positions; at least one `Some` remains when called.
    fn next_atom(
        &self,
        atoms: &[Option<&Atom>],
        bindings: &BindingStore,
        edb: &BTreeSet<QualifiedName>,
    ) -> usize;
}

fn bound_argument_count(atom: &Atom, bindings: &BindingStore) -> usize {
    atom.args
        .iter()
        .filter(|arg| match &arg.kind {
            ArgKind::Variable(name) => bindings.is_bound(*name),
            _ => arg.is_constant(),
        })
        .count()
}

/// Source order, the strategy of the straight left-to-right pipeline.
pub struct LeftToRightSips;

impl Sips for LeftToRightSips {
    fn name(&self) -> &'static str {
        "left-to-right"
    }

    fn next_atom(
        &self,
        atoms: &[Option<&Atom>],
        _bindings: &BindingStore,
        _edb: &BTreeSet<QualifiedName>,
    ) -> usize {
        atoms
            .iter()
            .position(Option::is_some)
            .expect("an unplaced atom remains")
    }
}

/// Pick the atom with the most bound arguments; ties prefer EDB
/// relations, then the left-most candidate.
pub struct MaxBoundSips;

impl Sips for MaxBoundSips {
    fn name(&self) -> &'static str {
        "max-bound"
    }

    fn next_atom(
        &self,
        atoms: &[Option<&Atom>],
        bindings: &BindingStore,
        edb: &BTreeSet<QualifiedName>,
    ) -> usize {
        let mut best: Option<usize> = None;
        let mut best_bound = 0usize;
        let mut best_is_edb = false;

        for (index, slot) in atoms.iter().enumerate() {
            let Some(atom) = slot else {
                continue;
            };
            let bound = bound_argument_count(atom, bindings);
            let is_edb = edb.contains(&atom.name);

            if best.is_none() || bound > best_bound {
                best = Some(index);
                best_bound = bound;
                best_is_edb = is_edb;
            } else if bound == best_bound && is_edb && !best_is_edb {
                best = Some(index);
                best_is_edb = true;
            }
        }

        best.expect("an unplaced atom remains")
    }
}
