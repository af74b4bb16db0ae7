//! Generic traversal and rewrite helpers.
//!
//! Read-only visitors walk nodes in pre-order and descend into every
//! nested position, including negated atoms and aggregator bodies.
//! The `rewrite_*` family applies a pure `Argument -> Argument` mapping
//! bottom-up, so children are always rewritten before their parents.

use crate::{ArgKind, Argument, Atom, Clause, Literal, Program, QualifiedName, Symbol};

// ---------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------

/// Visit `arg` and every argument nested inside it, pre-order.
pub fn for_each_argument(arg: &Argument, f: &mut impl FnMut(&Argument)) {
    f(arg);
    match &arg.kind {
        ArgKind::TypeCast(inner, _) => for_each_argument(inner, f),
        ArgKind::IntrinsicFunctor(_, args)
        | ArgKind::UserFunctor(_, args)
        | ArgKind::RecordInit(_, args) => {
            for child in args {
                for_each_argument(child, f);
            }
        }
        ArgKind::Aggregator(aggr) => {
            if let Some(target) = &aggr.target {
                for_each_argument(target, f);
            }
            for lit in &aggr.body {
                for_each_argument_in_literal(lit, f);
            }
        }
        _ => {}
    }
}

pub fn for_each_argument_in_atom(atom: &Atom, f: &mut impl FnMut(&Argument)) {
    for arg in &atom.args {
        for_each_argument(arg, f);
    }
}

pub fn for_each_argument_in_literal(lit: &Literal, f: &mut impl FnMut(&Argument)) {
    match lit {
        Literal::Atom(atom) | Literal::Negation(atom) => for_each_argument_in_atom(atom, f),
        Literal::Constraint(c) => {
            for_each_argument(&c.lhs, f);
            for_each_argument(&c.rhs, f);
        }
        Literal::Boolean(_) => {}
    }
}

/// Visit every argument in the clause, head included.
pub fn for_each_argument_in_clause(clause: &Clause, f: &mut impl FnMut(&Argument)) {
    for_each_argument_in_atom(&clause.head, f);
    for lit in &clause.body {
        for_each_argument_in_literal(lit, f);
    }
}

/// Visit every named variable occurrence in the clause.
pub fn for_each_variable_in_clause(clause: &Clause, f: &mut impl FnMut(&Argument, Symbol)) {
    for_each_argument_in_clause(clause, &mut |arg| {
        if let ArgKind::Variable(name) = &arg.kind {
            f(arg, *name);
        }
    });
}

/// Visit every named variable occurrence under a single atom.
pub fn for_each_variable_in_atom(atom: &Atom, f: &mut impl FnMut(&Argument, Symbol)) {
    for_each_argument_in_atom(atom, &mut |arg| {
        if let ArgKind::Variable(name) = &arg.kind {
            f(arg, *name);
        }
    });
}

// ---------------------------------------------------------------------
// Atoms
// ---------------------------------------------------------------------

fn for_each_atom_in_argument(arg: &Argument, f: &mut impl FnMut(&Atom)) {
    match &arg.kind {
        ArgKind::TypeCast(inner, _) => for_each_atom_in_argument(inner, f),
        ArgKind::IntrinsicFunctor(_, args)
        | ArgKind::UserFunctor(_, args)
        | ArgKind::RecordInit(_, args) => {
            for child in args {
                for_each_atom_in_argument(child, f);
            }
        }
        ArgKind::Aggregator(aggr) => {
            if let Some(target) = &aggr.target {
                for_each_atom_in_argument(target, f);
            }
            for lit in &aggr.body {
                for_each_atom_in_literal(lit, f);
            }
        }
        _ => {}
    }
}

fn for_each_atom_in_atom(atom: &Atom, f: &mut impl FnMut(&Atom)) {
    f(atom);
    for arg in &atom.args {
        for_each_atom_in_argument(arg, f);
    }
}

/// Visit every atom in the literal, including atoms nested inside
/// aggregator bodies.
pub fn for_each_atom_in_literal(lit: &Literal, f: &mut impl FnMut(&Atom)) {
    match lit {
        Literal::Atom(atom) | Literal::Negation(atom) => for_each_atom_in_atom(atom, f),
        Literal::Constraint(c) => {
            for_each_atom_in_argument(&c.lhs, f);
            for_each_atom_in_argument(&c.rhs, f);
        }
        Literal::Boolean(_) => {}
    }
}

/// Visit every atom of the clause, head included.
pub fn for_each_atom_in_clause(clause: &Clause, f: &mut impl FnMut(&Atom)) {
    for_each_atom_in_atom(&clause.head, f);
    for lit in &clause.body {
        for_each_atom_in_literal(lit, f);
    }
}

pub fn for_each_atom_in_program(program: &Program, f: &mut impl FnMut(&Atom)) {
    for clause in &program.clauses {
        for_each_atom_in_clause(clause, f);
    }
}

// Mutable atom visitors, used by the renaming passes.

fn for_each_atom_mut_in_argument(arg: &mut Argument, f: &mut impl FnMut(&mut Atom)) {
    match &mut arg.kind {
        ArgKind::TypeCast(inner, _) => for_each_atom_mut_in_argument(inner, f),
        ArgKind::IntrinsicFunctor(_, args)
        | ArgKind::UserFunctor(_, args)
        | ArgKind::RecordInit(_, args) => {
            for child in args {
                for_each_atom_mut_in_argument(child, f);
            }
        }
        ArgKind::Aggregator(aggr) => {
            if let Some(target) = &mut aggr.target {
                for_each_atom_mut_in_argument(target, f);
            }
            for lit in &mut aggr.body {
                for_each_atom_mut_in_literal(lit, f);
            }
        }
        _ => {}
    }
}

fn for_each_atom_mut_in_atom(atom: &mut Atom, f: &mut impl FnMut(&mut Atom)) {
    f(atom);
    for arg in &mut atom.args {
        for_each_atom_mut_in_argument(arg, f);
    }
}

pub fn for_each_atom_mut_in_literal(lit: &mut Literal, f: &mut impl FnMut(&mut Atom)) {
    match lit {
        Literal::Atom(atom) | Literal::Negation(atom) => for_each_atom_mut_in_atom(atom, f),
        Literal::Constraint(c) => {
            for_each_atom_mut_in_argument(&mut c.lhs, f);
            for_each_atom_mut_in_argument(&mut c.rhs, f);
        }
        Literal::Boolean(_) => {}
    }
}

/// Visit every atom of the clause mutably, head included.
pub fn for_each_atom_mut_in_clause(clause: &mut Clause, f: &mut impl FnMut(&mut Atom)) {
    for_each_atom_mut_in_atom(&mut clause.head, f);
    for lit in &mut clause.body {
        for_each_atom_mut_in_literal(lit, f);
    }
}

pub fn for_each_atom_mut_in_program(program: &mut Program, f: &mut impl FnMut(&mut Atom)) {
    for clause in &mut program.clauses {
        for_each_atom_mut_in_clause(clause, f);
    }
}

/// Rename every atom of the program for which `rename` returns a new
/// name. Heads, body atoms, negations and aggregator bodies included.
pub fn rename_atoms(
    program: &mut Program,
    rename: &impl Fn(&QualifiedName) -> Option<QualifiedName>,
) -> bool {
    let mut changed = false;
    for_each_atom_mut_in_program(program, &mut |atom| {
        if let Some(new_name) = rename(&atom.name) {
            atom.name = new_name;
            changed = true;
        }
    });
    changed
}

// ---------------------------------------------------------------------
// Literals
// ---------------------------------------------------------------------

/// Visit every literal of the clause body, descending into aggregator
/// bodies.
pub fn for_each_literal_in_clause(clause: &Clause, f: &mut impl FnMut(&Literal)) {
    fn walk_argument(arg: &Argument, f: &mut impl FnMut(&Literal)) {
        match &arg.kind {
            ArgKind::TypeCast(inner, _) => walk_argument(inner, f),
            ArgKind::IntrinsicFunctor(_, args)
            | ArgKind::UserFunctor(_, args)
            | ArgKind::RecordInit(_, args) => {
                for child in args {
                    walk_argument(child, f);
                }
            }
            ArgKind::Aggregator(aggr) => {
                for lit in &aggr.body {
                    walk_literal(lit, f);
                }
            }
            _ => {}
        }
    }
    fn walk_literal(lit: &Literal, f: &mut impl FnMut(&Literal)) {
        f(lit);
        match lit {
            Literal::Atom(atom) | Literal::Negation(atom) => {
                for arg in &atom.args {
                    walk_argument(arg, f);
                }
            }
            Literal::Constraint(c) => {
                walk_argument(&c.lhs, f);
                walk_argument(&c.rhs, f);
            }
            Literal::Boolean(_) => {}
        }
    }
    for lit in &clause.body {
        walk_literal(lit, f);
    }
}

// ---------------------------------------------------------------------
// Bottom-up rewriting
// ---------------------------------------------------------------------

fn rewrite_argument(arg: Argument, f: &mut impl FnMut(Argument) -> Argument) -> Argument {
    let Argument { id, span, kind } = arg;
    let kind = match kind {
        ArgKind::TypeCast(inner, ty) => {
            ArgKind::TypeCast(Box::new(rewrite_argument(*inner, f)), ty)
        }
        ArgKind::IntrinsicFunctor(op, args) => ArgKind::IntrinsicFunctor(
            op,
            args.into_iter().map(|a| rewrite_argument(a, f)).collect(),
        ),
        ArgKind::UserFunctor(name, args) => ArgKind::UserFunctor(
            name,
            args.into_iter().map(|a| rewrite_argument(a, f)).collect(),
        ),
        ArgKind::RecordInit(ty, args) => ArgKind::RecordInit(
            ty,
            args.into_iter().map(|a| rewrite_argument(a, f)).collect(),
        ),
        ArgKind::Aggregator(mut aggr) => {
            aggr.target = aggr.target.map(|t| rewrite_argument(t, f));
            for lit in &mut aggr.body {
                rewrite_arguments_in_literal(lit, f);
            }
            ArgKind::Aggregator(aggr)
        }
        other => other,
    };
    f(Argument { id, span, kind })
}

fn take_argument(slot: &mut Argument) -> Argument {
    std::mem::replace(slot, Argument::unnamed())
}

/// Rewrite every argument of the atom bottom-up.
pub fn rewrite_arguments_in_atom(atom: &mut Atom, f: &mut impl FnMut(Argument) -> Argument) {
    for slot in &mut atom.args {
        let arg = take_argument(slot);
        *slot = rewrite_argument(arg, f);
    }
}

/// Rewrite every argument of the literal bottom-up.
pub fn rewrite_arguments_in_literal(lit: &mut Literal, f: &mut impl FnMut(Argument) -> Argument) {
    match lit {
        Literal::Atom(atom) | Literal::Negation(atom) => rewrite_arguments_in_atom(atom, f),
        Literal::Constraint(c) => {
            let lhs = take_argument(&mut c.lhs);
            c.lhs = rewrite_argument(lhs, f);
            let rhs = take_argument(&mut c.rhs);
            c.rhs = rewrite_argument(rhs, f);
        }
        Literal::Boolean(_) => {}
    }
}

/// Rewrite every argument of the clause bottom-up, head included.
pub fn rewrite_arguments_in_clause(clause: &mut Clause, f: &mut impl FnMut(Argument) -> Argument) {
    rewrite_arguments_in_atom(&mut clause.head, f);
    for lit in &mut clause.body {
        rewrite_arguments_in_literal(lit, f);
    }
}
