//! Database normalisation ahead of adornment.
//!
//! Four idempotent sub-transformations put the program into the shape
//! the adornment stage requires: I/O relations are not simultaneously
//! producers and consumers, and atom arguments are plain variables.

use datalog_analysis::{TranslationUnit, Transformer};
use datalog_ast::{
    visit, ArgKind, Argument, Atom, BinaryConstraint, BinaryConstraintOp, Clause, Directive,
    DirectiveKind, Literal, Program, QualifiedName, Relation,
};
use std::collections::BTreeSet;

pub struct NormaliseDatabaseTransformer;

impl Transformer for NormaliseDatabaseTransformer {
    fn name(&self) -> &'static str {
        "NormaliseDatabaseTransformer"
    }

    fn transform(&mut self, tu: &mut TranslationUnit) -> bool {
        let mut changed = false;

        changed |= partition_io(tu);
        if changed {
            tu.invalidate_analyses();
        }

        changed |= extract_idb(tu);
        if changed {
            tu.invalidate_analyses();
        }

        changed |= name_constants(tu);
        if changed {
            tu.invalidate_analyses();
        }

        changed |= querify_output_relations(tu);
        if changed {
            tu.invalidate_analyses();
        }

        changed
    }
}

fn copy_rule(head_name: QualifiedName, body_name: QualifiedName, arity: usize, prefix: &str) -> Clause {
    let head_vars: Vec<Argument> = (0..arity)
        .map(|i| Argument::var(&format!("{}{}", prefix, i)))
        .collect();
    let body_vars: Vec<Argument> = head_vars.clone();
    Clause::generated(
        Atom::new(head_name, head_vars),
        vec![Literal::Atom(Atom::new(body_name, body_vars))],
    )
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

/// Split relations that are both input and output/printsize: reads go
/// through a fresh `@split_in` relation copied into the original.
fn partition_io(tu: &mut TranslationUnit) -> bool {
    let io = tu.io_types();
    let to_split: Vec<QualifiedName> = tu
        .program
        .relations
        .iter()
        .filter(|rel| {
            io.is_input(&rel.name) && (io.is_output(&rel.name) || io.is_print_size(&rel.name))
        })
        .map(|rel| rel.name.clone())
        .collect();

    for name in &to_split {
        let rel = tu.program.relation(name).expect("relation exists").clone();
        let new_name = name.prepended("@split_in");

        let mut new_rel = Relation::new(new_name.clone(), rel.attributes.clone());
        new_rel.qualifiers.input = true;

        // Re-route input directives onto the split relation.
        let directives = std::mem::take(&mut tu.program.directives);
        let mut kept = Vec::with_capacity(directives.len());
        for directive in directives {
            if directive.kind != DirectiveKind::Input || &directive.name != name {
                kept.push(directive);
                continue;
            }
            let default_io = directive.param("IO").is_none()
                || (directive.param("IO") == Some("file")
                    && directive.param("filename").is_none());
            let mut moved = if default_io {
                let mut fresh = Directive::new(DirectiveKind::Input, new_name.clone());
                fresh.set_param("IO", "file");
                fresh.set_param("filename", format!("{}.facts", name));
                fresh
            } else {
                directive.clone()
            };
            moved.name = new_name.clone();
            kept.push(moved);
        }
        tu.program.directives = kept;

        if let Some(original) = tu.program.relation_mut(name) {
            original.qualifiers.input = false;
        }

        tu.program
            .add_clause(copy_rule(name.clone(), new_name, rel.arity(), "@var"));
        tu.program.add_relation(new_rel);
    }

    !to_split.is_empty()
}

/// Input relations that also have rules get an `@interm_in` clone; the
/// rules and all readers move to the clone, which copies the original
/// in.
fn extract_idb(tu: &mut TranslationUnit) -> bool {
    let io = tu.io_types();
    let to_extract: Vec<QualifiedName> = tu
        .program
        .relations
        .iter()
        .filter(|rel| io.is_input(&rel.name) && relation_has_rules(&tu.program, &rel.name))
        .map(|rel| rel.name.clone())
        .collect();
    let names: BTreeSet<QualifiedName> = to_extract.iter().cloned().collect();

    for name in &to_extract {
        let rel = tu.program.relation(name).expect("relation exists");
        let mut clone = rel.cloned_as(name.prepended("@interm_in"));
        clone.qualifiers.input = false;
        clone.qualifiers.output = false;
        clone.qualifiers.print_size = false;
        tu.program.add_relation(clone);
    }

    visit::rename_atoms(&mut tu.program, &|name| {
        names.contains(name).then(|| name.prepended("@interm_in"))
    });

    for name in &to_extract {
        let arity = tu.program.relation(name).expect("relation exists").arity();
        tu.program.add_clause(copy_rule(
            name.prepended("@interm_in"),
            name.clone(),
            arity,
            "@query_x",
        ));
    }

    !to_extract.is_empty()
}

/// Replace every non-variable argument by a fresh `@abdul<k>` variable
/// bound by an appended equality; unnamed variables are named but stay
/// free.
fn name_constants(tu: &mut TranslationUnit) -> bool {
    let mut changed = false;

    for clause in &mut tu.program.clauses {
        let mut next = 0usize;
        let mut constraints: Vec<BinaryConstraint> = Vec::new();
        let mut rename = |arg: Argument| -> Argument {
            if matches!(arg.kind, ArgKind::Variable(_)) {
                return arg;
            }
            let name = format!("@abdul{}", next);
            next += 1;
            let replacement = Argument::var(&name).with_span(arg.span);
            if !matches!(arg.kind, ArgKind::Unnamed) {
                constraints.push(BinaryConstraint::new(
                    BinaryConstraintOp::Eq,
                    Argument::var(&name).with_span(arg.span),
                    arg,
                ));
            }
            replacement
        };

        visit::rewrite_arguments_in_atom(&mut clause.head, &mut rename);

        for lit in &mut clause.body {
            let keeps_binding = matches!(
                lit,
                Literal::Constraint(c)
                    if c.op == BinaryConstraintOp::Eq
                        && matches!(c.lhs.kind, ArgKind::Variable(_))
            );
            if keeps_binding {
                // Equalities that already bind a variable stay intact,
                // but atoms nested in them are still normalised.
                visit::for_each_atom_mut_in_literal(lit, &mut |atom| {
                    visit::rewrite_arguments_in_atom(atom, &mut rename);
                });
            } else {
                visit::rewrite_arguments_in_literal(lit, &mut rename);
            }
        }

        clause.body.extend(constraints.into_iter().map(Literal::Constraint));
        changed |= next > 0;
    }

    changed
}

/// Output/printsize relations that are read back or multiply defined
/// get an `@interm_out` clone holding the rules; the original copies
/// out of it.
fn querify_output_relations(tu: &mut TranslationUnit) -> bool {
    let strictly_output = |program: &Program, name: &QualifiedName| {
        let mut referenced = false;
        for clause in &program.clauses {
            for lit in &clause.body {
                visit::for_each_atom_in_literal(lit, &mut |atom| {
                    if &atom.name == name {
                        referenced = true;
                    }
                });
            }
        }
        let rule_count = program.clauses_of(name).count();
        !referenced && rule_count <= 1
    };

    let io = tu.io_types();
    let to_querify: Vec<QualifiedName> = tu
        .program
        .relations
        .iter()
        .filter(|rel| {
            (io.is_output(&rel.name) || io.is_print_size(&rel.name))
                && !strictly_output(&tu.program, &rel.name)
        })
        .map(|rel| rel.name.clone())
        .collect();
    let names: BTreeSet<QualifiedName> = to_querify.iter().cloned().collect();

    for name in &to_querify {
        let rel = tu.program.relation(name).expect("relation exists");
        let mut clone = rel.cloned_as(name.prepended("@interm_out"));
        clone.qualifiers.input = false;
        clone.qualifiers.output = false;
        clone.qualifiers.print_size = false;
        tu.program.add_relation(clone);
    }

    visit::rename_atoms(&mut tu.program, &|name| {
        names.contains(name).then(|| name.prepended("@interm_out"))
    });

    for name in &to_querify {
        let arity = tu.program.relation(name).expect("relation exists").arity();
        tu.program.add_clause(copy_rule(
            name.clone(),
            name.prepended("@interm_out"),
            arity,
            "@query_x",
        ));
    }

    !to_querify.is_empty()
}
