//! Input/output classification of relations.
//!
//! A relation is an input (resp. output, printsize) if either its
//! declaration carries the qualifier or an I/O directive names it.

use datalog_ast::{DirectiveKind, Program, QualifiedName};
use std::collections::BTreeSet;

#[derive(Clone, Debug, Default)]
pub struct IoTypes {
    inputs: BTreeSet<QualifiedName>,
    outputs: BTreeSet<QualifiedName>,
    print_sizes: BTreeSet<QualifiedName>,
}

impl IoTypes {
    pub fn compute(program: &Program) -> Self {
        let mut io = IoTypes::default();
        for rel in &program.relations {
            if rel.qualifiers.input {
                io.inputs.insert(rel.name.clone());
            }
            if rel.qualifiers.output {
                io.outputs.insert(rel.name.clone());
            }
            if rel.qualifiers.print_size {
                io.print_sizes.insert(rel.name.clone());
            }
        }
        for directive in &program.directives {
            let set = match directive.kind {
                DirectiveKind::Input => &mut io.inputs,
                DirectiveKind::Output => &mut io.outputs,
                DirectiveKind::PrintSize => &mut io.print_sizes,
            };
            set.insert(directive.name.clone());
        }
        io
    }

    pub fn is_input(&self, name: &QualifiedName) -> bool {
        self.inputs.contains(name)
    }

    pub fn is_output(&self, name: &QualifiedName) -> bool {
        self.outputs.contains(name)
    }

    pub fn is_print_size(&self, name: &QualifiedName) -> bool {
        self.print_sizes.contains(name)
    }

    pub fn is_io(&self, name: &QualifiedName) -> bool {
        self.is_input(name) || self.is_output(name) || self.is_print_size(name)
    }
}
