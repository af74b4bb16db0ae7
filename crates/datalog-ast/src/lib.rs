//! Abstract syntax tree for the Datalog middle-end
//!
//! This crate is the data-model substrate shared by the semantic checker
//! and the magic-set pipeline. It defines:
//!
//! - **Program**: the mutable container of relations, clauses, type and
//!   functor declarations, and I/O directives
//! - **QualifiedName**: dotted names used to mint rewrite namespaces
//!   (`@magic.R`, `@neglabel.R`, `R.{bfbf}`, …)
//! - **Clause / Literal / Argument**: rule bodies down to argument nodes,
//!   each argument carrying a stable [`ArgId`] used as a map key by the
//!   grounding and type analyses
//! - **ErrorReport**: the append-only diagnostic sink
//! - **visit**: generic traversal and bottom-up rewrite helpers
//!
//! The surface parser is an external collaborator; programs here are
//! built by it (or by hand in tests) and mutated only by transformation
//! passes.

mod ast;
mod location;
mod qualified_name;
mod report;
pub mod visit;

pub use ast::{
    AggregateOp, Aggregator, ArgId, ArgKind, Argument, Atom, Attribute, BinaryConstraint,
    BinaryConstraintOp, BooleanConstraint, Clause, Directive, DirectiveKind, ExecutionOrder,
    ExecutionPlan, FunctorArgKind, FunctorDeclaration, FunctorOp, Literal, PrimitiveType, Program,
    RecordField, RecordType, Relation, RelationQualifiers, RelationRepresentation, Symbol,
    TypeDecl, UnionType,
};
pub use location::{Span, SrcId};
pub use qualified_name::QualifiedName;
pub use report::{Diagnostic, DiagnosticMessage, ErrorReport, Severity};
