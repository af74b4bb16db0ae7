//! Program analyses for the Datalog middle-end
//!
//! Pure, cacheable views over a [`datalog_ast::Program`]:
//!
//! - **type_env**: resolves type declarations into a lattice and decides
//!   subtyping
//! - **type_infer**: per-clause argument type inference over that lattice
//! - **grounding**: the grounded-terms map used by the checker and the
//!   witness check
//! - **precedence**: the relation dependency graph, its SCCs, and the
//!   recursive-clause set
//! - **io_types**: input/output/printsize classification
//!
//! [`TranslationUnit`] owns the program together with its config and
//! error report, caches the analyses, and invalidates the whole cache
//! whenever a [`Transformer`] reports a change.

pub mod config;
pub mod grounding;
pub mod io_types;
pub mod precedence;
pub mod translation_unit;
pub mod type_env;
pub mod type_infer;

pub use config::Config;
pub use grounding::{grounded_terms, GroundingMap};
pub use io_types::IoTypes;
pub use precedence::{PrecedenceGraph, RecursiveClauses, SccGraph};
pub use translation_unit::{Transformer, TranslationUnit};
pub use type_env::{AnalysisType, Kind, TypeEnvironment};
pub use type_infer::{clause_is_typeable, TypeAnalysis};
