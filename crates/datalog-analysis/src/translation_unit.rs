//! The translation unit: program + configuration + diagnostics +
//! cached analyses.
//!
//! Analyses are computed on demand and shared as `Rc` snapshots, so a
//! pass may keep a snapshot while it mutates the program. Any pass that
//! changes the program must report it, which drops the entire cache.

use crate::{
    Config, IoTypes, PrecedenceGraph, RecursiveClauses, SccGraph, TypeEnvironment,
};
use datalog_ast::{ErrorReport, Program};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Default)]
struct AnalysisCache {
    type_env: RefCell<Option<Rc<TypeEnvironment>>>,
    precedence: RefCell<Option<Rc<PrecedenceGraph>>>,
    sccs: RefCell<Option<Rc<SccGraph>>>,
    recursive: RefCell<Option<Rc<RecursiveClauses>>>,
    io_types: RefCell<Option<Rc<IoTypes>>>,
}

/// One program moving through the middle-end.
#[derive(Default)]
pub struct TranslationUnit {
    pub program: Program,
    pub config: Config,
    pub report: ErrorReport,
    cache: AnalysisCache,
}

impl TranslationUnit {
    pub fn new(program: Program) -> Self {
        TranslationUnit {
            program,
            ..TranslationUnit::default()
        }
    }

    pub fn with_config(program: Program, config: Config) -> Self {
        TranslationUnit {
            program,
            config,
            ..TranslationUnit::default()
        }
    }

    pub fn type_environment(&self) -> Rc<TypeEnvironment> {
        self.cache
            .type_env
            .borrow_mut()
            .get_or_insert_with(|| Rc::new(TypeEnvironment::build(&self.program)))
            .clone()
    }

    pub fn precedence_graph(&self) -> Rc<PrecedenceGraph> {
        self.cache
            .precedence
            .borrow_mut()
            .get_or_insert_with(|| Rc::new(PrecedenceGraph::compute(&self.program)))
            .clone()
    }

    pub fn scc_graph(&self) -> Rc<SccGraph> {
        let precedence = self.precedence_graph();
        self.cache
            .sccs
            .borrow_mut()
            .get_or_insert_with(|| Rc::new(SccGraph::compute(&precedence)))
            .clone()
    }

    pub fn recursive_clauses(&self) -> Rc<RecursiveClauses> {
        let sccs = self.scc_graph();
        self.cache
            .recursive
            .borrow_mut()
            .get_or_insert_with(|| Rc::new(RecursiveClauses::compute(&self.program, &sccs)))
            .clone()
    }

    pub fn io_types(&self) -> Rc<IoTypes> {
        self.cache
            .io_types
            .borrow_mut()
            .get_or_insert_with(|| Rc::new(IoTypes::compute(&self.program)))
            .clone()
    }

    /// Drop every cached analysis; called after a pass changed the
    /// program.
    pub fn invalidate_analyses(&self) {
        self.cache.type_env.replace(None);
        self.cache.precedence.replace(None);
        self.cache.sccs.replace(None);
        self.cache.recursive.replace(None);
        self.cache.io_types.replace(None);
    }

    /// Record types cannot cross the subprogram-engine boundary, so
    /// finding one drops the `engine` configuration. Kept as an
    /// explicit call rather than a hidden mutation inside a check.
    pub fn disable_subprogram_engine(&mut self) {
        if self.config.has("engine") {
            self.config.unset("engine");
        }
    }
}

/// A pass over the translation unit.
pub trait Transformer {
    fn name(&self) -> &'static str;

    /// Apply the pass; `true` means the program changed.
    fn transform(&mut self, tu: &mut TranslationUnit) -> bool;

    /// Apply and invalidate the analysis cache on change.
    fn run(&mut self, tu: &mut TranslationUnit) -> bool {
        let changed = self.transform(tu);
        if changed {
            tu.invalidate_analyses();
        }
        changed
    }
}
