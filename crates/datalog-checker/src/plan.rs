//! Execution-plan version validation.
//!
//! A recursive clause is specialised once per body atom that shares the
//! head's SCC; plans may only name those versions.

use datalog_analysis::{TranslationUnit, Transformer};
use datalog_ast::{Diagnostic, DiagnosticMessage};

pub struct ExecutionPlanChecker;

impl Transformer for ExecutionPlanChecker {
    fn name(&self) -> &'static str {
        "ExecutionPlanChecker"
    }

    fn transform(&mut self, tu: &mut TranslationUnit) -> bool {
        let sccs = tu.scc_graph();
        let recursive = tu.recursive_clauses();

        for (index, clause) in tu.program.clauses.iter().enumerate() {
            if !recursive.is_recursive(index) {
                continue;
            }
            let Some(plan) = &clause.plan else {
                continue;
            };

            let head_scc = sccs.scc_of(&clause.head.name);
            let versions = clause
                .body_atoms()
                .filter(|atom| head_scc.is_some() && sccs.scc_of(&atom.name) == head_scc)
                .count();

            for (&version, order) in &plan.orders {
                if version >= versions {
                    tu.report.add_diagnostic(
                        Diagnostic::error(DiagnosticMessage::new(
                            format!("execution plan for version {}", version),
                            order.span,
                        ))
                        .with_note(DiagnosticMessage::text(format!(
                            "only versions 0..{} permitted",
                            versions.saturating_sub(1)
                        ))),
                    );
                }
            }
        }
        false
    }
}
