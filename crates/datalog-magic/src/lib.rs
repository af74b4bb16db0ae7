//! Magic-set transformation pipeline
//!
//! Rewrites a checked program into a demand-driven form for bottom-up
//! evaluation. Four stages, each an idempotent [`Transformer`]:
//!
//! 1. **normalise** — partition I/O relations, extract the IDB from
//!    input relations, name constants, querify outputs
//! 2. **label** — `@neglabel` copies for negation and aggregation,
//!    `@poscopy_<k>` duplicates of shared positive strata
//! 3. **adorn** — bound/free specialisation `R.{s}` driven by a
//!    pluggable SIPS (default: max-bound)
//! 4. **magic** — refined clauses, `@magic` relations and
//!    supplementary rules
//!
//! Labelling runs before adornment: the adornment stage excludes
//! `@neglabel` relations, which only exist once labelling has run.
//!
//! The whole pipeline is gated on the `magic-transform` configuration
//! key; without it the program passes through untouched.

mod adorn;
mod binding;
mod label;
mod magic;
mod normalise;
mod sips;

pub use adorn::{adornment_of, is_adorned_name, AdornDatabaseTransformer};
pub use binding::BindingStore;
pub use label::LabelDatabaseTransformer;
pub use magic::MagicSetCoreTransformer;
pub use normalise::NormaliseDatabaseTransformer;
pub use sips::{LeftToRightSips, MaxBoundSips, Sips};

use datalog_analysis::{TranslationUnit, Transformer};

/// The composed pipeline: normalise, label, adorn, magic-set.
pub struct MagicSetPipeline {
    adorn: AdornDatabaseTransformer,
}

impl MagicSetPipeline {
    pub fn new() -> Self {
        MagicSetPipeline {
            adorn: AdornDatabaseTransformer::new(),
        }
    }

    /// Pipeline with a non-default sideways information passing
    /// strategy.
    pub fn with_sips(sips: Box<dyn Sips>) -> Self {
        MagicSetPipeline {
            adorn: AdornDatabaseTransformer::with_sips(sips),
        }
    }
}

impl Default for MagicSetPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Transformer for MagicSetPipeline {
    fn name(&self) -> &'static str {
        "MagicSetPipeline"
    }

    fn transform(&mut self, tu: &mut TranslationUnit) -> bool {
        if !tu.config.has("magic-transform") {
            return false;
        }

        let mut changed = false;
        changed |= NormaliseDatabaseTransformer.run(tu);
        changed |= LabelDatabaseTransformer.run(tu);
        changed |= self.adorn.run(tu);
        changed |= MagicSetCoreTransformer.run(tu);
        changed
    }
}
