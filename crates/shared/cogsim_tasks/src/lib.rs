//! Context suppliers for the built-in task variants.
//!
//! Synthetic schedules generate per-trial context from the subject's stream.
//! [`SubjectPool`] replays caller-provided empirical rows instead.

use cogsim::context::ContextSupplier;
use cogsim::error::{Result, SimError};

pub mod paired_choice;
pub mod pool;
pub mod reversal;
pub mod rlwm;
pub mod three_alt;

pub use paired_choice::PairedChoiceContext;
pub use pool::SubjectPool;
pub use reversal::ReversalContext;
pub use rlwm::RlwmContext;
pub use three_alt::ThreeAltContext;

/// Synthetic supplier matching a built-in variant name.
pub fn supplier_for(variant: &str) -> Result<Box<dyn ContextSupplier>> {
    Ok(match variant {
        "reversal_learning" => Box::new(ReversalContext::default()),
        "paired_choice" => Box::new(PairedChoiceContext::default()),
        "three_alt_full_feedback" => Box::new(ThreeAltContext::default()),
        "rlwm" => Box::new(RlwmContext::default()),
        other => {
            return Err(SimError::Config(format!(
                "no context supplier for variant '{other}'"
            )))
        }
    })
}
