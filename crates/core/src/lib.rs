//! # cogsim
//!
//! Prior-predictive simulator for sequential decision-making tasks.
//!
//! Each simulated subject gets hyperparameters drawn from their priors, a
//! bounded random-walk trajectory of per-trial cognitive parameters, an
//! externally supplied trial context, and a softmax-choice agent that learns
//! by the delta rule. Subjects are stacked into fixed-shape batches for an
//! external inference trainer.
//!
//! ## Quick Start
//!
//! ```
//! use cogsim::prelude::*;
//!
//! struct Paired;
//!
//! impl ContextSupplier for Paired {
//!     fn name(&self) -> &str {
//!         "paired"
//!     }
//!
//!     fn supply(&self, num_steps: usize, _rng: &mut Prng) -> cogsim::error::Result<Vec<TrialContext>> {
//!         Ok(vec![
//!             TrialContext {
//!                 alternatives: vec![0, 1],
//!                 feedback: vec![0.4, 0.6],
//!                 ..Default::default()
//!             };
//!             num_steps
//!         ])
//!     }
//! }
//!
//! let variant = TaskVariant::paired_choice().unwrap();
//! let batch = BatchOrchestrator::new(4)
//!     .simulate_batch(&variant, &Paired, 42)
//!     .unwrap();
//! assert_eq!(batch.sim_data.shape, vec![4, 80, 2]);
//! ```
//!
//! ## Feature Flags
//!
//! - `serde` (default): serialization derives and JSON generator configs
//! - `parallel`: simulate the subjects of a batch on rayon workers
//!
//! ## Modules
//!
//! - [`priors`]: hyperparameter and initializer distributions
//! - [`trajectory`]: bounded diffusion and regime-switching walks
//! - [`simulator`]: the per-trial choice agent
//! - [`batch`]: batch orchestration and assembly
//! - [`storage`]: the batch archive format

#[path = "core/error.rs"]
pub mod error;

#[path = "core/prng.rs"]
pub mod prng;

#[path = "core/priors.rs"]
pub mod priors;

#[path = "core/trajectory.rs"]
pub mod trajectory;

#[path = "core/context.rs"]
pub mod context;

#[path = "core/policy.rs"]
pub mod policy;

#[path = "core/variant.rs"]
pub mod variant;

#[path = "core/simulator.rs"]
pub mod simulator;

#[path = "core/batch.rs"]
pub mod batch;

#[path = "core/storage.rs"]
pub mod storage;

#[cfg(feature = "serde")]
#[path = "core/config.rs"]
pub mod config;

/// Prelude module for convenient imports.
///
/// ```
/// use cogsim::prelude::*;
/// ```
pub mod prelude {
    pub use crate::batch::{Batch, BatchArray, BatchOrchestrator, LengthPolicy};
    #[cfg(feature = "serde")]
    pub use crate::config::GeneratorConfig;
    pub use crate::context::{ContextSupplier, TrialContext};
    pub use crate::error::SimError;
    pub use crate::priors::{Prior, PriorSet};
    pub use crate::prng::Prng;
    pub use crate::simulator::{ChoiceSimulator, Phase, TrialOutput};
    pub use crate::trajectory::{Bounds, Trajectory, TrajectoryGenerator, WalkKind};
    pub use crate::variant::TaskVariant;
}
