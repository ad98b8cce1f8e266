use cogsim::context::{ContextSupplier, TrialContext};
use cogsim::error::{Result, SimError};
use cogsim::prng::Prng;

// ─────────────────────────────────────────────────────────────────────────
// Paired choice: each trial offers two of four options. Both payoffs are
// shown after the choice, as noisy draws around the option means.
// ─────────────────────────────────────────────────────────────────────────

/// Payoff points are divided by this before they reach the agent.
pub const PAYOFF_SCALE: f32 = 60.0;

#[derive(Debug, Clone, PartialEq)]
pub struct PairedChoiceContext {
    /// Mean payoff of each option, in points.
    pub means: Vec<f32>,
    pub noise_sd: f32,
}

impl Default for PairedChoiceContext {
    fn default() -> Self {
        Self {
            means: vec![20.0, 27.5, 35.0, 42.5],
            noise_sd: 5.0,
        }
    }
}

impl ContextSupplier for PairedChoiceContext {
    fn name(&self) -> &str {
        "paired_choice"
    }

    fn supply(&self, num_steps: usize, rng: &mut Prng) -> Result<Vec<TrialContext>> {
        let options = self.means.len();
        if options < 2 {
            return Err(SimError::Config(format!(
                "paired choice needs at least two options, got {options}"
            )));
        }
        if !self.noise_sd.is_finite() || self.noise_sd < 0.0 {
            return Err(SimError::Config(format!(
                "noise sd {} must be finite and >= 0",
                self.noise_sd
            )));
        }

        let mut out = Vec::with_capacity(num_steps);
        for _ in 0..num_steps {
            let a = rng.gen_range_usize(0, options);
            let mut b = rng.gen_range_usize(0, options - 1);
            if b >= a {
                b += 1;
            }
            let payoff = |opt: usize, rng: &mut Prng| {
                let x = self.means[opt] + self.noise_sd * rng.standard_normal() as f32;
                x / PAYOFF_SCALE
            };
            let feedback = vec![payoff(a, rng), payoff(b, rng)];
            out.push(TrialContext {
                alternatives: vec![a as u32, b as u32],
                feedback,
                ..Default::default()
            });
        }
        Ok(out)
    }
}
