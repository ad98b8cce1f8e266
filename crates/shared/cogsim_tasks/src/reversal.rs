use cogsim::context::{ContextSupplier, TrialContext};
use cogsim::error::{Result, SimError};
use cogsim::prng::Prng;

// ─────────────────────────────────────────────────────────────────────────
// Reversal: two stimulus sets alternate in fixed-length blocks. Within the
// current set one option pays off with `p_good`, the other with `1 - p_good`,
// and the better option flips after a randomized run of trials.
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct ReversalContext {
    pub block_len: usize,
    pub p_good: f32,
    /// Run lengths between reversals are uniform in [min_run, max_run].
    pub min_run: usize,
    pub max_run: usize,
}

impl Default for ReversalContext {
    fn default() -> Self {
        Self {
            block_len: 128,
            p_good: 0.8,
            min_run: 16,
            max_run: 40,
        }
    }
}

impl ContextSupplier for ReversalContext {
    fn name(&self) -> &str {
        "reversal"
    }

    fn supply(&self, num_steps: usize, rng: &mut Prng) -> Result<Vec<TrialContext>> {
        if self.block_len == 0 || self.min_run == 0 || self.min_run > self.max_run {
            return Err(SimError::Config(format!(
                "reversal schedule needs block_len >= 1 and 1 <= min_run <= max_run (got {self:?})"
            )));
        }
        if !(0.0..=1.0).contains(&self.p_good) {
            return Err(SimError::Config(format!(
                "p_good {} outside [0, 1]",
                self.p_good
            )));
        }

        let mut out = Vec::with_capacity(num_steps);
        let mut good = rng.gen_range_usize(0, 2);
        let mut run_left = rng.gen_range_usize(self.min_run, self.max_run + 1);
        for t in 0..num_steps {
            if run_left == 0 {
                good = 1 - good;
                run_left = rng.gen_range_usize(self.min_run, self.max_run + 1);
            }
            run_left -= 1;

            let mut feedback = vec![1.0 - self.p_good; 2];
            feedback[good] = self.p_good;
            out.push(TrialContext {
                condition: ((t / self.block_len) % 2) as u32,
                feedback,
                ..Default::default()
            });
        }
        Ok(out)
    }
}
