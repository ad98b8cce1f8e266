use cogsim::context::{ContextSupplier, TrialContext};
use cogsim::error::{Result, SimError};
use cogsim::prng::Prng;

// ─────────────────────────────────────────────────────────────────────────
// RLWM: learning blocks with small or large stimulus sets. Each stimulus has
// one correct response out of three; within a block the stimuli appear in
// shuffled passes, each pass showing every stimulus once.
// ─────────────────────────────────────────────────────────────────────────

pub const NUM_RESPONSES: u32 = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct RlwmContext {
    /// Set sizes a block may use, drawn uniformly.
    pub set_sizes: Vec<u32>,
    /// Passes through the stimulus set per block.
    pub passes_per_block: usize,
}

impl Default for RlwmContext {
    fn default() -> Self {
        Self {
            set_sizes: vec![3, 6],
            passes_per_block: 13,
        }
    }
}

impl ContextSupplier for RlwmContext {
    fn name(&self) -> &str {
        "rlwm"
    }

    fn supply(&self, num_steps: usize, rng: &mut Prng) -> Result<Vec<TrialContext>> {
        if self.set_sizes.is_empty() || self.set_sizes.contains(&0) {
            return Err(SimError::Config(format!(
                "set sizes {:?} must be non-empty and >= 1",
                self.set_sizes
            )));
        }
        if self.passes_per_block == 0 {
            return Err(SimError::Config("passes per block must be >= 1".into()));
        }

        let mut out = Vec::with_capacity(num_steps);
        let mut block = 0u32;
        while out.len() < num_steps {
            let set_size = self.set_sizes[rng.gen_range_usize(0, self.set_sizes.len())];
            let correct: Vec<u32> = (0..set_size)
                .map(|_| rng.gen_range_usize(0, NUM_RESPONSES as usize) as u32)
                .collect();
            let mut order: Vec<u32> = (0..set_size).collect();
            'block: for _ in 0..self.passes_per_block {
                rng.shuffle(&mut order);
                for &stimulus in &order {
                    if out.len() == num_steps {
                        break 'block;
                    }
                    out.push(TrialContext {
                        stimulus,
                        block,
                        set_size,
                        correct_response: correct[stimulus as usize],
                        ..Default::default()
                    });
                }
            }
            block += 1;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cogsim::context::block_change_indices;

    #[test]
    fn blocks_keep_a_fixed_mapping() {
        let ctx = RlwmContext::default()
            .supply(700, &mut Prng::new(6))
            .unwrap();
        assert_eq!(ctx.len(), 700);
        let mut mapping = std::collections::BTreeMap::new();
        for c in &ctx {
            assert!(c.stimulus < c.set_size);
            assert!(c.correct_response < NUM_RESPONSES);
            let prev = mapping.insert((c.block, c.stimulus), c.correct_response);
            assert!(prev.is_none() || prev == Some(c.correct_response));
        }
    }

    #[test]
    fn block_boundaries_follow_the_pass_count() {
        let supplier = RlwmContext {
            set_sizes: vec![3],
            passes_per_block: 2,
        };
        let ctx = supplier.supply(20, &mut Prng::new(1)).unwrap();
        assert_eq!(block_change_indices(&ctx), vec![6, 12, 18]);
        // Each pass shows every stimulus once.
        let mut first: Vec<u32> = ctx[..3].iter().map(|c| c.stimulus).collect();
        first.sort_unstable();
        assert_eq!(first, vec![0, 1, 2]);
    }
}
