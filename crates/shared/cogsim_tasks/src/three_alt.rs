use cogsim::context::{ContextSupplier, TrialContext};
use cogsim::error::{Result, SimError};
use cogsim::prng::Prng;

// ─────────────────────────────────────────────────────────────────────────
// Three-alternative full feedback: four conditions, each offering three
// options with their own mean payoff. Trials of all conditions are shuffled
// together; every option's payoff is shown after the choice.
// ─────────────────────────────────────────────────────────────────────────

pub const PAYOFF_SCALE: f32 = 30.0;

pub const CONDITION_MEANS: [[f32; 3]; 4] = [
    [30.0, 34.0, 38.0],
    [30.0, 38.0, 46.0],
    [42.0, 46.0, 50.0],
    [34.0, 42.0, 50.0],
];

#[derive(Debug, Clone, PartialEq)]
pub struct ThreeAltContext {
    pub means: Vec<[f32; 3]>,
    pub noise_sd: f32,
}

impl Default for ThreeAltContext {
    fn default() -> Self {
        Self {
            means: CONDITION_MEANS.to_vec(),
            noise_sd: 5.0,
        }
    }
}

impl ContextSupplier for ThreeAltContext {
    fn name(&self) -> &str {
        "three_alt"
    }

    fn supply(&self, num_steps: usize, rng: &mut Prng) -> Result<Vec<TrialContext>> {
        let conditions = self.means.len();
        if conditions == 0 {
            return Err(SimError::Config("three-alt schedule has no conditions".into()));
        }

        // Conditions get equal shares; the first `num_steps % conditions` one extra.
        let mut out = Vec::with_capacity(num_steps);
        for (c, means) in self.means.iter().enumerate() {
            let n = num_steps / conditions + usize::from(c < num_steps % conditions);
            for _ in 0..n {
                let feedback = means
                    .iter()
                    .map(|&m| {
                        let points = m + self.noise_sd * rng.standard_normal() as f32;
                        // Payoffs are whole points.
                        points.trunc() / PAYOFF_SCALE
                    })
                    .collect();
                out.push(TrialContext {
                    condition: c as u32,
                    feedback,
                    ..Default::default()
                });
            }
        }
        rng.shuffle(&mut out);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conditions_are_balanced() {
        let ctx = ThreeAltContext::default()
            .supply(200, &mut Prng::new(3))
            .unwrap();
        let mut counts = [0usize; 4];
        for c in &ctx {
            counts[c.condition as usize] += 1;
            assert_eq!(c.feedback.len(), 3);
        }
        assert_eq!(counts, [50, 50, 50, 50]);

        let ctx = ThreeAltContext::default()
            .supply(7, &mut Prng::new(3))
            .unwrap();
        assert_eq!(ctx.len(), 7);
    }

    #[test]
    fn payoffs_are_whole_points() {
        let ctx = ThreeAltContext::default()
            .supply(40, &mut Prng::new(8))
            .unwrap();
        for c in &ctx {
            for &f in &c.feedback {
                let points = f * PAYOFF_SCALE;
                assert!((points - points.round()).abs() < 1e-3);
            }
        }
    }
}
