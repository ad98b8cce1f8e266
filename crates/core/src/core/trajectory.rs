//! Bounded stochastic walks for time-varying latent parameters.
//!
//! Three behaviors combine per step and per dimension:
//! - diffusion: θ_t = clip(θ_{t-1} + η ⊙ z_t, low, high)
//! - regime switching: with probability q the dimension forgets its history
//!   and is redrawn from the baseline distribution
//! - scheduled resets: declared indices always redraw
//!
//! Clipping happens in the f32 output precision against limits rounded toward
//! the interior, so a stored value never lands outside `[low, high]` even when
//! a bound has no exact f32 form. The clipped f32 value is both the step's
//! output and the basis of the next step.

use crate::error::{Result, SimError};
use crate::priors::PriorSet;
use crate::prng::Prng;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Per-dimension [low, high] limits.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Bounds {
    low: Vec<f64>,
    high: Vec<f64>,
}

impl Bounds {
    pub fn new(low: Vec<f64>, high: Vec<f64>) -> Result<Self> {
        if low.is_empty() {
            return Err(SimError::config("bounds must have at least one dimension"));
        }
        if low.len() != high.len() {
            return Err(SimError::config(format!(
                "bounds dimension mismatch: {} low vs {} high",
                low.len(),
                high.len()
            )));
        }
        for (d, (&lo, &hi)) in low.iter().zip(high.iter()).enumerate() {
            if !lo.is_finite() || !hi.is_finite() || lo > hi {
                return Err(SimError::config(format!(
                    "malformed bounds for dimension {d}: [{lo}, {hi}]"
                )));
            }
        }
        let bounds = Self { low, high };
        bounds.check_f32_limits()?;
        Ok(bounds)
    }

    /// Errors when some dimension's interval holds no f32 value.
    pub(crate) fn check_f32_limits(&self) -> Result<()> {
        for d in 0..self.dims() {
            let (lo, hi) = self.f32_limits(d);
            if lo > hi {
                return Err(SimError::config(format!(
                    "bounds for dimension {d} ([{}, {}]) contain no f32 value",
                    self.low[d], self.high[d]
                )));
            }
        }
        Ok(())
    }

    pub fn dims(&self) -> usize {
        self.low.len()
    }

    pub fn low(&self) -> &[f64] {
        &self.low
    }

    pub fn high(&self) -> &[f64] {
        &self.high
    }

    /// Largest f32 interval inside `[low, high]` for `dim`.
    pub fn f32_limits(&self, dim: usize) -> (f32, f32) {
        let mut lo = self.low[dim] as f32;
        if (lo as f64) < self.low[dim] {
            lo = next_up(lo);
        }
        let mut hi = self.high[dim] as f32;
        if (hi as f64) > self.high[dim] {
            hi = next_down(hi);
        }
        (lo, hi)
    }

    /// Clip into bounds and round to f32 without leaving them.
    #[inline]
    pub fn clip_f32(&self, dim: usize, x: f64) -> f32 {
        let (lo, hi) = self.f32_limits(dim);
        (x as f32).clamp(lo, hi)
    }

    #[inline]
    pub fn contains(&self, dim: usize, x: f64) -> bool {
        x >= self.low[dim] && x <= self.high[dim]
    }
}

fn next_up(x: f32) -> f32 {
    if x.is_nan() || x == f32::INFINITY {
        return x;
    }
    if x == 0.0 {
        return f32::from_bits(1);
    }
    let bits = x.to_bits();
    if x > 0.0 {
        f32::from_bits(bits + 1)
    } else {
        f32::from_bits(bits - 1)
    }
}

fn next_down(x: f32) -> f32 {
    -next_up(-x)
}

/// Where a switching dimension draws its fresh value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Resample {
    /// The baseline initializer distribution of that dimension.
    Initializer,
    /// Uniform over the dimension's bounds.
    UniformBounds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum WalkKind {
    /// Hyperparameters: one diffusion scale per dimension.
    Diffusion,
    /// Hyperparameters: D diffusion scales followed by D switch probabilities.
    RegimeSwitching { resample: Resample },
}

impl WalkKind {
    pub fn hyper_len(&self, dims: usize) -> usize {
        match self {
            WalkKind::Diffusion => dims,
            WalkKind::RegimeSwitching { .. } => 2 * dims,
        }
    }
}

/// Row-major `[num_steps, dims]` latent path in reduced precision.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    num_steps: usize,
    dims: usize,
    values: Vec<f32>,
}

impl Trajectory {
    pub fn from_values(num_steps: usize, dims: usize, values: Vec<f32>) -> Result<Self> {
        if num_steps == 0 || dims == 0 || values.len() != num_steps * dims {
            return Err(SimError::config(format!(
                "trajectory of {} values cannot be shaped [{num_steps}, {dims}]",
                values.len()
            )));
        }
        Ok(Self {
            num_steps,
            dims,
            values,
        })
    }

    pub fn num_steps(&self) -> usize {
        self.num_steps
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    #[inline]
    pub fn row(&self, t: usize) -> &[f32] {
        &self.values[t * self.dims..(t + 1) * self.dims]
    }

    pub fn column(&self, dim: usize) -> Vec<f32> {
        (0..self.num_steps)
            .map(|t| self.values[t * self.dims + dim])
            .collect()
    }
}

/// Counts of what each dimension did across steps 1..T.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub diffused: Vec<usize>,
    pub resampled: Vec<usize>,
    pub scheduled_resets: usize,
}

#[derive(Debug, Clone)]
pub struct TrajectoryGenerator {
    kind: WalkKind,
    bounds: Bounds,
    initializer: PriorSet,
}

impl TrajectoryGenerator {
    pub fn new(kind: WalkKind, bounds: Bounds, initializer: PriorSet) -> Result<Self> {
        if initializer.len() != bounds.dims() {
            return Err(SimError::config(format!(
                "initializer has {} components but bounds have {} dimensions",
                initializer.len(),
                bounds.dims()
            )));
        }
        bounds.check_f32_limits()?;
        Ok(Self {
            kind,
            bounds,
            initializer,
        })
    }

    pub fn kind(&self) -> WalkKind {
        self.kind
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn dims(&self) -> usize {
        self.bounds.dims()
    }

    pub fn generate(
        &self,
        hyper: &[f64],
        num_steps: usize,
        resets: &[usize],
        rng: &mut Prng,
    ) -> Result<Trajectory> {
        self.generate_with_stats(hyper, num_steps, resets, rng)
            .map(|(traj, _)| traj)
    }

    pub fn generate_with_stats(
        &self,
        hyper: &[f64],
        num_steps: usize,
        resets: &[usize],
        rng: &mut Prng,
    ) -> Result<(Trajectory, WalkStats)> {
        let dims = self.dims();
        self.check_inputs(hyper, num_steps, resets)?;

        let scales = &hyper[..dims];
        let stay_prob: Vec<f64> = match self.kind {
            WalkKind::Diffusion => vec![1.0; dims],
            WalkKind::RegimeSwitching { .. } => hyper[dims..].iter().map(|q| 1.0 - q).collect(),
        };

        let mut is_reset = vec![false; num_steps];
        for &t in resets {
            is_reset[t] = true;
        }

        let mut stats = WalkStats {
            diffused: vec![0; dims],
            resampled: vec![0; dims],
            scheduled_resets: 0,
        };

        let mut values = Vec::with_capacity(num_steps * dims);
        let mut current = self.initializer.sample(rng)?;
        for (d, x) in current.iter_mut().enumerate() {
            let clipped = self.bounds.clip_f32(d, *x);
            values.push(clipped);
            *x = clipped as f64;
        }

        for &reset in is_reset.iter().skip(1) {
            if reset {
                stats.scheduled_resets += 1;
            }
            for d in 0..dims {
                let next = if reset {
                    self.initializer.sample_dim(d, rng)?
                } else if stay_prob[d] >= 1.0 || rng.chance(stay_prob[d]) {
                    stats.diffused[d] += 1;
                    current[d] + scales[d] * rng.standard_normal()
                } else {
                    stats.resampled[d] += 1;
                    self.resample(d, rng)?
                };
                let clipped = self.bounds.clip_f32(d, next);
                values.push(clipped);
                current[d] = clipped as f64;
            }
        }

        let traj = Trajectory::from_values(num_steps, dims, values)?;
        Ok((traj, stats))
    }

    fn resample(&self, dim: usize, rng: &mut Prng) -> Result<f64> {
        match self.kind {
            WalkKind::RegimeSwitching {
                resample: Resample::UniformBounds,
            } => Ok(rng.gen_range_f64(self.bounds.low[dim], self.bounds.high[dim])),
            _ => self.initializer.sample_dim(dim, rng),
        }
    }

    fn check_inputs(&self, hyper: &[f64], num_steps: usize, resets: &[usize]) -> Result<()> {
        let dims = self.dims();
        if num_steps < 1 {
            return Err(SimError::config("trajectory needs at least one step"));
        }
        let expected = self.kind.hyper_len(dims);
        if hyper.len() != expected {
            return Err(SimError::config(format!(
                "{:?} walk over {dims} dimensions needs {expected} hyperparameters, got {}",
                self.kind,
                hyper.len()
            )));
        }
        if let Some(s) = hyper[..dims].iter().find(|s| !s.is_finite() || **s < 0.0) {
            return Err(SimError::config(format!(
                "diffusion scale must be finite and >= 0 (got {s})"
            )));
        }
        if let Some(q) = hyper[dims..].iter().find(|q| !(0.0..=1.0).contains(*q)) {
            return Err(SimError::config(format!(
                "switch probability must lie in [0, 1] (got {q})"
            )));
        }
        if let Some(t) = resets.iter().find(|&&t| t >= num_steps) {
            return Err(SimError::config(format!(
                "reset index {t} beyond {num_steps} steps"
            )));
        }
        Ok(())
    }
}
