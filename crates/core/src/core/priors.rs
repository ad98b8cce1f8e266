//! Hyperprior and initializer distributions.
//!
//! A [`PriorSet`] is a fixed-size list of independent one-dimensional priors;
//! sampling it yields one hyperparameter vector (η), one shared-parameter
//! vector (κ), or one initial latent vector (θ_0), depending on which set the
//! task variant hands it.

use crate::error::{Result, SimError};
use crate::prng::Prng;
use rand_distr::{Beta, Distribution, Normal};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Upper bound on rejection rounds for truncated draws.
const MAX_REJECTIONS: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Prior {
    /// |N(0, scale)|: positive-only diffusion scales.
    HalfNormal { scale: f64 },
    Uniform { low: f64, high: f64 },
    Beta { a: f64, b: f64 },
    /// log(1 + exp(x)) with x ~ N(loc, scale): positive temperature-like values.
    SoftplusNormal { loc: f64, scale: f64 },
    /// N(loc, scale) restricted to [low, high].
    TruncatedNormal {
        loc: f64,
        scale: f64,
        low: f64,
        high: f64,
    },
}

impl Prior {
    pub fn validate(&self) -> Result<()> {
        let finite = |xs: &[f64]| xs.iter().all(|x| x.is_finite());
        match *self {
            Prior::HalfNormal { scale } => {
                if !finite(&[scale]) || scale < 0.0 {
                    return Err(SimError::Prior(format!(
                        "half-normal scale must be finite and >= 0 (got {scale})"
                    )));
                }
            }
            Prior::Uniform { low, high } => {
                if !finite(&[low, high]) || low >= high {
                    return Err(SimError::Prior(format!(
                        "uniform needs finite low < high (got [{low}, {high}])"
                    )));
                }
            }
            Prior::Beta { a, b } => {
                if !finite(&[a, b]) || a <= 0.0 || b <= 0.0 {
                    return Err(SimError::Prior(format!(
                        "beta shapes must be finite and > 0 (got a={a}, b={b})"
                    )));
                }
            }
            Prior::SoftplusNormal { loc, scale } => {
                if !finite(&[loc, scale]) || scale <= 0.0 {
                    return Err(SimError::Prior(format!(
                        "softplus-normal needs finite loc and scale > 0 (got {loc}, {scale})"
                    )));
                }
            }
            Prior::TruncatedNormal {
                loc,
                scale,
                low,
                high,
            } => {
                if !finite(&[loc, scale, low, high]) || scale <= 0.0 || low >= high {
                    return Err(SimError::Prior(format!(
                        "truncated normal needs scale > 0 and low < high (got loc={loc}, scale={scale}, [{low}, {high}])"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Draw one value. Assumes `validate` passed.
    pub fn sample(&self, rng: &mut Prng) -> Result<f64> {
        match *self {
            Prior::HalfNormal { scale } => {
                if scale == 0.0 {
                    return Ok(0.0);
                }
                Ok((rng.standard_normal() * scale).abs())
            }
            Prior::Uniform { low, high } => Ok(rng.gen_range_f64(low, high)),
            Prior::Beta { a, b } => {
                let dist = Beta::new(a, b).map_err(|e| SimError::Prior(e.to_string()))?;
                Ok(dist.sample(rng))
            }
            Prior::SoftplusNormal { loc, scale } => {
                let dist = Normal::new(loc, scale).map_err(|e| SimError::Prior(e.to_string()))?;
                Ok(softplus(dist.sample(rng)))
            }
            Prior::TruncatedNormal {
                loc,
                scale,
                low,
                high,
            } => {
                let dist = Normal::new(loc, scale).map_err(|e| SimError::Prior(e.to_string()))?;
                for _ in 0..MAX_REJECTIONS {
                    let x = dist.sample(rng);
                    if (low..=high).contains(&x) {
                        return Ok(x);
                    }
                }
                Err(SimError::Prior(format!(
                    "truncated normal N({loc}, {scale}) on [{low}, {high}] rejected {MAX_REJECTIONS} draws"
                )))
            }
        }
    }

    /// Closed-form mean where one is cheap to state.
    pub fn mean(&self) -> Option<f64> {
        match *self {
            Prior::HalfNormal { scale } => Some(scale * (2.0 / std::f64::consts::PI).sqrt()),
            Prior::Uniform { low, high } => Some(0.5 * (low + high)),
            Prior::Beta { a, b } => Some(a / (a + b)),
            Prior::SoftplusNormal { .. } | Prior::TruncatedNormal { .. } => None,
        }
    }
}

/// Numerically safe log(1 + exp(x)).
#[inline]
pub fn softplus(x: f64) -> f64 {
    if x > 30.0 {
        x
    } else {
        x.exp().ln_1p()
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PriorSet {
    priors: Vec<Prior>,
}

impl PriorSet {
    pub fn new(priors: Vec<Prior>) -> Result<Self> {
        if priors.is_empty() {
            return Err(SimError::Prior("prior set must not be empty".into()));
        }
        for (i, p) in priors.iter().enumerate() {
            p.validate()
                .map_err(|e| SimError::Prior(format!("component {i}: {e}")))?;
        }
        Ok(Self { priors })
    }

    pub fn len(&self) -> usize {
        self.priors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.priors.is_empty()
    }

    pub fn priors(&self) -> &[Prior] {
        &self.priors
    }

    pub fn sample(&self, rng: &mut Prng) -> Result<Vec<f64>> {
        self.priors.iter().map(|p| p.sample(rng)).collect()
    }

    /// Sample from the process-default (entropy-seeded) stream.
    pub fn sample_default(&self) -> Result<Vec<f64>> {
        self.sample(&mut Prng::from_entropy())
    }

    /// Draw a single component, e.g. to resample one latent dimension.
    pub fn sample_dim(&self, dim: usize, rng: &mut Prng) -> Result<f64> {
        let prior = self.priors.get(dim).ok_or_else(|| {
            SimError::config(format!(
                "prior dimension {dim} out of range ({} priors)",
                self.priors.len()
            ))
        })?;
        prior.sample(rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_priors_fail_fast() {
        assert!(Prior::HalfNormal { scale: -1.0 }.validate().is_err());
        assert!(Prior::Uniform { low: 1.0, high: 1.0 }.validate().is_err());
        assert!(Prior::Beta { a: 0.0, b: 2.0 }.validate().is_err());
        assert!(Prior::SoftplusNormal {
            loc: 1.0,
            scale: f64::NAN
        }
        .validate()
        .is_err());
        assert!(PriorSet::new(vec![]).is_err());
        assert!(PriorSet::new(vec![
            Prior::Beta { a: 1.5, b: 2.0 },
            Prior::TruncatedNormal {
                loc: 1.0,
                scale: 5.0,
                low: 15.0,
                high: 0.0,
            },
        ])
        .is_err());
    }

    #[test]
    fn draws_respect_support() {
        let set = PriorSet::new(vec![
            Prior::HalfNormal { scale: 0.5 },
            Prior::Uniform {
                low: 0.0,
                high: 0.04,
            },
            Prior::Beta { a: 1.5, b: 2.0 },
            Prior::SoftplusNormal {
                loc: 1.0,
                scale: 30.0,
            },
            Prior::TruncatedNormal {
                loc: 1.0,
                scale: 5.0,
                low: 0.0,
                high: 15.0,
            },
        ])
        .unwrap();
        let mut rng = Prng::new(11);
        for _ in 0..2_000 {
            let v = set.sample(&mut rng).unwrap();
            assert_eq!(v.len(), 5);
            assert!(v[0] >= 0.0);
            assert!((0.0..0.04).contains(&v[1]));
            assert!((0.0..=1.0).contains(&v[2]));
            assert!(v[3] > 0.0);
            assert!((0.0..=15.0).contains(&v[4]));
        }
    }

    #[test]
    fn beta_sample_mean_is_close() {
        let prior = Prior::Beta { a: 1.5, b: 2.0 };
        let mut rng = Prng::new(5);
        let n = 20_000;
        let mean = (0..n).map(|_| prior.sample(&mut rng).unwrap()).sum::<f64>() / n as f64;
        let expected = prior.mean().unwrap();
        assert!((mean - expected).abs() < 0.01, "mean {mean} vs {expected}");
    }

    #[test]
    fn softplus_is_positive_and_linear_in_the_tail() {
        assert!(softplus(-50.0) > 0.0);
        assert_eq!(softplus(100.0), 100.0);
        assert!((softplus(0.0) - 2f64.ln()).abs() < 1e-12);
    }
}
