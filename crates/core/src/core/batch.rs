//! Batch orchestration: independent subjects assembled into fixed-shape arrays.

use crate::context::{block_change_indices, validate_context, ContextSupplier, TrialContext};
use crate::error::{Result, SimError};
use crate::prng::Prng;
use crate::simulator::{simulate, TrialOutput};
use crate::trajectory::Trajectory;
use crate::variant::{TaskVariant, TrajectoryReset};

#[cfg(feature = "parallel")]
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How subjects with different trial counts share one time axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum LengthPolicy {
    /// Zero-pad to the longest subject and mark real trials in `mask`.
    #[default]
    Pad,
    /// Cut every subject to the shortest.
    Truncate,
}

/// Dense row-major f32 array.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchArray {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl BatchArray {
    /// Number of elements `shape` describes; errors on overflow.
    pub fn element_count(shape: &[usize]) -> Result<usize> {
        shape
            .iter()
            .try_fold(1usize, |acc, &n| acc.checked_mul(n))
            .ok_or_else(|| SimError::config(format!("shape {shape:?} overflows")))
    }

    pub fn zeros(shape: Vec<usize>) -> Result<Self> {
        let len = Self::element_count(&shape)?;
        Ok(Self {
            shape,
            data: vec![0.0; len],
        })
    }

    pub fn from_parts(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let len = Self::element_count(&shape)?;
        if len != data.len() {
            return Err(SimError::config(format!(
                "shape {shape:?} needs {len} values, got {}",
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Flat offset of a full index.
    pub fn offset(&self, index: &[usize]) -> usize {
        index
            .iter()
            .zip(&self.shape)
            .fold(0, |acc, (&i, &n)| acc * n + i)
    }

    pub fn get(&self, index: &[usize]) -> f32 {
        self.data[self.offset(index)]
    }
}

/// Keyed outputs of one simulated batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub variant: String,
    /// Length of the shared time axis.
    pub num_steps: usize,
    /// Trial count each subject was simulated with.
    pub subject_steps: Vec<usize>,
    /// `[B, T, 2]`: (action, outcome).
    pub sim_data: BatchArray,
    /// `[B, T, D]`: the θ trajectory.
    pub local_parameters: BatchArray,
    /// `[B, H]`: the hyperparameters η.
    pub global_parameters: BatchArray,
    /// `[B, S]`, for variants with shared parameters.
    pub shared_parameters: Option<BatchArray>,
    /// `[B, T, C]`.
    pub batchable_context: BatchArray,
    /// `[B, T]`: 1 for simulated trials, 0 for padding.
    pub mask: BatchArray,
}

impl Batch {
    pub const FIELD_NAMES: &'static [&'static str] = &[
        "sim_data",
        "local_parameters",
        "global_parameters",
        "shared_parameters",
        "batchable_context",
        "mask",
    ];

    pub fn batch_size(&self) -> usize {
        self.subject_steps.len()
    }

    /// Look an array up by its output key.
    pub fn field(&self, name: &str) -> Option<&BatchArray> {
        match name {
            "sim_data" => Some(&self.sim_data),
            "local_parameters" => Some(&self.local_parameters),
            "global_parameters" | "hyper_parameters" => Some(&self.global_parameters),
            "shared_parameters" => self.shared_parameters.as_ref(),
            "batchable_context" => Some(&self.batchable_context),
            "mask" => Some(&self.mask),
            _ => None,
        }
    }
}

/// Everything one subject produced.
#[derive(Debug, Clone)]
pub struct SubjectRecord {
    pub hyper: Vec<f64>,
    pub shared: Vec<f64>,
    pub trajectory: Trajectory,
    pub contexts: Vec<TrialContext>,
    pub outputs: Vec<TrialOutput>,
}

impl SubjectRecord {
    pub fn num_steps(&self) -> usize {
        self.outputs.len()
    }
}

/// Simulate one subject from its own stream.
///
/// `num_steps` overrides the variant's trial count when the count is shared
/// across the batch.
pub fn simulate_subject(
    variant: &TaskVariant,
    supplier: &dyn ContextSupplier,
    num_steps: Option<usize>,
    rng: &mut Prng,
) -> Result<SubjectRecord> {
    let hyper = variant.hyper_prior.sample(rng)?;
    let shared = match &variant.shared_prior {
        Some(prior) => prior.sample(rng)?,
        None => Vec::new(),
    };
    let num_steps = num_steps.unwrap_or_else(|| variant.trial_count.sample(rng));

    let contexts = supplier.supply(num_steps, rng)?;
    validate_context(variant, &contexts, num_steps)?;

    let resets = match variant.trajectory_reset {
        TrajectoryReset::None => Vec::new(),
        TrajectoryReset::OnBlockChange => block_change_indices(&contexts),
    };
    let trajectory = variant
        .trajectory_generator()?
        .generate(&hyper, num_steps, &resets, rng)?;

    let outputs = simulate(variant, &trajectory, &shared, &contexts, rng)?;
    Ok(SubjectRecord {
        hyper,
        shared,
        trajectory,
        contexts,
        outputs,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOrchestrator {
    pub batch_size: usize,
    pub length_policy: LengthPolicy,
    /// Dispatch subjects to rayon workers (needs the `parallel` feature).
    pub parallel: bool,
}

impl BatchOrchestrator {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            length_policy: LengthPolicy::default(),
            parallel: false,
        }
    }

    pub fn with_length_policy(mut self, policy: LengthPolicy) -> Self {
        self.length_policy = policy;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn simulate_batch(
        &self,
        variant: &TaskVariant,
        supplier: &dyn ContextSupplier,
        batch_seed: u64,
    ) -> Result<Batch> {
        let records = self.simulate_subjects(variant, supplier, batch_seed)?;
        self.assemble(variant, &records)
    }

    /// Run every subject of the batch. Subject i draws from stream i + 1, so
    /// the result is the same whichever thread runs it.
    pub fn simulate_subjects(
        &self,
        variant: &TaskVariant,
        supplier: &dyn ContextSupplier,
        batch_seed: u64,
    ) -> Result<Vec<SubjectRecord>> {
        if self.batch_size < 1 {
            return Err(SimError::config("batch size must be >= 1"));
        }
        variant.validate()?;

        let shared_steps = variant
            .trial_count
            .is_shared()
            .then(|| variant.trial_count.sample(&mut Prng::for_stream(batch_seed, 0)));

        let run = |i: usize| {
            let mut rng = Prng::for_stream(batch_seed, i as u64 + 1);
            simulate_subject(variant, supplier, shared_steps, &mut rng)
        };

        #[cfg(feature = "parallel")]
        if self.parallel {
            return (0..self.batch_size).into_par_iter().map(run).collect();
        }
        (0..self.batch_size).map(run).collect()
    }

    /// Stack subject records into the batch arrays.
    pub fn assemble(&self, variant: &TaskVariant, records: &[SubjectRecord]) -> Result<Batch> {
        let b = records.len();
        if b == 0 {
            return Err(SimError::config("cannot assemble an empty batch"));
        }
        for (i, rec) in records.iter().enumerate() {
            check_record(variant, i, rec)?;
        }
        let subject_steps: Vec<usize> = records.iter().map(SubjectRecord::num_steps).collect();
        let longest = subject_steps.iter().copied().max().unwrap_or(0);
        let shortest = subject_steps.iter().copied().min().unwrap_or(0);
        let t_len = match self.length_policy {
            LengthPolicy::Pad => longest,
            LengthPolicy::Truncate => shortest,
        };
        if longest != shortest {
            tracing::warn!(
                variant = variant.name,
                shortest,
                longest,
                policy = ?self.length_policy,
                "subjects differ in trial count"
            );
        }

        let d = variant.dims();
        let h = variant.hyper_prior.len();
        let s = variant.shared_len();
        let c = variant.context_columns.len();

        let mut sim_data = BatchArray::zeros(vec![b, t_len, 2])?;
        let mut local = BatchArray::zeros(vec![b, t_len, d])?;
        let mut global = BatchArray::zeros(vec![b, h])?;
        let mut shared = if s > 0 {
            Some(BatchArray::zeros(vec![b, s])?)
        } else {
            None
        };
        let mut context = BatchArray::zeros(vec![b, t_len, c])?;
        let mut mask = BatchArray::zeros(vec![b, t_len])?;

        for (i, rec) in records.iter().enumerate() {
            for (j, &x) in rec.hyper.iter().enumerate() {
                global.data[i * h + j] = x as f32;
            }
            if let Some(shared) = shared.as_mut() {
                for (j, &x) in rec.shared.iter().enumerate() {
                    shared.data[i * s + j] = x as f32;
                }
            }
            for t in 0..rec.num_steps().min(t_len) {
                let out = &rec.outputs[t];
                let row = i * t_len + t;
                sim_data.data[row * 2] = out.action as f32;
                sim_data.data[row * 2 + 1] = out.outcome;
                local.data[row * d..(row + 1) * d].copy_from_slice(rec.trajectory.row(t));
                context.data[row * c..(row + 1) * c]
                    .copy_from_slice(&rec.contexts[t].columns(variant));
                mask.data[row] = 1.0;
            }
        }

        tracing::debug!(
            variant = variant.name,
            batch_size = b,
            num_steps = t_len,
            dims = d,
            context_columns = c,
            "assembled batch"
        );

        Ok(Batch {
            variant: variant.name.to_string(),
            num_steps: t_len,
            subject_steps,
            sim_data,
            local_parameters: local,
            global_parameters: global,
            shared_parameters: shared,
            batchable_context: context,
            mask,
        })
    }
}

fn check_record(variant: &TaskVariant, i: usize, rec: &SubjectRecord) -> Result<()> {
    let steps = rec.num_steps();
    let problem = if rec.hyper.len() != variant.hyper_prior.len() {
        Some(format!(
            "{} hyperparameters, variant has {}",
            rec.hyper.len(),
            variant.hyper_prior.len()
        ))
    } else if rec.shared.len() != variant.shared_len() {
        Some(format!(
            "{} shared parameters, variant has {}",
            rec.shared.len(),
            variant.shared_len()
        ))
    } else if rec.trajectory.dims() != variant.dims() {
        Some(format!(
            "trajectory has {} dimensions, variant has {}",
            rec.trajectory.dims(),
            variant.dims()
        ))
    } else if rec.trajectory.num_steps() < steps || rec.contexts.len() < steps {
        Some(format!(
            "{steps} outputs but {} trajectory steps and {} context trials",
            rec.trajectory.num_steps(),
            rec.contexts.len()
        ))
    } else {
        None
    };
    match problem {
        Some(msg) => Err(SimError::config(format!("subject {i}: {msg}"))),
        None => Ok(()),
    }
}
