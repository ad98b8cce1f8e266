//! Task-variant descriptors.
//!
//! A [`TaskVariant`] captures everything that distinguishes one sequential
//! choice task from another: latent dimensionality and bounds, prior
//! constants, walk dynamics, how value tables are shaped and reset, how the
//! valid alternatives of a trial are chosen, how outcomes are resolved, and the
//! learning/blending rules. One engine ([`crate::simulator`]) runs all of them.

use crate::error::{Result, SimError};
use crate::priors::{Prior, PriorSet};
use crate::prng::Prng;
use crate::trajectory::{Bounds, Resample, TrajectoryGenerator, WalkKind};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TrajectoryReset {
    None,
    /// Redraw every latent dimension whenever block id or set size changes.
    OnBlockChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TrialCount {
    Fixed(usize),
    /// Uniform integer in [min, max]. `shared` draws one count per batch
    /// instead of one per subject.
    Range { min: usize, max: usize, shared: bool },
}

impl TrialCount {
    pub fn validate(&self) -> Result<()> {
        match *self {
            TrialCount::Fixed(n) if n < 1 => Err(SimError::config("trial count must be >= 1")),
            TrialCount::Range { min, max, .. } if min < 1 || min > max => Err(SimError::config(
                format!("trial count range [{min}, {max}] is malformed"),
            )),
            _ => Ok(()),
        }
    }

    pub fn sample(&self, rng: &mut Prng) -> usize {
        match *self {
            TrialCount::Fixed(n) => n,
            TrialCount::Range { min, max, .. } => rng.gen_range_usize(min, max + 1),
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, TrialCount::Range { shared: true, .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TableShape {
    /// One row of `len` values; the stimulus is ignored.
    Flat { len: usize },
    /// One row per stimulus (row count = current set size), `alternatives` columns.
    PerStimulus { alternatives: usize },
}

impl TableShape {
    pub fn cols(&self) -> usize {
        match *self {
            TableShape::Flat { len } => len,
            TableShape::PerStimulus { alternatives } => alternatives,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Baseline {
    Constant(f64),
    /// 1 / number of columns.
    Uniform,
}

impl Baseline {
    pub fn value(&self, cols: usize) -> f64 {
        match *self {
            Baseline::Constant(v) => v,
            Baseline::Uniform => 1.0 / cols as f64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ValueReset {
    /// Initialized once at subject start.
    Never,
    /// Reset at every multiple of k (block boundaries at fixed trial indices).
    Every(usize),
    /// Reset when the context changes block id or set size.
    OnBlockChange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AlternativeRule {
    /// Table columns 0..n are always available.
    Fixed(usize),
    /// Condition code c selects subset `subsets[c]`.
    ByCondition(Vec<Vec<u32>>),
    /// The context lists `count` available table columns.
    FromContext { count: usize },
}

impl AlternativeRule {
    /// Size of the valid subset on every trial.
    pub fn subset_len(&self) -> usize {
        match self {
            AlternativeRule::Fixed(n) => *n,
            AlternativeRule::ByCondition(subsets) => subsets.first().map_or(0, Vec::len),
            AlternativeRule::FromContext { count } => *count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Temperature {
    /// Index into θ_t.
    Param(usize),
    Fixed(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LearningRule {
    /// Delta rule on the chosen alternative, rate θ_t[rate].
    Chosen { rate: usize },
    /// Chosen alternative at θ_t[chosen]; every other shown alternative moves
    /// toward its own observed outcome at θ_t[unchosen].
    FullFeedback { chosen: usize, unchosen: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FeedbackRule {
    /// Outcome ~ Bernoulli(feedback[slot]).
    Bernoulli,
    /// Outcome = 1 if the chosen alternative equals the correct response.
    MatchCorrect,
    /// Outcome = feedback[slot], continuous.
    Observed,
}

/// Capacity-limited working-memory blend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WorkingMemory {
    /// θ_t index of the working-memory reliance.
    pub weight: usize,
    /// Shared-parameter index of the decay rate φ.
    pub decay: usize,
    /// Shared-parameter index of the capacity c.
    pub capacity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ActionCoding {
    /// Position of the chosen alternative inside the valid subset.
    Slot,
    /// Table column of the chosen alternative.
    Alternative,
}

/// One column of `batchable_context`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ContextColumn {
    Stimulus,
    CorrectResponse,
    Block,
    SetSize,
    Condition,
    Alternative(usize),
    Feedback(usize),
}

#[derive(Debug, Clone)]
pub struct TaskVariant {
    pub name: &'static str,
    pub param_names: Vec<&'static str>,
    pub bounds: Bounds,
    pub hyper_prior: PriorSet,
    pub initial_prior: PriorSet,
    pub shared_prior: Option<PriorSet>,
    pub walk: WalkKind,
    pub trajectory_reset: TrajectoryReset,
    pub trial_count: TrialCount,
    pub table: TableShape,
    pub baseline: Baseline,
    pub value_reset: ValueReset,
    pub alternatives: AlternativeRule,
    pub temperature: Temperature,
    pub learning: LearningRule,
    pub feedback: FeedbackRule,
    pub working_memory: Option<WorkingMemory>,
    pub action_coding: ActionCoding,
    pub context_columns: Vec<ContextColumn>,
}

const BUILTIN_NAMES: [&str; 4] = [
    "reversal_learning",
    "paired_choice",
    "three_alt_full_feedback",
    "rlwm",
];

impl TaskVariant {
    pub fn builtin_names() -> &'static [&'static str] {
        &BUILTIN_NAMES
    }

    pub fn by_name(name: &str) -> Result<Self> {
        match name {
            "reversal_learning" => Self::reversal_learning(),
            "paired_choice" => Self::paired_choice(),
            "three_alt_full_feedback" => Self::three_alt_full_feedback(),
            "rlwm" => Self::rlwm(),
            other => Err(SimError::config(format!(
                "unknown task variant '{other}' (known: {})",
                BUILTIN_NAMES.join(", ")
            ))),
        }
    }

    /// Two-armed reversal learning with a regime-switching walk over
    /// [learning rate, inverse temperature].
    pub fn reversal_learning() -> Result<Self> {
        let tau_max = 15.0;
        let v = Self {
            name: "reversal_learning",
            param_names: vec!["alpha", "tau"],
            bounds: Bounds::new(vec![0.0, 0.0], vec![1.0, tau_max])?,
            hyper_prior: PriorSet::new(vec![
                Prior::HalfNormal { scale: 0.02 },
                Prior::HalfNormal { scale: 0.5 },
                Prior::Uniform {
                    low: 0.0,
                    high: 0.04,
                },
                Prior::Uniform {
                    low: 0.0,
                    high: 0.04,
                },
            ])?,
            initial_prior: PriorSet::new(vec![
                Prior::Beta { a: 1.5, b: 2.0 },
                Prior::TruncatedNormal {
                    loc: 1.0,
                    scale: 5.0,
                    low: 0.0,
                    high: tau_max,
                },
            ])?,
            shared_prior: None,
            walk: WalkKind::RegimeSwitching {
                resample: Resample::Initializer,
            },
            trajectory_reset: TrajectoryReset::None,
            trial_count: TrialCount::Fixed(512),
            table: TableShape::Flat { len: 4 },
            baseline: Baseline::Constant(0.5),
            value_reset: ValueReset::Every(128),
            alternatives: AlternativeRule::ByCondition(vec![vec![0, 1], vec![2, 3]]),
            temperature: Temperature::Param(1),
            learning: LearningRule::Chosen { rate: 0 },
            feedback: FeedbackRule::Bernoulli,
            working_memory: None,
            action_coding: ActionCoding::Slot,
            context_columns: vec![
                ContextColumn::Condition,
                ContextColumn::Feedback(0),
                ContextColumn::Feedback(1),
            ],
        };
        v.validate()?;
        Ok(v)
    }

    /// Two of four options shown per trial, both outcomes observed and both
    /// values updated at the same rate.
    pub fn paired_choice() -> Result<Self> {
        let v = Self {
            name: "paired_choice",
            param_names: vec!["alpha", "tau"],
            bounds: Bounds::new(vec![0.0, 0.0], vec![1.0, 80.0])?,
            hyper_prior: PriorSet::new(vec![
                Prior::HalfNormal { scale: 0.05 },
                Prior::HalfNormal { scale: 3.0 },
            ])?,
            initial_prior: PriorSet::new(vec![
                Prior::Uniform { low: 0.0, high: 1.0 },
                Prior::SoftplusNormal {
                    loc: 1.0,
                    scale: 30.0,
                },
            ])?,
            shared_prior: None,
            walk: WalkKind::Diffusion,
            trajectory_reset: TrajectoryReset::None,
            trial_count: TrialCount::Fixed(80),
            table: TableShape::Flat { len: 4 },
            baseline: Baseline::Constant(27.5 / 60.0),
            value_reset: ValueReset::Never,
            alternatives: AlternativeRule::FromContext { count: 2 },
            temperature: Temperature::Param(1),
            learning: LearningRule::FullFeedback {
                chosen: 0,
                unchosen: 0,
            },
            feedback: FeedbackRule::Observed,
            working_memory: None,
            action_coding: ActionCoding::Alternative,
            context_columns: vec![
                ContextColumn::Feedback(0),
                ContextColumn::Feedback(1),
                ContextColumn::Alternative(0),
                ContextColumn::Alternative(1),
            ],
        };
        v.validate()?;
        Ok(v)
    }

    /// Three of six options per trial selected by a condition code, full
    /// feedback with separate chosen/unchosen learning rates.
    pub fn three_alt_full_feedback() -> Result<Self> {
        let v = Self {
            name: "three_alt_full_feedback",
            param_names: vec!["alpha_chosen", "alpha_unchosen", "tau"],
            bounds: Bounds::new(vec![0.0, 0.0, 0.0], vec![1.0, 1.0, 80.0])?,
            hyper_prior: PriorSet::new(vec![
                Prior::HalfNormal { scale: 0.02 },
                Prior::HalfNormal { scale: 0.02 },
                Prior::HalfNormal { scale: 1.0 },
            ])?,
            initial_prior: PriorSet::new(vec![
                Prior::Beta { a: 1.5, b: 2.0 },
                Prior::Beta { a: 1.5, b: 2.0 },
                Prior::SoftplusNormal {
                    loc: 1.0,
                    scale: 30.0,
                },
            ])?,
            shared_prior: None,
            walk: WalkKind::Diffusion,
            trajectory_reset: TrajectoryReset::None,
            trial_count: TrialCount::Fixed(200),
            table: TableShape::Flat { len: 6 },
            baseline: Baseline::Constant(0.5),
            value_reset: ValueReset::Never,
            alternatives: AlternativeRule::ByCondition(vec![
                vec![0, 1, 2],
                vec![0, 2, 4],
                vec![3, 4, 5],
                vec![1, 3, 5],
            ]),
            temperature: Temperature::Param(2),
            learning: LearningRule::FullFeedback {
                chosen: 0,
                unchosen: 1,
            },
            feedback: FeedbackRule::Observed,
            working_memory: None,
            action_coding: ActionCoding::Slot,
            context_columns: vec![
                ContextColumn::Feedback(0),
                ContextColumn::Feedback(1),
                ContextColumn::Feedback(2),
                ContextColumn::Condition,
            ],
        };
        v.validate()?;
        Ok(v)
    }

    /// Reinforcement learning blended with a decaying, capacity-limited
    /// working memory over stimulus-response tables.
    pub fn rlwm() -> Result<Self> {
        let v = Self {
            name: "rlwm",
            param_names: vec!["alpha", "wm_weight"],
            bounds: Bounds::new(vec![0.0, 0.0], vec![1.0, 1.0])?,
            hyper_prior: PriorSet::new(vec![
                Prior::HalfNormal { scale: 0.05 },
                Prior::HalfNormal { scale: 0.05 },
            ])?,
            initial_prior: PriorSet::new(vec![
                Prior::Uniform { low: 0.0, high: 1.0 },
                Prior::Uniform { low: 0.0, high: 1.0 },
            ])?,
            shared_prior: Some(PriorSet::new(vec![
                Prior::Uniform { low: 0.0, high: 1.0 },
                Prior::Uniform { low: 3.0, high: 6.5 },
            ])?),
            walk: WalkKind::Diffusion,
            trajectory_reset: TrajectoryReset::OnBlockChange,
            trial_count: TrialCount::Range {
                min: 600,
                max: 780,
                shared: true,
            },
            table: TableShape::PerStimulus { alternatives: 3 },
            baseline: Baseline::Uniform,
            value_reset: ValueReset::OnBlockChange,
            alternatives: AlternativeRule::Fixed(3),
            temperature: Temperature::Fixed(10.0),
            learning: LearningRule::Chosen { rate: 0 },
            feedback: FeedbackRule::MatchCorrect,
            working_memory: Some(WorkingMemory {
                weight: 1,
                decay: 0,
                capacity: 1,
            }),
            action_coding: ActionCoding::Alternative,
            context_columns: vec![
                ContextColumn::Stimulus,
                ContextColumn::CorrectResponse,
                ContextColumn::Block,
                ContextColumn::SetSize,
            ],
        };
        v.validate()?;
        Ok(v)
    }

    pub fn dims(&self) -> usize {
        self.bounds.dims()
    }

    pub fn shared_len(&self) -> usize {
        self.shared_prior.as_ref().map_or(0, PriorSet::len)
    }

    pub fn trajectory_generator(&self) -> Result<TrajectoryGenerator> {
        TrajectoryGenerator::new(self.walk, self.bounds.clone(), self.initial_prior.clone())
    }

    /// Cross-field consistency checks.
    pub fn validate(&self) -> Result<()> {
        let dims = self.dims();
        let cols = self.table.cols();
        let bad = |msg: String| Err(SimError::config(format!("{}: {msg}", self.name)));

        if self.param_names.len() != dims {
            return bad(format!(
                "{} parameter names for {dims} dimensions",
                self.param_names.len()
            ));
        }
        if self.initial_prior.len() != dims {
            return bad(format!(
                "initializer has {} components for {dims} dimensions",
                self.initial_prior.len()
            ));
        }
        if self.hyper_prior.len() != self.walk.hyper_len(dims) {
            return bad(format!(
                "{:?} walk needs {} hyperparameters, prior has {}",
                self.walk,
                self.walk.hyper_len(dims),
                self.hyper_prior.len()
            ));
        }
        self.trial_count.validate()?;
        if cols == 0 {
            return bad("value table has no columns".into());
        }
        if let ValueReset::Every(0) = self.value_reset {
            return bad("value reset period must be >= 1".into());
        }

        match &self.alternatives {
            AlternativeRule::Fixed(n) => {
                if *n == 0 || *n > cols {
                    return bad(format!("fixed subset of {n} over {cols} columns"));
                }
            }
            AlternativeRule::ByCondition(subsets) => {
                let k = self.alternatives.subset_len();
                if subsets.is_empty() || k == 0 {
                    return bad("condition subsets must be non-empty".into());
                }
                for (c, s) in subsets.iter().enumerate() {
                    if s.len() != k {
                        return bad(format!("condition {c} has {} alternatives, expected {k}", s.len()));
                    }
                    if s.iter().any(|&a| a as usize >= cols) {
                        return bad(format!("condition {c} references a column >= {cols}"));
                    }
                    if has_duplicates(s) {
                        return bad(format!("condition {c} repeats an alternative"));
                    }
                }
            }
            AlternativeRule::FromContext { count } => {
                if *count == 0 || *count > cols {
                    return bad(format!("context subset of {count} over {cols} columns"));
                }
            }
        }

        match self.temperature {
            Temperature::Param(i) => {
                if i >= dims {
                    return bad(format!("temperature index {i} >= {dims}"));
                }
                if self.bounds.low()[i] < 0.0 {
                    return bad("temperature lower bound must be >= 0".into());
                }
            }
            Temperature::Fixed(t) => {
                if !t.is_finite() || t < 0.0 {
                    return bad(format!("fixed temperature {t} must be finite and >= 0"));
                }
            }
        }

        let rate_dims: Vec<usize> = match self.learning {
            LearningRule::Chosen { rate } => vec![rate],
            LearningRule::FullFeedback { chosen, unchosen } => {
                if self.feedback != FeedbackRule::Observed {
                    return bad("full-feedback learning needs observed outcomes".into());
                }
                vec![chosen, unchosen]
            }
        };
        for r in rate_dims {
            if r >= dims {
                return bad(format!("learning-rate index {r} >= {dims}"));
            }
            if self.bounds.low()[r] < 0.0 || self.bounds.high()[r] > 1.0 {
                return bad(format!("learning rate {r} must be bounded within [0, 1]"));
            }
        }

        match (&self.working_memory, &self.table) {
            (Some(wm), TableShape::PerStimulus { .. }) => {
                let shared = self.shared_len();
                if wm.weight >= dims {
                    return bad(format!("working-memory weight index {} >= {dims}", wm.weight));
                }
                if wm.decay >= shared || wm.capacity >= shared {
                    return bad("working-memory indices exceed the shared prior".into());
                }
            }
            (Some(_), TableShape::Flat { .. }) => {
                return bad("working-memory blending needs per-stimulus tables".into());
            }
            (None, _) => {}
        }

        for col in &self.context_columns {
            match *col {
                ContextColumn::Alternative(i) | ContextColumn::Feedback(i)
                    if i >= self.alternatives.subset_len() =>
                {
                    return bad(format!("context column {col:?} beyond the valid subset"));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn has_duplicates(xs: &[u32]) -> bool {
    xs.iter()
        .enumerate()
        .any(|(i, a)| xs[i + 1..].iter().any(|b| a == b))
}
