//! Per-trial context and the contract a context supplier must honor.

use crate::error::{Result, SimError};
use crate::prng::Prng;
use crate::variant::{AlternativeRule, ContextColumn, FeedbackRule, TableShape, TaskVariant};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One trial's externally supplied context.
///
/// This is the union of the columns the built-in variants use; a variant
/// reads only the fields its rules reference.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TrialContext {
    #[cfg_attr(feature = "serde", serde(default))]
    pub stimulus: u32,
    /// Condition code selecting the valid subset (also the stimulus set).
    #[cfg_attr(feature = "serde", serde(default))]
    pub condition: u32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub block: u32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub set_size: u32,
    #[cfg_attr(feature = "serde", serde(default))]
    pub correct_response: u32,
    /// Available table columns, for variants that read them from context.
    #[cfg_attr(feature = "serde", serde(default))]
    pub alternatives: Vec<u32>,
    /// Per-slot feedback: success probabilities or observed payoffs.
    #[cfg_attr(feature = "serde", serde(default))]
    pub feedback: Vec<f32>,
}

impl TrialContext {
    /// Values of the variant's `batchable_context` columns.
    pub fn columns(&self, variant: &TaskVariant) -> Vec<f32> {
        variant
            .context_columns
            .iter()
            .map(|col| match *col {
                ContextColumn::Stimulus => self.stimulus as f32,
                ContextColumn::CorrectResponse => self.correct_response as f32,
                ContextColumn::Block => self.block as f32,
                ContextColumn::SetSize => self.set_size as f32,
                ContextColumn::Condition => self.condition as f32,
                ContextColumn::Alternative(i) => {
                    self.alternatives.get(i).copied().unwrap_or(0) as f32
                }
                ContextColumn::Feedback(i) => self.feedback.get(i).copied().unwrap_or(0.0),
            })
            .collect()
    }

    fn block_key(&self) -> (u32, u32) {
        (self.block, self.set_size)
    }
}

/// Source of per-subject trial contexts (empirical or synthetic).
///
/// Implementations draw all randomness from the stream they are handed so a
/// subject's context is reproducible from its seed.
pub trait ContextSupplier: Sync {
    fn name(&self) -> &str;

    /// Produce the ordered context of one subject with `num_steps` trials.
    fn supply(&self, num_steps: usize, rng: &mut Prng) -> Result<Vec<TrialContext>>;
}

/// Trial indices t > 0 whose block id or set size differs from trial t - 1.
pub fn block_change_indices(contexts: &[TrialContext]) -> Vec<usize> {
    contexts
        .windows(2)
        .enumerate()
        .filter(|(_, w)| w[0].block_key() != w[1].block_key())
        .map(|(i, _)| i + 1)
        .collect()
}

/// Check a subject's context against the variant before any simulation.
pub fn validate_context(
    variant: &TaskVariant,
    contexts: &[TrialContext],
    expected_len: usize,
) -> Result<()> {
    if contexts.len() != expected_len {
        return Err(SimError::contract(format!(
            "context has {} trials, expected {expected_len}",
            contexts.len()
        )));
    }
    let cols = variant.table.cols();
    let k = variant.alternatives.subset_len();

    for (t, ctx) in contexts.iter().enumerate() {
        let fail = |msg: String| Err(SimError::contract(format!("trial {t}: {msg}")));

        match &variant.alternatives {
            AlternativeRule::Fixed(_) => {}
            AlternativeRule::ByCondition(subsets) => {
                if ctx.condition as usize >= subsets.len() {
                    return fail(format!(
                        "condition {} outside 0..{}",
                        ctx.condition,
                        subsets.len()
                    ));
                }
            }
            AlternativeRule::FromContext { count } => {
                if ctx.alternatives.len() != *count {
                    return fail(format!(
                        "{} alternatives listed, expected {count}",
                        ctx.alternatives.len()
                    ));
                }
                if let Some(a) = ctx.alternatives.iter().find(|&&a| a as usize >= cols) {
                    return fail(format!("alternative {a} outside 0..{cols}"));
                }
                let a = &ctx.alternatives;
                if (0..a.len()).any(|i| a[i + 1..].contains(&a[i])) {
                    return fail("alternatives repeat".into());
                }
            }
        }

        if let TableShape::PerStimulus { .. } = variant.table {
            if ctx.set_size == 0 {
                return fail("set size must be >= 1".into());
            }
            if ctx.stimulus >= ctx.set_size {
                return fail(format!(
                    "stimulus {} outside set of size {}",
                    ctx.stimulus, ctx.set_size
                ));
            }
        }

        match variant.feedback {
            FeedbackRule::MatchCorrect => {
                if ctx.correct_response as usize >= cols {
                    return fail(format!(
                        "correct response {} outside 0..{cols}",
                        ctx.correct_response
                    ));
                }
            }
            FeedbackRule::Bernoulli | FeedbackRule::Observed => {
                if ctx.feedback.len() < k {
                    return fail(format!(
                        "{} feedback values for {k} alternatives",
                        ctx.feedback.len()
                    ));
                }
                if ctx.feedback.iter().any(|f| !f.is_finite()) {
                    return fail("feedback is not finite".into());
                }
                if variant.feedback == FeedbackRule::Bernoulli
                    && ctx.feedback[..k].iter().any(|p| !(0.0..=1.0).contains(p))
                {
                    return fail("success probability outside [0, 1]".into());
                }
            }
        }
    }
    Ok(())
}
