//! Sequential choice agent.
//!
//! A [`ChoiceSimulator`] walks one subject's trials strictly forward:
//! `Initialized -> AtTrial(0) -> .. -> AtTrial(T-1) -> Terminated`. Each trial
//! 1. resets the value tables on a block boundary,
//! 2. resolves the valid alternatives,
//! 3. computes the (possibly blended) softmax policy,
//! 4. samples an action by inverse CDF,
//! 5. resolves the outcome,
//! 6. applies the delta rule (plus working-memory decay/overwrite),
//! 7. emits (action, outcome).
//!
//! Trial t only reads state up to t - 1, θ_t, and c_t.

use crate::context::{validate_context, TrialContext};
use crate::error::{Result, SimError};
use crate::policy::{blend_into, is_distribution, sample_categorical, softmax_into};
use crate::prng::Prng;
use crate::trajectory::Trajectory;
use crate::variant::{
    ActionCoding, AlternativeRule, FeedbackRule, LearningRule, TableShape, TaskVariant,
    Temperature, ValueReset,
};

const PROB_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initialized,
    /// Next trial to run.
    AtTrial(usize),
    Terminated,
}

/// Reinforcement-learning values and, for blended variants, working-memory
/// values. Row-major `[rows, cols]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueTables {
    rows: usize,
    cols: usize,
    rl: Vec<f64>,
    wm: Option<Vec<f64>>,
}

impl ValueTables {
    fn new(cols: usize, with_wm: bool) -> Self {
        Self {
            rows: 0,
            cols,
            rl: Vec::new(),
            wm: with_wm.then(Vec::new),
        }
    }

    /// Reinitialize every table to `[rows, cols]` filled with `baseline`.
    pub fn reset(&mut self, rows: usize, baseline: f64) {
        self.rows = rows;
        self.rl.clear();
        self.rl.resize(rows * self.cols, baseline);
        if let Some(wm) = self.wm.as_mut() {
            wm.clear();
            wm.resize(rows * self.cols, baseline);
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rl(&self) -> &[f64] {
        &self.rl
    }

    pub fn wm(&self) -> Option<&[f64]> {
        self.wm.as_deref()
    }

    pub fn rl_row(&self, row: usize) -> &[f64] {
        &self.rl[row * self.cols..(row + 1) * self.cols]
    }

    pub fn wm_row(&self, row: usize) -> Option<&[f64]> {
        self.wm
            .as_ref()
            .map(|wm| &wm[row * self.cols..(row + 1) * self.cols])
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialOutput {
    /// Table column of the chosen alternative.
    pub alternative: u32,
    /// Position of the choice within the valid subset.
    pub slot: usize,
    /// Coded action written to `sim_data`.
    pub action: u32,
    pub outcome: f32,
    /// The value tables were reinitialized before this trial.
    pub block_reset: bool,
}

pub struct ChoiceSimulator<'v> {
    variant: &'v TaskVariant,
    shared: Vec<f64>,
    num_steps: usize,
    phase: Phase,
    tables: ValueTables,
    last_block: Option<(u32, u32)>,
    subset: Vec<u32>,
    values: Vec<f64>,
    probs: Vec<f64>,
    wm_probs: Vec<f64>,
}

impl<'v> ChoiceSimulator<'v> {
    pub fn new(variant: &'v TaskVariant, shared: &[f64], num_steps: usize) -> Result<Self> {
        if num_steps < 1 {
            return Err(SimError::config("simulation needs at least one trial"));
        }
        if shared.len() != variant.shared_len() {
            return Err(SimError::config(format!(
                "{} expects {} shared parameters, got {}",
                variant.name,
                variant.shared_len(),
                shared.len()
            )));
        }
        if let Some(wm) = variant.working_memory {
            let capacity = shared[wm.capacity];
            let decay = shared[wm.decay];
            if !capacity.is_finite() || capacity <= 0.0 {
                return Err(SimError::config(format!("capacity {capacity} must be > 0")));
            }
            if !(0.0..=1.0).contains(&decay) {
                return Err(SimError::config(format!("decay {decay} outside [0, 1]")));
            }
        }
        let k = variant.alternatives.subset_len();
        Ok(Self {
            variant,
            shared: shared.to_vec(),
            num_steps,
            phase: Phase::Initialized,
            tables: ValueTables::new(variant.table.cols(), variant.working_memory.is_some()),
            last_block: None,
            subset: Vec::with_capacity(k),
            values: Vec::with_capacity(k),
            probs: Vec::with_capacity(k),
            wm_probs: Vec::with_capacity(k),
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn tables(&self) -> &ValueTables {
        &self.tables
    }

    /// Run every trial of the subject.
    ///
    /// The whole context is checked against the variant before the first trial.
    pub fn run(
        &mut self,
        trajectory: &Trajectory,
        contexts: &[TrialContext],
        rng: &mut Prng,
    ) -> Result<Vec<TrialOutput>> {
        validate_context(self.variant, contexts, self.num_steps)?;
        if trajectory.num_steps() != self.num_steps {
            return Err(SimError::contract(format!(
                "trajectory has {} steps and context {} trials, simulator expects {}",
                trajectory.num_steps(),
                contexts.len(),
                self.num_steps
            )));
        }
        let mut out = Vec::with_capacity(self.num_steps);
        for (t, ctx) in contexts.iter().enumerate() {
            out.push(self.step(trajectory.row(t), ctx, rng)?);
        }
        Ok(out)
    }

    /// Advance by exactly one trial.
    pub fn step(
        &mut self,
        theta: &[f32],
        ctx: &TrialContext,
        rng: &mut Prng,
    ) -> Result<TrialOutput> {
        let t = match self.phase {
            Phase::Initialized => 0,
            Phase::AtTrial(t) => t,
            Phase::Terminated => {
                return Err(SimError::config(format!(
                    "simulator already ran all {} trials",
                    self.num_steps
                )))
            }
        };
        self.check_theta(t, theta)?;

        let block_reset = self.maybe_reset(t, ctx);
        let row = match self.variant.table {
            TableShape::Flat { .. } => 0,
            TableShape::PerStimulus { .. } => ctx.stimulus as usize,
        };
        if row >= self.tables.rows {
            return Err(SimError::contract(format!(
                "trial {t}: stimulus {} outside the current table of {} rows",
                ctx.stimulus, self.tables.rows
            )));
        }

        self.resolve_subset(ctx)?;
        self.check_feedback(t, ctx)?;
        self.compute_policy(t, theta, ctx, row)?;

        let slot = sample_categorical(&self.probs, rng.next_f64_01());
        let alternative = self.subset[slot];
        let outcome = self.resolve_outcome(slot, alternative, ctx, rng);
        self.update(theta, ctx, row, slot, outcome);

        self.phase = if t + 1 >= self.num_steps {
            Phase::Terminated
        } else {
            Phase::AtTrial(t + 1)
        };

        let action = match self.variant.action_coding {
            ActionCoding::Slot => slot as u32,
            ActionCoding::Alternative => alternative,
        };
        Ok(TrialOutput {
            alternative,
            slot,
            action,
            outcome: outcome as f32,
            block_reset,
        })
    }

    fn check_theta(&self, t: usize, theta: &[f32]) -> Result<()> {
        let bounds = &self.variant.bounds;
        if theta.len() != bounds.dims() {
            return Err(SimError::NumericDomain(format!(
                "trial {t}: θ has {} components, variant has {}",
                theta.len(),
                bounds.dims()
            )));
        }
        for (d, &x) in theta.iter().enumerate() {
            if !bounds.contains(d, x as f64) {
                return Err(SimError::NumericDomain(format!(
                    "trial {t}: {} = {x} outside [{}, {}]",
                    self.variant.param_names[d],
                    bounds.low()[d],
                    bounds.high()[d]
                )));
            }
        }
        Ok(())
    }

    // Step 1.
    fn maybe_reset(&mut self, t: usize, ctx: &TrialContext) -> bool {
        let key = (ctx.block, ctx.set_size);
        let reset = t == 0
            || match self.variant.value_reset {
                ValueReset::Never => false,
                ValueReset::Every(k) => t % k == 0,
                ValueReset::OnBlockChange => self.last_block != Some(key),
            };
        self.last_block = Some(key);
        if reset {
            let rows = match self.variant.table {
                TableShape::Flat { .. } => 1,
                TableShape::PerStimulus { .. } => ctx.set_size as usize,
            };
            let baseline = self.variant.baseline.value(self.tables.cols);
            self.tables.reset(rows, baseline);
        }
        reset
    }

    // Step 2.
    fn resolve_subset(&mut self, ctx: &TrialContext) -> Result<()> {
        self.subset.clear();
        match &self.variant.alternatives {
            AlternativeRule::Fixed(n) => self.subset.extend(0..*n as u32),
            AlternativeRule::ByCondition(subsets) => {
                let s = subsets.get(ctx.condition as usize).ok_or_else(|| {
                    SimError::contract(format!("condition {} has no subset", ctx.condition))
                })?;
                self.subset.extend_from_slice(s);
            }
            AlternativeRule::FromContext { .. } => {
                self.subset.extend_from_slice(&ctx.alternatives);
            }
        }
        if self.subset.is_empty() || self.subset.iter().any(|&a| a as usize >= self.tables.cols) {
            return Err(SimError::contract(format!(
                "invalid alternative subset {:?}",
                self.subset
            )));
        }
        Ok(())
    }

    fn check_feedback(&self, t: usize, ctx: &TrialContext) -> Result<()> {
        let reads_feedback = matches!(
            self.variant.feedback,
            FeedbackRule::Bernoulli | FeedbackRule::Observed
        ) || matches!(self.variant.learning, LearningRule::FullFeedback { .. });
        if reads_feedback && ctx.feedback.len() < self.subset.len() {
            return Err(SimError::contract(format!(
                "trial {t}: {} feedback values for {} alternatives",
                ctx.feedback.len(),
                self.subset.len()
            )));
        }
        Ok(())
    }

    // Step 3.
    fn compute_policy(
        &mut self,
        t: usize,
        theta: &[f32],
        ctx: &TrialContext,
        row: usize,
    ) -> Result<()> {
        let temperature = match self.variant.temperature {
            Temperature::Param(i) => theta[i] as f64,
            Temperature::Fixed(v) => v,
        };

        let rl_row = self.tables.rl_row(row);
        self.values.clear();
        self.values
            .extend(self.subset.iter().map(|&a| rl_row[a as usize]));
        softmax_into(&self.values, temperature, &mut self.probs);

        if let (Some(wm), Some(wm_row)) = (self.variant.working_memory, self.tables.wm_row(row)) {
            self.values.clear();
            self.values
                .extend(self.subset.iter().map(|&a| wm_row[a as usize]));
            softmax_into(&self.values, temperature, &mut self.wm_probs);

            let capacity = self.shared[wm.capacity];
            let set_size = ctx.set_size.max(1) as f64;
            let w = (capacity / set_size).min(1.0) * theta[wm.weight] as f64;
            blend_into(&self.wm_probs, &mut self.probs, w);
        }

        if !is_distribution(&self.probs, PROB_TOLERANCE) {
            return Err(SimError::NumericDomain(format!(
                "trial {t}: policy {:?} is not a distribution",
                self.probs
            )));
        }
        Ok(())
    }

    // Step 5.
    fn resolve_outcome(
        &self,
        slot: usize,
        alternative: u32,
        ctx: &TrialContext,
        rng: &mut Prng,
    ) -> f64 {
        match self.variant.feedback {
            FeedbackRule::Bernoulli => {
                if rng.chance(ctx.feedback[slot] as f64) {
                    1.0
                } else {
                    0.0
                }
            }
            FeedbackRule::MatchCorrect => {
                if alternative == ctx.correct_response {
                    1.0
                } else {
                    0.0
                }
            }
            FeedbackRule::Observed => ctx.feedback[slot] as f64,
        }
    }

    // Step 6.
    fn update(&mut self, theta: &[f32], ctx: &TrialContext, row: usize, slot: usize, outcome: f64) {
        let cols = self.tables.cols;
        let base = row * cols;
        let chosen = base + self.subset[slot] as usize;

        match self.variant.learning {
            LearningRule::Chosen { rate } => {
                let q = &mut self.tables.rl[chosen];
                *q += theta[rate] as f64 * (outcome - *q);
            }
            LearningRule::FullFeedback {
                chosen: chosen_rate,
                unchosen: unchosen_rate,
            } => {
                let q = &mut self.tables.rl[chosen];
                *q += theta[chosen_rate] as f64 * (outcome - *q);
                let rate = theta[unchosen_rate] as f64;
                for (s, &a) in self.subset.iter().enumerate() {
                    if s == slot {
                        continue;
                    }
                    let q = &mut self.tables.rl[base + a as usize];
                    *q += rate * (ctx.feedback[s] as f64 - *q);
                }
            }
        }

        if let (Some(wm_rule), Some(wm)) = (self.variant.working_memory, self.tables.wm.as_mut()) {
            let decay = self.shared[wm_rule.decay];
            let flat = 1.0 / self.subset.len() as f64;
            for w in wm.iter_mut() {
                *w += decay * (flat - *w);
            }
            wm[chosen] = outcome;
        }
    }
}

/// Run one subject end to end.
pub fn simulate(
    variant: &TaskVariant,
    trajectory: &Trajectory,
    shared: &[f64],
    contexts: &[TrialContext],
    rng: &mut Prng,
) -> Result<Vec<TrialOutput>> {
    ChoiceSimulator::new(variant, shared, contexts.len())?.run(trajectory, contexts, rng)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant_trajectory(theta: &[f32], num_steps: usize) -> Trajectory {
        let values = theta
            .iter()
            .copied()
            .cycle()
            .take(theta.len() * num_steps)
            .collect();
        Trajectory::from_values(num_steps, theta.len(), values).unwrap()
    }

    fn rlwm_context(blocks: &[(u32, u32, usize)]) -> Vec<TrialContext> {
        let mut out = Vec::new();
        for &(block, set_size, trials) in blocks {
            for i in 0..trials {
                let stimulus = (i as u32) % set_size;
                out.push(TrialContext {
                    stimulus,
                    block,
                    set_size,
                    correct_response: stimulus % 3,
                    ..Default::default()
                });
            }
        }
        out
    }

    #[test]
    fn block_change_restores_flat_tables() {
        let v = TaskVariant::rlwm().unwrap();
        let ctx = rlwm_context(&[(0, 3, 12), (1, 3, 12), (2, 6, 12)]);
        let traj = constant_trajectory(&[0.5, 0.8], ctx.len());
        let mut sim = ChoiceSimulator::new(&v, &[0.2, 4.0], ctx.len()).unwrap();
        let mut rng = Prng::new(21);

        for (t, c) in ctx.iter().enumerate() {
            let before_learning = sim.tables().clone();
            let out = sim.step(traj.row(t), c, &mut rng).unwrap();
            if t == 0 || t == 12 || t == 24 {
                assert!(out.block_reset, "trial {t}");
            } else {
                assert!(!out.block_reset, "trial {t}");
                assert!(before_learning.rows() > 0);
            }
            if t == 11 {
                // Learning has moved the tables away from 1/3 by the end of the block.
                assert!(sim.tables().rl().iter().any(|q| (q - 1.0 / 3.0).abs() > 1e-6));
            }
        }
        assert_eq!(sim.phase(), Phase::Terminated);
    }

    #[test]
    fn first_trial_of_a_block_sees_flat_tables() {
        let v = TaskVariant::rlwm().unwrap();
        let ctx = rlwm_context(&[(0, 3, 6), (1, 3, 1)]);
        let traj = constant_trajectory(&[0.9, 0.5], ctx.len());
        let mut sim = ChoiceSimulator::new(&v, &[0.3, 3.0], ctx.len()).unwrap();
        let mut rng = Prng::new(8);
        for t in 0..6 {
            sim.step(traj.row(t), &ctx[t], &mut rng).unwrap();
        }
        assert!(sim.tables().rl().iter().any(|&q| q != 1.0 / 3.0));

        let out = sim.step(traj.row(6), &ctx[6], &mut rng).unwrap();
        assert!(out.block_reset);
        let tables = sim.tables();
        assert_eq!(tables.rows(), 3);
        let chosen = ctx[6].stimulus as usize * tables.cols() + out.alternative as usize;
        for (i, &q) in tables.rl().iter().enumerate() {
            if i == chosen {
                let alpha = 0.9f32 as f64;
                assert_eq!(q, 1.0 / 3.0 + alpha * (out.outcome as f64 - 1.0 / 3.0));
            } else {
                assert_eq!(q, 1.0 / 3.0, "rl cell {i}");
            }
        }
        for (i, &w) in tables.wm().unwrap().iter().enumerate() {
            if i == chosen {
                assert_eq!(w, out.outcome as f64);
            } else {
                assert_eq!(w, 1.0 / 3.0, "wm cell {i}");
            }
        }
    }

    #[test]
    fn missing_feedback_is_a_contract_error() {
        let v = TaskVariant::reversal_learning().unwrap();
        let traj = constant_trajectory(&[0.3, 4.0], 1);
        let ctx = vec![TrialContext {
            condition: 0,
            feedback: vec![],
            ..Default::default()
        }];
        let mut rng = Prng::new(4);
        assert!(matches!(
            simulate(&v, &traj, &[], &ctx, &mut rng),
            Err(SimError::ContextContract(_))
        ));

        // Stepping directly skips the up-front check but still fails cleanly.
        let mut sim = ChoiceSimulator::new(&v, &[], 1).unwrap();
        assert!(matches!(
            sim.step(traj.row(0), &ctx[0], &mut rng),
            Err(SimError::ContextContract(_))
        ));

        let three = TaskVariant::three_alt_full_feedback().unwrap();
        let short = TrialContext {
            condition: 1,
            feedback: vec![1.0, 1.0],
            ..Default::default()
        };
        let mut sim = ChoiceSimulator::new(&three, &[], 1).unwrap();
        assert!(matches!(
            sim.step(&[0.3, 0.1, 5.0], &short, &mut rng),
            Err(SimError::ContextContract(_))
        ));
    }

    #[test]
    fn actions_belong_to_the_condition_subset() {
        let v = TaskVariant::three_alt_full_feedback().unwrap();
        let ctx: Vec<TrialContext> = (0..80)
            .map(|t| TrialContext {
                condition: (t % 4) as u32,
                feedback: vec![1.0, 1.2, 1.4],
                ..Default::default()
            })
            .collect();
        let traj = constant_trajectory(&[0.3, 0.1, 5.0], ctx.len());
        let mut rng = Prng::new(13);
        let outs = simulate(&v, &traj, &[], &ctx, &mut rng).unwrap();
        let AlternativeRule::ByCondition(subsets) = &v.alternatives else {
            unreachable!()
        };
        for (c, o) in ctx.iter().zip(&outs) {
            let subset = &subsets[c.condition as usize];
            assert!(subset.contains(&o.alternative));
            assert_eq!(subset[o.slot], o.alternative);
            assert_eq!(o.action as usize, o.slot);
            assert_eq!(o.outcome, c.feedback[o.slot]);
        }
    }

    #[test]
    fn full_feedback_moves_unchosen_toward_their_outcomes() {
        let v = TaskVariant::three_alt_full_feedback().unwrap();
        let ctx = vec![TrialContext {
            condition: 0,
            feedback: vec![1.0, 1.0, 1.0],
            ..Default::default()
        }];
        let traj = constant_trajectory(&[0.5, 0.25, 0.0], 1);
        let mut sim = ChoiceSimulator::new(&v, &[], 1).unwrap();
        let mut rng = Prng::new(2);
        let out = sim.step(traj.row(0), &ctx[0], &mut rng).unwrap();
        let q = sim.tables().rl();
        for a in 0..3 {
            let expected = if a == out.alternative as usize {
                0.5 + 0.5 * 0.5
            } else {
                0.5 + 0.25 * 0.5
            };
            assert!((q[a] - expected).abs() < 1e-12);
        }
        // Alternatives outside the subset are untouched.
        assert!(q[3..].iter().all(|&x| x == 0.5));
    }

    #[test]
    fn scheduled_value_resets_follow_the_period() {
        let v = TaskVariant::reversal_learning().unwrap();
        let ctx: Vec<TrialContext> = (0..300)
            .map(|t| TrialContext {
                condition: ((t / 128) % 2) as u32,
                feedback: vec![0.8, 0.2],
                ..Default::default()
            })
            .collect();
        let traj = constant_trajectory(&[0.3, 4.0], ctx.len());
        let mut rng = Prng::new(5);
        let outs = simulate(&v, &traj, &[], &ctx, &mut rng).unwrap();
        let resets: Vec<usize> = outs
            .iter()
            .enumerate()
            .filter(|(_, o)| o.block_reset)
            .map(|(t, _)| t)
            .collect();
        assert_eq!(resets, vec![0, 128, 256]);
        for (c, o) in ctx.iter().zip(&outs) {
            assert!(o.slot < 2);
            assert!(o.outcome == 0.0 || o.outcome == 1.0);
            assert_eq!(o.alternative, 2 * c.condition + o.slot as u32);
        }
    }

    #[test]
    fn out_of_bounds_theta_is_fatal() {
        let v = TaskVariant::reversal_learning().unwrap();
        let ctx = vec![TrialContext {
            feedback: vec![0.5, 0.5],
            ..Default::default()
        }];
        let traj = constant_trajectory(&[1.5, 2.0], 1);
        let mut rng = Prng::new(1);
        let err = simulate(&v, &traj, &[], &ctx, &mut rng).unwrap_err();
        assert!(matches!(err, SimError::NumericDomain(_)));
    }

    #[test]
    fn stepping_past_the_end_fails() {
        let v = TaskVariant::paired_choice().unwrap();
        let ctx = TrialContext {
            alternatives: vec![0, 3],
            feedback: vec![0.4, 0.6],
            ..Default::default()
        };
        let mut sim = ChoiceSimulator::new(&v, &[], 1).unwrap();
        let mut rng = Prng::new(1);
        let out = sim.step(&[0.2, 3.0], &ctx, &mut rng).unwrap();
        assert!(out.action == 0 || out.action == 3);
        assert!(sim.step(&[0.2, 3.0], &ctx, &mut rng).is_err());
    }

    #[test]
    fn length_mismatch_is_a_contract_error() {
        let v = TaskVariant::paired_choice().unwrap();
        let ctx = vec![
            TrialContext {
                alternatives: vec![0, 1],
                feedback: vec![0.4, 0.6],
                ..Default::default()
            };
            3
        ];
        let traj = constant_trajectory(&[0.2, 3.0], 4);
        let mut rng = Prng::new(1);
        let mut sim = ChoiceSimulator::new(&v, &[], 3).unwrap();
        assert!(matches!(
            sim.run(&traj, &ctx, &mut rng),
            Err(SimError::ContextContract(_))
        ));
        let mut sim = ChoiceSimulator::new(&v, &[], 4).unwrap();
        assert!(matches!(
            sim.run(&traj, &ctx, &mut rng),
            Err(SimError::ContextContract(_))
        ));
    }
}
