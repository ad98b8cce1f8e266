//! Empirical contexts replayed from recorded subjects.

use cogsim::context::{ContextSupplier, TrialContext};
use cogsim::error::{Result, SimError};
use cogsim::prng::Prng;
use hashbrown::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One recorded trial tagged with its subject.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoolRow {
    pub subject: u64,
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub context: TrialContext,
}

/// Recorded contexts grouped by subject.
///
/// Each `supply` picks a subject uniformly and then drops randomly chosen
/// trials until the requested length remains; trial order is preserved.
#[derive(Debug, Clone)]
pub struct SubjectPool {
    by_subject: HashMap<u64, Vec<TrialContext>>,
    // Sorted so subject selection does not depend on hash order.
    subjects: Vec<u64>,
}

impl SubjectPool {
    pub fn new(rows: impl IntoIterator<Item = PoolRow>) -> Result<Self> {
        let mut by_subject: HashMap<u64, Vec<TrialContext>> = HashMap::new();
        for row in rows {
            by_subject.entry(row.subject).or_default().push(row.context);
        }
        if by_subject.is_empty() {
            return Err(SimError::Config("subject pool is empty".into()));
        }
        let mut subjects: Vec<u64> = by_subject.keys().copied().collect();
        subjects.sort_unstable();
        Ok(Self {
            by_subject,
            subjects,
        })
    }

    /// Rows in the JSON array form `[{"subject": 1, "stimulus": 0, ...}, ...]`.
    #[cfg(feature = "serde")]
    pub fn from_json_str(s: &str) -> Result<Self> {
        let rows: Vec<PoolRow> = serde_json::from_str(s)
            .map_err(|e| SimError::Config(format!("subject pool json: {e}")))?;
        Self::new(rows)
    }

    /// Keep only the listed subjects.
    pub fn restrict_to(&mut self, keep: &[u64]) -> Result<()> {
        if !self.subjects.iter().any(|id| keep.contains(id)) {
            return Err(SimError::Config(format!(
                "none of the subjects {keep:?} are in the pool"
            )));
        }
        self.by_subject.retain(|id, _| keep.contains(id));
        self.subjects.retain(|id| keep.contains(id));
        Ok(())
    }

    pub fn subjects(&self) -> &[u64] {
        &self.subjects
    }

    pub fn trials(&self, subject: u64) -> Option<&[TrialContext]> {
        self.by_subject.get(&subject).map(Vec::as_slice)
    }
}

impl ContextSupplier for SubjectPool {
    fn name(&self) -> &str {
        "subject_pool"
    }

    fn supply(&self, num_steps: usize, rng: &mut Prng) -> Result<Vec<TrialContext>> {
        let subject = self.subjects[rng.gen_range_usize(0, self.subjects.len())];
        let trials = self
            .by_subject
            .get(&subject)
            .ok_or_else(|| SimError::ContextContract(format!("subject {subject} vanished")))?;
        if trials.len() < num_steps {
            return Err(SimError::ContextContract(format!(
                "subject {subject} has {} trials, {num_steps} requested",
                trials.len()
            )));
        }

        let mut keep: Vec<usize> = (0..trials.len()).collect();
        rng.shuffle(&mut keep);
        keep.truncate(num_steps);
        keep.sort_unstable();
        Ok(keep.into_iter().map(|i| trials[i].clone()).collect())
    }
}
