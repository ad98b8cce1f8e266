//! Run-time generator settings, loaded from JSON.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::batch::{BatchOrchestrator, LengthPolicy};
use crate::error::{Result, SimError};
use crate::prng::Prng;
use crate::variant::TaskVariant;

fn default_variant() -> String {
    "rlwm".to_string()
}

fn default_batch_size() -> usize {
    32
}

fn default_num_batches() -> usize {
    1
}

fn default_parallel() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_variant")]
    pub variant: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_num_batches")]
    pub num_batches: usize,
    /// Master seed. `None` draws one from the OS.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub length_policy: LengthPolicy,
    #[serde(default = "default_parallel")]
    pub parallel: bool,
    /// Worker threads for the rayon pool; `None` keeps rayon's default.
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(default)]
    pub output_dir: Option<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            variant: default_variant(),
            batch_size: default_batch_size(),
            num_batches: default_num_batches(),
            seed: None,
            length_policy: LengthPolicy::default(),
            parallel: default_parallel(),
            threads: None,
            output_dir: None,
        }
    }
}

impl GeneratorConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Self =
            serde_json::from_str(s).map_err(|e| SimError::config(format!("config json: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| SimError::config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if !TaskVariant::builtin_names()
            .iter()
            .any(|name| *name == self.variant)
        {
            return Err(SimError::config(format!(
                "unknown variant {:?} (expected one of {:?})",
                self.variant,
                TaskVariant::builtin_names()
            )));
        }
        if self.batch_size < 1 {
            return Err(SimError::config("batch_size must be >= 1"));
        }
        if self.num_batches < 1 {
            return Err(SimError::config("num_batches must be >= 1"));
        }
        if self.threads == Some(0) {
            return Err(SimError::config("threads must be >= 1"));
        }
        Ok(())
    }

    pub fn variant(&self) -> Result<TaskVariant> {
        TaskVariant::by_name(&self.variant)
    }

    pub fn orchestrator(&self) -> BatchOrchestrator {
        BatchOrchestrator::new(self.batch_size)
            .with_length_policy(self.length_policy)
            .with_parallel(self.parallel)
    }

    /// Seed of batch `k`, derived from the master seed.
    pub fn batch_seed(master_seed: u64, k: usize) -> u64 {
        Prng::for_stream(master_seed, k as u64).next_u64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let cfg = GeneratorConfig::from_json_str(r#"{"variant": "paired_choice", "seed": 7}"#)
            .unwrap();
        assert_eq!(cfg.variant, "paired_choice");
        assert_eq!(cfg.seed, Some(7));
        assert_eq!(cfg.batch_size, 32);
        assert_eq!(cfg.length_policy, LengthPolicy::Pad);
        assert!(cfg.parallel);

        let cfg = GeneratorConfig::from_json_str(r#"{"length_policy": "truncate"}"#).unwrap();
        assert_eq!(cfg.length_policy, LengthPolicy::Truncate);
    }

    #[test]
    fn bad_configs_fail_fast() {
        assert!(GeneratorConfig::from_json_str(r#"{"variant": "nope"}"#).is_err());
        assert!(GeneratorConfig::from_json_str(r#"{"batch_size": 0}"#).is_err());
        assert!(GeneratorConfig::from_json_str(r#"{"threads": 0}"#).is_err());
        assert!(matches!(
            GeneratorConfig::from_json_str("{not json"),
            Err(SimError::Config(_))
        ));
    }

    #[test]
    fn batch_seeds_are_distinct_and_stable() {
        let a = GeneratorConfig::batch_seed(1, 0);
        assert_eq!(a, GeneratorConfig::batch_seed(1, 0));
        assert_ne!(a, GeneratorConfig::batch_seed(1, 1));
        assert_ne!(a, GeneratorConfig::batch_seed(2, 0));
    }

    #[test]
    fn json_round_trips() {
        let cfg = GeneratorConfig {
            seed: Some(3),
            threads: Some(2),
            ..Default::default()
        };
        let back = GeneratorConfig::from_json_str(&cfg.to_json_string().unwrap()).unwrap();
        assert_eq!(back, cfg);
    }
}
