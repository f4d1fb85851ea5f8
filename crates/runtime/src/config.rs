//! Runtime configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Limits and execution switches for walker runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Steps a walker may take before the run is cut short.
    pub step_limit: u64,
    /// Iterations a single loop statement may run.
    pub loop_limit: usize,
    /// Visited nodes kept in a walker's history.
    pub history_limit: usize,
    /// Run compiled bytecode for expressions that have it.
    pub use_bytecode: bool,
    /// Emit source location records when compiling.
    pub debug_info: bool,
    /// Seed for the `rand` actions. Entropy when unset.
    pub rng_seed: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            step_limit: 10_000,
            loop_limit: 10_000,
            history_limit: 200,
            use_bytecode: true,
            debug_info: true,
            rng_seed: None,
        }
    }
}

impl RuntimeConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.step_limit == 0 {
            return Err(Error::Config("step_limit must be > 0".to_string()));
        }
        if self.loop_limit == 0 {
            return Err(Error::Config("loop_limit must be > 0".to_string()));
        }
        if self.history_limit == 0 {
            return Err(Error::Config("history_limit must be > 0".to_string()));
        }
        Ok(())
    }

    /// Parse and validate a YAML document. Missing keys take their defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: RuntimeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RuntimeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.step_limit, 10_000);
        assert_eq!(config.history_limit, 200);
    }

    #[test]
    fn test_yaml_partial_override() {
        let config = RuntimeConfig::from_yaml("step_limit: 50\nrng_seed: 7\n").unwrap();
        assert_eq!(config.step_limit, 50);
        assert_eq!(config.rng_seed, Some(7));
        assert_eq!(config.loop_limit, 10_000);
        assert!(config.use_bytecode);
    }

    #[test]
    fn test_zero_limits_rejected() {
        let err = RuntimeConfig::from_yaml("loop_limit: 0").unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("loop_limit")));
        assert!(RuntimeConfig::from_yaml("step_limit: [").is_err());
    }
}
