//! Configuration of [`CollectTrainLoop`](super::CollectTrainLoop).
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`CollectTrainLoop`](super::CollectTrainLoop).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct CollectTrainConfig {
    /// Environment steps after which training stops.
    pub max_steps: usize,

    /// Interval of flushing records in optimization steps.
    pub log_period: usize,

    /// Random-action rollouts seeding the running statistics.
    pub n_warmup_rollouts: usize,
}

impl Default for CollectTrainConfig {
    fn default() -> Self {
        Self {
            max_steps: 1_000_000,
            log_period: 1000,
            n_warmup_rollouts: 10,
        }
    }
}

impl CollectTrainConfig {
    /// Sets the number of environment steps.
    pub fn max_steps(mut self, v: usize) -> Self {
        self.max_steps = v;
        self
    }

    /// Sets the interval of flushing records in optimization steps.
    pub fn log_period(mut self, v: usize) -> Self {
        self.log_period = v;
        self
    }

    /// Sets the number of warm-up rollouts.
    pub fn n_warmup_rollouts(mut self, v: usize) -> Self {
        self.n_warmup_rollouts = v;
        self
    }

    /// Constructs [`CollectTrainConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`CollectTrainConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_serde_collect_train_config() -> Result<()> {
        let config = CollectTrainConfig::default()
            .max_steps(5000)
            .log_period(10)
            .n_warmup_rollouts(3);

        let dir = TempDir::new("collect_train_config")?;
        let path = dir.path().join("collect_train_config.yaml");
        config.save(&path)?;
        assert_eq!(CollectTrainConfig::load(&path)?, config);
        Ok(())
    }
}
