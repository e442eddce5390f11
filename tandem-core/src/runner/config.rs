//! Configuration of [`Runner`](super::Runner).
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// How a single call of [`Runner::run`](super::Runner::run) is budgeted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    /// Run a fixed number of steps.
    NSteps,

    /// Run until the trajectories end, bounded by the step budget.
    Traj,
}

/// Configuration of [`Runner`](super::Runner).
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct RunnerConfig {
    /// Run mode.
    pub run_mode: RunMode,

    /// Step budget of a run. Defaults to `max_episode_steps / frame_skip`.
    pub nsteps: Option<usize>,

    /// Number of leading environments whose episode statistics are recorded.
    /// All of them by default.
    pub record_envs: Option<usize>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            run_mode: RunMode::NSteps,
            nsteps: None,
            record_envs: None,
        }
    }
}

impl RunnerConfig {
    /// Sets the run mode.
    pub fn run_mode(mut self, v: RunMode) -> Self {
        self.run_mode = v;
        self
    }

    /// Sets the step budget.
    pub fn nsteps(mut self, v: usize) -> Self {
        self.nsteps = Some(v);
        self
    }

    /// Sets the number of recorded environments.
    pub fn record_envs(mut self, v: usize) -> Self {
        self.record_envs = Some(v);
        self
    }

    /// Constructs [`RunnerConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`RunnerConfig`].
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
    fn test_serde_runner_config() -> Result<()> {
        let config = RunnerConfig::default()
            .run_mode(RunMode::Traj)
            .nsteps(64)
            .record_envs(2);

        let dir = TempDir::new("runner_config")?;
        let path = dir.path().join("runner_config.yaml");
        config.save(&path)?;
        let config_ = RunnerConfig::load(&path)?;
        assert_eq!(config, config_);
        Ok(())
    }
}
