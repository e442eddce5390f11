//! Configuration handed to workers.
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of a role instance.
///
/// Sub-configurations are kept opaque and decoded by the factories of
/// `algorithm`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct WorkerConfig {
    /// Name of the algorithm in the [`AlgorithmRegistry`](crate::AlgorithmRegistry).
    pub algorithm: String,

    /// Model configuration.
    #[serde(default)]
    pub model: Value,

    /// Actor configuration.
    #[serde(default)]
    pub actor: Value,

    /// Trainer configuration.
    #[serde(default)]
    pub trainer: Value,

    /// Loss configuration.
    #[serde(default)]
    pub loss: Value,

    /// Dataset configuration.
    #[serde(default)]
    pub dataset: Value,
}

impl WorkerConfig {
    /// Creates a configuration with empty sub-configurations.
    pub fn new(algorithm: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            model: Value::Null,
            actor: Value::Null,
            trainer: Value::Null,
            loss: Value::Null,
            dataset: Value::Null,
        }
    }

    /// Sets the model configuration.
    pub fn model(mut self, v: Value) -> Self {
        self.model = v;
        self
    }

    /// Sets the actor configuration.
    pub fn actor(mut self, v: Value) -> Self {
        self.actor = v;
        self
    }

    /// Sets the trainer configuration.
    pub fn trainer(mut self, v: Value) -> Self {
        self.trainer = v;
        self
    }

    /// Sets the loss configuration.
    pub fn loss(mut self, v: Value) -> Self {
        self.loss = v;
        self
    }

    /// Sets the dataset configuration.
    pub fn dataset(mut self, v: Value) -> Self {
        self.dataset = v;
        self
    }

    /// Constructs [`WorkerConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`WorkerConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Static facts about the environment, passed to every factory.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct EnvStats {
    /// Number of environments stepped together.
    pub n_envs: usize,

    /// Number of agents acting in an environment.
    pub n_agents: usize,

    /// Shape of an observation.
    pub obs_shape: Vec<usize>,

    /// Dimension (or number) of actions.
    pub action_dim: usize,

    /// Step bound of an episode.
    pub max_episode_steps: Option<usize>,

    /// Frame skip of the environment.
    pub frame_skip: usize,
}

impl Default for EnvStats {
    fn default() -> Self {
        Self {
            n_envs: 1,
            n_agents: 1,
            obs_shape: vec![],
            action_dim: 0,
            max_episode_steps: None,
            frame_skip: 1,
        }
    }
}
