use crate::{ActorManagerConfig, TrainerManagerConfig};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Sizing of a worker pool.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PoolConfig {
    /// Workers spawned when the coordinator starts.
    ///
    /// The default value is 1.
    pub initial_workers: usize,

    /// Upper bound on the number of workers.
    ///
    /// The default value is 4.
    pub max_workers: usize,

    /// Requests a worker serves at once.
    ///
    /// The default value is 4.
    pub tenants_per_worker: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_workers: 1,
            max_workers: 4,
            tenants_per_worker: 4,
        }
    }
}

impl PoolConfig {
    /// Sets the number of initial workers.
    pub fn initial_workers(mut self, v: usize) -> Self {
        self.initial_workers = v;
        self
    }

    /// Sets the maximum number of workers.
    pub fn max_workers(mut self, v: usize) -> Self {
        self.max_workers = v;
        self
    }

    /// Sets the number of requests a worker serves.
    pub fn tenants_per_worker(mut self, v: usize) -> Self {
        self.tenants_per_worker = v;
        self
    }
}

/// Configuration of [`Coordinator`](super::Coordinator).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct CoordinatorConfig {
    /// Environment configuration, handed to the environment statistics
    /// resolver.
    #[serde(default)]
    pub env: Value,

    /// Actor manager configuration.
    #[serde(default)]
    pub actor_manager: ActorManagerConfig,

    /// Trainer manager configuration.
    #[serde(default)]
    pub trainer_manager: TrainerManagerConfig,

    /// Sizing of the actor pool.
    #[serde(default)]
    pub actor_pool: PoolConfig,

    /// Sizing of the trainer pool.
    #[serde(default)]
    pub trainer_pool: PoolConfig,
}

impl CoordinatorConfig {
    /// Sets the environment configuration.
    pub fn env(mut self, v: Value) -> Self {
        self.env = v;
        self
    }

    /// Sets the actor manager configuration.
    pub fn actor_manager(mut self, v: ActorManagerConfig) -> Self {
        self.actor_manager = v;
        self
    }

    /// Sets the trainer manager configuration.
    pub fn trainer_manager(mut self, v: TrainerManagerConfig) -> Self {
        self.trainer_manager = v;
        self
    }

    /// Sets the sizing of the actor pool.
    pub fn actor_pool(mut self, v: PoolConfig) -> Self {
        self.actor_pool = v;
        self
    }

    /// Sets the sizing of the trainer pool.
    pub fn trainer_pool(mut self, v: PoolConfig) -> Self {
        self.trainer_pool = v;
        self
    }

    /// Constructs [`CoordinatorConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`CoordinatorConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
