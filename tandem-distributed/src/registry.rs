//! Name-keyed factories of role objects.
use crate::{ActorRole, Dataset, DistributedError, EnvStats, Loss, Model, TrainerRole};
use anyhow::Result;
use serde_yaml::Value;
use std::{collections::HashMap, sync::Arc};
use tandem_core::DataSource;

/// Builds a model from its configuration.
pub type CreateModel = fn(&Value, &EnvStats) -> Result<Box<dyn Model>>;

/// Wraps a model into an actor.
pub type CreateActor = fn(&Value, Box<dyn Model>) -> Result<Box<dyn ActorRole>>;

/// Builds a loss on a model.
pub type CreateLoss = fn(&Value, &dyn Model) -> Result<Box<dyn Loss>>;

/// Builds a trainer owning a model and a loss.
pub type CreateTrainer =
    fn(&Value, Box<dyn Model>, Box<dyn Loss>, &EnvStats) -> Result<Box<dyn TrainerRole>>;

/// Builds the dataset adapter a trainer reads a buffer through.
pub type CreateDataset = fn(&Value, Arc<dyn DataSource>, &EnvStats) -> Result<Box<dyn Dataset>>;

/// Factories used by actor workers.
#[derive(Clone, Copy)]
pub struct ActorFactories {
    /// Model factory.
    pub create_model: CreateModel,

    /// Actor factory.
    pub create_actor: CreateActor,
}

/// Factories used by trainer workers.
#[derive(Clone, Copy)]
pub struct TrainerFactories {
    /// Model factory.
    pub create_model: CreateModel,

    /// Loss factory.
    pub create_loss: CreateLoss,

    /// Trainer factory.
    pub create_trainer: CreateTrainer,

    /// Dataset factory.
    pub create_dataset: CreateDataset,
}

/// Algorithm name to factories.
///
/// Populated once at process start, then shared read-only by all workers.
#[derive(Default)]
pub struct AlgorithmRegistry {
    actors: HashMap<String, ActorFactories>,
    trainers: HashMap<String, TrainerFactories>,
}

impl AlgorithmRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the actor factories of an algorithm.
    pub fn register_actor(mut self, algorithm: impl Into<String>, factories: ActorFactories) -> Self {
        self.actors.insert(algorithm.into(), factories);
        self
    }

    /// Registers the trainer factories of an algorithm.
    pub fn register_trainer(
        mut self,
        algorithm: impl Into<String>,
        factories: TrainerFactories,
    ) -> Self {
        self.trainers.insert(algorithm.into(), factories);
        self
    }

    /// Looks up the actor factories of an algorithm.
    pub fn actor_factories(&self, algorithm: &str) -> Result<ActorFactories, DistributedError> {
        self.actors
            .get(algorithm)
            .copied()
            .ok_or_else(|| not_registered("actor", algorithm))
    }

    /// Looks up the trainer factories of an algorithm.
    pub fn trainer_factories(&self, algorithm: &str) -> Result<TrainerFactories, DistributedError> {
        self.trainers
            .get(algorithm)
            .copied()
            .ok_or_else(|| not_registered("trainer", algorithm))
    }
}

fn not_registered(role: &'static str, algorithm: &str) -> DistributedError {
    DistributedError::Construction {
        role,
        algorithm: algorithm.to_string(),
        reason: "algorithm is not registered".to_string(),
    }
}
