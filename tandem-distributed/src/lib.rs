//! Identifier-addressed actor and trainer workers.
//!
//! # Workers
//! A [`RemoteActor`] or [`RemoteTrainer`] runs on its own thread and is
//! reached through messages only. It hosts any number of role instances keyed
//! by an [`Identifier`] derived from an (agent, strategy) pair, each built
//! from a [`WorkerConfig`] by the factories an [`AlgorithmRegistry`] holds for
//! the configured algorithm.
//!
//! # Managers
//! [`ActorManager`] and [`TrainerManager`] keep workers under manager-assigned
//! [`WorkerId`]s. Pushing data (construction, weights) does not wait for the
//! worker, reading data does.
//!
//! # Coordinator
//! [`Coordinator`] owns both managers and places allocation requests onto
//! workers with spare capacity through a [`MetaStrategy`], queueing what does
//! not fit.
mod actor_manager;
mod config;
mod coordinator;
mod error;
mod identifier;
mod registry;
pub mod remote;
mod roles;
mod trainer_manager;
pub use actor_manager::{ActorManager, ActorManagerConfig};
pub use config::{EnvStats, WorkerConfig};
pub use coordinator::{
    AgentToEnv, Allocation, Coordinator, CoordinatorConfig, Decision, EnvId, MetaStrategy,
    Placement, PoolConfig, PoolKind, RequestId,
};
pub use error::DistributedError;
pub use identifier::{get_identifier, AgentId, Identifier, StrategyId, WorkerId};
pub use registry::{
    ActorFactories, AlgorithmRegistry, CreateActor, CreateDataset, CreateLoss, CreateModel,
    CreateTrainer, TrainerFactories,
};
pub use remote::{Pending, RemoteActor, RemoteTrainer, StopSignal};
pub use roles::{ActorRole, Dataset, Loss, Model, TrainerRole, Weights};
pub use trainer_manager::{TrainerManager, TrainerManagerConfig};
