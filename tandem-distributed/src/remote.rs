//! Workers hosting role instances on their own threads.
//!
//! A worker owns all of its state and is reached through its mailbox only.
//! Instances inside a worker are addressed by [`Identifier`](crate::Identifier),
//! so one worker may host several (agent, strategy) pairs.
mod actor;
mod base;
mod trainer;
mod training_task;
pub use actor::{ActorMessage, ActorWorker, RemoteActor};
pub use base::{
    spawn, ConstructorCache, Flow, InstanceMap, Pending, RemoteHandle, Reply, StopSignal, Worker,
};
pub use trainer::{RemoteTrainer, TrainerMessage, TrainerWorker};
pub use training_task::{DatasetBuilder, SharedTrainer, TrainingTask};
