//! Placement of work onto actor and trainer workers.
mod base;
mod config;
mod meta_strategy;
pub use base::Coordinator;
pub use config::{CoordinatorConfig, PoolConfig};
pub use meta_strategy::{
    AgentToEnv, Allocation, Decision, EnvId, MetaStrategy, Placement, PoolKind, RequestId,
};
