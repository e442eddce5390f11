use crate::{
    remote::RemoteActor, ActorManagerConfig, ActorRole, AgentId, AlgorithmRegistry,
    DistributedError, EnvStats, Identifier, Pending, StrategyId, Weights, WorkerConfig, WorkerId,
};
use log::{info, warn};
use std::{collections::BTreeMap, sync::Arc};
use tandem_core::record::Record;

/// Manages actor workers keyed by [`WorkerId`].
///
/// Calls that only push data (construction, weights) return without waiting
/// for the worker; calls that read data block on the reply.
pub struct ActorManager {
    config: ActorManagerConfig,
    env_stats: EnvStats,
    registry: Arc<AlgorithmRegistry>,
    actors: BTreeMap<WorkerId, RemoteActor>,
}

impl ActorManager {
    /// Builds a manager with no worker.
    pub fn build(
        config: &ActorManagerConfig,
        env_stats: EnvStats,
        registry: Arc<AlgorithmRegistry>,
    ) -> Self {
        Self {
            config: config.clone(),
            env_stats,
            registry,
            actors: BTreeMap::new(),
        }
    }

    fn actor(&self, actor_id: WorkerId) -> Result<&RemoteActor, DistributedError> {
        self.actors
            .get(&actor_id)
            .ok_or(DistributedError::UnknownWorker(actor_id))
    }

    /// Spawns a worker hosting no actor.
    ///
    /// An existing worker with the same id is kept.
    pub fn spawn_worker(&mut self, actor_id: WorkerId) {
        if self.actors.contains_key(&actor_id) {
            warn!("Actor worker {} already exists", actor_id);
            return;
        }
        let name = format!("{}-{}", self.config.name_prefix, actor_id);
        let actor = RemoteActor::spawn(name, self.env_stats.clone(), self.registry.clone());
        self.actors.insert(actor_id, actor);
        info!("Spawned actor worker {}", actor_id);
    }

    /// Spawns a worker and issues the construction of an actor on it without
    /// waiting. Construction failures are logged by the worker.
    pub fn add_remote_actor(
        &mut self,
        actor_id: WorkerId,
        config: WorkerConfig,
        agent_id: Option<AgentId>,
        strategy_id: Option<StrategyId>,
        weights: Option<Weights>,
    ) -> Result<(), DistributedError> {
        self.spawn_worker(actor_id);
        // The reply is dropped; the worker logs failures.
        let _ = self.construct_on(actor_id, config, agent_id, strategy_id, weights)?;
        Ok(())
    }

    /// Issues the construction of another actor on an existing worker.
    pub fn construct_on(
        &self,
        actor_id: WorkerId,
        config: WorkerConfig,
        agent_id: Option<AgentId>,
        strategy_id: Option<StrategyId>,
        weights: Option<Weights>,
    ) -> Result<Pending<Identifier>, DistributedError> {
        Ok(self
            .actor(actor_id)?
            .construct_actor_from_config(config, agent_id, strategy_id, weights))
    }

    /// Installs a prebuilt actor on an existing worker without waiting.
    pub fn set_actor(
        &self,
        actor_id: WorkerId,
        actor: Box<dyn ActorRole>,
        config: WorkerConfig,
        agent_id: Option<AgentId>,
        strategy_id: Option<StrategyId>,
    ) -> Result<(), DistributedError> {
        let _ = self
            .actor(actor_id)?
            .set_actor(actor, config, agent_id, strategy_id);
        Ok(())
    }

    /// Forwards weights to an actor without waiting.
    pub fn set_actor_weights(
        &self,
        actor_id: WorkerId,
        weights: Weights,
        agent_id: Option<AgentId>,
        strategy_id: Option<StrategyId>,
    ) -> Result<(), DistributedError> {
        let _ = self.actor(actor_id)?.set_weights(weights, agent_id, strategy_id);
        Ok(())
    }

    /// Reads the weights of an actor.
    pub fn get_actor_weights(
        &self,
        actor_id: WorkerId,
        agent_id: Option<AgentId>,
        strategy_id: Option<StrategyId>,
    ) -> Result<Weights, DistributedError> {
        self.actor(actor_id)?.get_weights(agent_id, strategy_id).wait()
    }

    /// Reads the auxiliary statistics of an actor.
    pub fn get_auxiliary_stats(
        &self,
        actor_id: WorkerId,
        agent_id: Option<AgentId>,
        strategy_id: Option<StrategyId>,
    ) -> Result<Record, DistributedError> {
        self.actor(actor_id)?
            .get_auxiliary_stats(agent_id, strategy_id)
            .wait()
    }

    /// Lists the identifiers hosted by a worker.
    pub fn identifiers(&self, actor_id: WorkerId) -> Result<Vec<Identifier>, DistributedError> {
        self.actor(actor_id)?.identifiers().wait()
    }

    /// Ids of the managed workers.
    pub fn worker_ids(&self) -> Vec<WorkerId> {
        self.actors.keys().copied().collect()
    }

    /// Number of managed workers.
    pub fn len(&self) -> usize {
        self.actors.len()
    }

    /// Returns `true` if there is no worker.
    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// Stops all workers and waits for their threads.
    pub fn stop_and_join(&mut self) {
        for (_, mut actor) in std::mem::take(&mut self.actors) {
            actor.stop_and_join();
        }
    }
}

impl Drop for ActorManager {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
