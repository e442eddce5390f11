use crate::{
    remote::RemoteTrainer, AgentId, AlgorithmRegistry, DistributedError, EnvStats, Identifier,
    Pending, StrategyId, TrainerManagerConfig, TrainerRole, Weights, WorkerConfig, WorkerId,
};
use log::{info, warn};
use std::{collections::BTreeMap, sync::Arc};
use tandem_core::{record::Record, DataSource};

/// Manages trainer workers keyed by [`WorkerId`].
pub struct TrainerManager {
    config: TrainerManagerConfig,
    env_stats: EnvStats,
    registry: Arc<AlgorithmRegistry>,
    trainers: BTreeMap<WorkerId, RemoteTrainer>,
}

impl TrainerManager {
    /// Builds a manager with no worker.
    pub fn build(
        config: &TrainerManagerConfig,
        env_stats: EnvStats,
        registry: Arc<AlgorithmRegistry>,
    ) -> Self {
        Self {
            config: config.clone(),
            env_stats,
            registry,
            trainers: BTreeMap::new(),
        }
    }

    fn trainer(&self, trainer_id: WorkerId) -> Result<&RemoteTrainer, DistributedError> {
        self.trainers
            .get(&trainer_id)
            .ok_or(DistributedError::UnknownWorker(trainer_id))
    }

    /// Spawns a worker hosting no trainer.
    ///
    /// An existing worker with the same id is kept.
    pub fn spawn_worker(&mut self, trainer_id: WorkerId) {
        if self.trainers.contains_key(&trainer_id) {
            warn!("Trainer worker {} already exists", trainer_id);
            return;
        }
        let name = format!("{}-{}", self.config.name_prefix, trainer_id);
        let trainer = RemoteTrainer::spawn(
            name,
            self.env_stats.clone(),
            self.registry.clone(),
            self.config.poll_interval(),
        );
        self.trainers.insert(trainer_id, trainer);
        info!("Spawned trainer worker {}", trainer_id);
    }

    /// Spawns a worker and issues the construction of a trainer on it without
    /// waiting. Construction failures are logged by the worker.
    pub fn add_trainer(
        &mut self,
        trainer_id: WorkerId,
        config: WorkerConfig,
        agent_id: Option<AgentId>,
        strategy_id: Option<StrategyId>,
        weights: Option<Weights>,
    ) -> Result<(), DistributedError> {
        self.spawn_worker(trainer_id);
        let _ = self.construct_on(trainer_id, config, agent_id, strategy_id, weights)?;
        Ok(())
    }

    /// Issues the construction of another trainer on an existing worker.
    pub fn construct_on(
        &self,
        trainer_id: WorkerId,
        config: WorkerConfig,
        agent_id: Option<AgentId>,
        strategy_id: Option<StrategyId>,
        weights: Option<Weights>,
    ) -> Result<Pending<Identifier>, DistributedError> {
        Ok(self
            .trainer(trainer_id)?
            .construct_trainer_from_config(config, agent_id, strategy_id, weights))
    }

    /// Installs a prebuilt trainer on an existing worker without waiting.
    pub fn set_trainer(
        &self,
        trainer_id: WorkerId,
        trainer: Box<dyn TrainerRole>,
        config: WorkerConfig,
        agent_id: Option<AgentId>,
        strategy_id: Option<StrategyId>,
    ) -> Result<(), DistributedError> {
        let _ = self
            .trainer(trainer_id)?
            .set_trainer(trainer, config, agent_id, strategy_id);
        Ok(())
    }

    /// Forwards weights to a trainer without waiting.
    pub fn set_trainer_weights(
        &self,
        trainer_id: WorkerId,
        weights: Weights,
        agent_id: Option<AgentId>,
        strategy_id: Option<StrategyId>,
    ) -> Result<(), DistributedError> {
        let _ = self
            .trainer(trainer_id)?
            .set_weights(weights, agent_id, strategy_id);
        Ok(())
    }

    /// Reads the optimization step and the weights of a trainer together.
    pub fn get_train_step_weights(
        &self,
        trainer_id: WorkerId,
        agent_id: Option<AgentId>,
        strategy_id: Option<StrategyId>,
    ) -> Result<(usize, Weights), DistributedError> {
        self.trainer(trainer_id)?
            .get_train_step_weights(agent_id, strategy_id)
            .wait()
    }

    /// Reads the optimization step and the training records aggregated since
    /// the previous call.
    pub fn get_stats(
        &self,
        trainer_id: WorkerId,
        agent_id: Option<AgentId>,
        strategy_id: Option<StrategyId>,
    ) -> Result<(usize, Record), DistributedError> {
        self.trainer(trainer_id)?
            .get_stats(agent_id, strategy_id)
            .wait()
    }

    /// Attaches the buffer the trainers of a worker read from.
    pub fn associate_buffer(
        &self,
        trainer_id: WorkerId,
        source: Arc<dyn DataSource>,
    ) -> Result<(), DistributedError> {
        self.trainer(trainer_id)?.associate_buffer(source).wait()
    }

    /// Starts the training task of a trainer.
    ///
    /// Fails with [`DistributedError::Precondition`] when no buffer is
    /// associated, after which the worker is gone.
    pub fn start_training(
        &self,
        trainer_id: WorkerId,
        agent_id: Option<AgentId>,
        strategy_id: Option<StrategyId>,
    ) -> Result<(), DistributedError> {
        self.trainer(trainer_id)?
            .start_training(agent_id, strategy_id)
            .wait()
    }

    /// Stops the training task of a trainer and waits for it.
    pub fn stop_training(
        &self,
        trainer_id: WorkerId,
        agent_id: Option<AgentId>,
        strategy_id: Option<StrategyId>,
    ) -> Result<(), DistributedError> {
        self.trainer(trainer_id)?
            .stop_training(agent_id, strategy_id)
            .wait()
    }

    /// Lists the identifiers hosted by a worker.
    pub fn identifiers(&self, trainer_id: WorkerId) -> Result<Vec<Identifier>, DistributedError> {
        self.trainer(trainer_id)?.identifiers().wait()
    }

    /// Ids of the managed workers.
    pub fn worker_ids(&self) -> Vec<WorkerId> {
        self.trainers.keys().copied().collect()
    }

    /// Number of managed workers.
    pub fn len(&self) -> usize {
        self.trainers.len()
    }

    /// Returns `true` if there is no worker.
    pub fn is_empty(&self) -> bool {
        self.trainers.is_empty()
    }

    /// Stops all training tasks and workers and waits for their threads.
    pub fn stop_and_join(&mut self) {
        for (_, mut trainer) in std::mem::take(&mut self.trainers) {
            trainer.stop_and_join();
        }
    }
}

impl Drop for TrainerManager {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
