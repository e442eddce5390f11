use super::{
    AgentToEnv, Allocation, CoordinatorConfig, Decision, MetaStrategy, Placement, PoolConfig,
    PoolKind, RequestId,
};
use crate::{
    ActorManager, AlgorithmRegistry, DistributedError, EnvStats, TrainerManager, WorkerId,
};
use log::{info, warn};
use serde_yaml::Value;
use std::sync::Arc;

/// Owns the actor and trainer managers and decides where work runs.
///
/// Allocation never blocks: a request is either placed on a worker with
/// spare capacity or queued until capacity is released. Requests made before
/// [`Coordinator::start`] are always queued.
pub struct Coordinator {
    env_stats: EnvStats,
    actor_manager: ActorManager,
    trainer_manager: TrainerManager,
    meta_strategy: MetaStrategy,
    started: bool,
}

fn validate(kind: PoolKind, pool: &PoolConfig) -> Result<(), DistributedError> {
    if pool.tenants_per_worker == 0 {
        return Err(DistributedError::Config(format!(
            "{:?} pool: tenants_per_worker must be positive",
            kind
        )));
    }
    if pool.initial_workers > pool.max_workers {
        return Err(DistributedError::Config(format!(
            "{:?} pool: initial_workers ({}) exceeds max_workers ({})",
            kind, pool.initial_workers, pool.max_workers
        )));
    }
    Ok(())
}

impl Coordinator {
    /// Builds a coordinator.
    ///
    /// `resolve_env_stats` turns `config.env` into the [`EnvStats`] handed to
    /// every worker. No worker is spawned until [`Coordinator::start`].
    pub fn build(
        config: &CoordinatorConfig,
        registry: Arc<AlgorithmRegistry>,
        resolve_env_stats: impl FnOnce(&Value) -> anyhow::Result<EnvStats>,
    ) -> Result<Self, DistributedError> {
        validate(PoolKind::Actor, &config.actor_pool)?;
        validate(PoolKind::Trainer, &config.trainer_pool)?;
        let env_stats =
            resolve_env_stats(&config.env).map_err(|e| DistributedError::Config(e.to_string()))?;

        Ok(Self {
            actor_manager: ActorManager::build(
                &config.actor_manager,
                env_stats.clone(),
                registry.clone(),
            ),
            trainer_manager: TrainerManager::build(
                &config.trainer_manager,
                env_stats.clone(),
                registry,
            ),
            meta_strategy: MetaStrategy::new(&config.actor_pool, &config.trainer_pool),
            env_stats,
            started: false,
        })
    }

    /// Spawns the initial worker pools and places the queued requests that
    /// fit. Returns all current placements.
    ///
    /// Calling it again only logs a warning.
    pub fn start(&mut self) -> Vec<Placement> {
        if self.started {
            warn!("Coordinator has already started");
            return self.placements();
        }
        self.started = true;

        for kind in [PoolKind::Trainer, PoolKind::Actor] {
            for worker_id in self.meta_strategy.add_initial_workers(kind) {
                self.spawn_worker(kind, worker_id);
            }
            self.drain(kind);
        }
        info!(
            "Coordinator started with {} trainer and {} actor workers",
            self.trainer_manager.len(),
            self.actor_manager.len()
        );

        self.placements()
    }

    /// Returns `true` once [`Coordinator::start`] has run.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Requests a trainer worker for the agents of `agent_to_env`.
    pub fn allocate_worker(&mut self, agent_to_env: Option<AgentToEnv>) -> Allocation {
        self.allocate(PoolKind::Trainer, agent_to_env)
    }

    /// Requests an actor worker for the agents of `agent_to_env`.
    pub fn allocate_actor(&mut self, agent_to_env: Option<AgentToEnv>) -> Allocation {
        self.allocate(PoolKind::Actor, agent_to_env)
    }

    fn allocate(&mut self, kind: PoolKind, agent_to_env: Option<AgentToEnv>) -> Allocation {
        let request = self.meta_strategy.enqueue(kind, agent_to_env);
        if !self.started {
            info!("{:?} request {} queued before start", kind, request);
            return Allocation::Queued { request };
        }

        match self
            .drain(kind)
            .into_iter()
            .find(|p| p.request == request)
        {
            Some(p) => Allocation::Placed {
                request,
                worker_id: p.worker_id,
            },
            None => {
                info!("{:?} request {} queued", kind, request);
                Allocation::Queued { request }
            }
        }
    }

    /// Frees the capacity held by a request, or withdraws a queued one, and
    /// returns the placements this makes possible.
    pub fn release(
        &mut self,
        kind: PoolKind,
        request: RequestId,
    ) -> Result<Vec<Placement>, DistributedError> {
        self.meta_strategy.release(kind, request)?;
        info!("{:?} request {} released", kind, request);
        if !self.started {
            return Ok(vec![]);
        }
        Ok(self.drain(kind))
    }

    fn drain(&mut self, kind: PoolKind) -> Vec<Placement> {
        self.meta_strategy
            .drain(kind)
            .into_iter()
            .map(|Decision { placement, spawn }| {
                if spawn {
                    self.spawn_worker(kind, placement.worker_id);
                }
                info!(
                    "{:?} request {} placed on worker {}",
                    kind, placement.request, placement.worker_id
                );
                placement
            })
            .collect()
    }

    fn spawn_worker(&mut self, kind: PoolKind, worker_id: WorkerId) {
        match kind {
            PoolKind::Actor => self.actor_manager.spawn_worker(worker_id),
            PoolKind::Trainer => self.trainer_manager.spawn_worker(worker_id),
        }
    }

    /// Current placements, trainers first, each in request order.
    pub fn placements(&self) -> Vec<Placement> {
        let mut placements = self.meta_strategy.placements(PoolKind::Trainer);
        placements.extend(self.meta_strategy.placements(PoolKind::Actor));
        placements
    }

    /// Queued requests of a pool in FIFO order.
    pub fn queued(&self, kind: PoolKind) -> Vec<RequestId> {
        self.meta_strategy.queued(kind)
    }

    /// Environment statistics handed to workers.
    pub fn env_stats(&self) -> &EnvStats {
        &self.env_stats
    }

    /// The actor manager.
    pub fn actor_manager(&self) -> &ActorManager {
        &self.actor_manager
    }

    /// The actor manager, mutably.
    pub fn actor_manager_mut(&mut self) -> &mut ActorManager {
        &mut self.actor_manager
    }

    /// The trainer manager.
    pub fn trainer_manager(&self) -> &TrainerManager {
        &self.trainer_manager
    }

    /// The trainer manager, mutably.
    pub fn trainer_manager_mut(&mut self) -> &mut TrainerManager {
        &mut self.trainer_manager
    }

    /// Stops every worker of both managers.
    pub fn stop_and_join(&mut self) {
        self.trainer_manager.stop_and_join();
        self.actor_manager.stop_and_join();
    }
}
