//! Worker hosting inference-only actors.
use super::base::{
    respond, spawn, ConstructorCache, Flow, InstanceMap, Pending, RemoteHandle, Reply, Worker,
};
use crate::{
    get_identifier, ActorFactories, ActorRole, AgentId, AlgorithmRegistry, DistributedError,
    EnvStats, Identifier, StrategyId, Weights, WorkerConfig,
};
use log::{error, info};
use std::sync::Arc;
use tandem_core::record::Record;

/// Messages of [`ActorWorker`].
pub enum ActorMessage {
    /// Builds an actor from a configuration.
    Construct {
        config: WorkerConfig,
        id: Identifier,
        weights: Option<Weights>,
        reply: Reply<Identifier>,
    },

    /// Installs a prebuilt actor.
    SetActor {
        actor: Box<dyn ActorRole>,
        config: WorkerConfig,
        id: Identifier,
        reply: Reply<Identifier>,
    },

    /// Overwrites the weights of an actor.
    SetWeights {
        weights: Weights,
        id: Identifier,
        reply: Reply<()>,
    },

    /// Copies the weights of an actor.
    GetWeights { id: Identifier, reply: Reply<Weights> },

    /// Reads the auxiliary statistics of an actor.
    GetAuxiliaryStats { id: Identifier, reply: Reply<Record> },

    /// Reads the configuration an actor was built from.
    GetConfig { id: Identifier, reply: Reply<WorkerConfig> },

    /// Lists hosted identifiers.
    Identifiers { reply: Reply<Vec<Identifier>> },

    /// Ends the worker.
    Stop,
}

/// State of an actor worker thread.
pub struct ActorWorker {
    name: String,
    env_stats: EnvStats,
    constructors: ConstructorCache<ActorFactories>,
    actors: InstanceMap<Box<dyn ActorRole>>,
    configs: InstanceMap<WorkerConfig>,
}

impl ActorWorker {
    fn construct(
        &mut self,
        config: WorkerConfig,
        id: Identifier,
        weights: Option<Weights>,
    ) -> Result<Identifier, DistributedError> {
        let factories = self
            .constructors
            .get_or_resolve(&config.algorithm, |r, a| r.actor_factories(a))?;
        let failed = |reason: anyhow::Error| DistributedError::Construction {
            role: "actor",
            algorithm: config.algorithm.clone(),
            reason: reason.to_string(),
        };

        let model = (factories.create_model)(&config.model, &self.env_stats).map_err(failed)?;
        let mut actor = (factories.create_actor)(&config.actor, model).map_err(failed)?;
        if let Some(weights) = weights {
            actor.set_weights(weights).map_err(failed)?;
        }

        info!("{}: constructed actor {} of {}", self.name, id, config.algorithm);
        self.actors.insert(id, actor);
        self.configs.insert(id, config);
        Ok(id)
    }
}

impl Worker for ActorWorker {
    type Message = ActorMessage;

    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&mut self, message: ActorMessage) -> Flow {
        match message {
            ActorMessage::Construct {
                config,
                id,
                weights,
                reply,
            } => {
                let result = self.construct(config, id, weights);
                if let Err(e) = &result {
                    error!("{}: {}", self.name, e);
                }
                respond(reply, result);
            }
            ActorMessage::SetActor {
                actor,
                config,
                id,
                reply,
            } => {
                self.actors.insert(id, actor);
                self.configs.insert(id, config);
                info!("{}: installed actor {}", self.name, id);
                respond(reply, Ok(id));
            }
            ActorMessage::SetWeights { weights, id, reply } => {
                let result = self.actors.get_mut(&id).and_then(|a| {
                    a.set_weights(weights)
                        .map_err(|e| DistributedError::Role(e.to_string()))
                });
                respond(reply, result);
            }
            ActorMessage::GetWeights { id, reply } => {
                respond(reply, self.actors.get(&id).map(|a| a.get_weights()));
            }
            ActorMessage::GetAuxiliaryStats { id, reply } => {
                respond(reply, self.actors.get(&id).map(|a| a.get_auxiliary_stats()));
            }
            ActorMessage::GetConfig { id, reply } => {
                respond(reply, self.configs.get(&id).cloned());
            }
            ActorMessage::Identifiers { reply } => {
                respond(reply, Ok(self.actors.identifiers()));
            }
            ActorMessage::Stop => return Flow::Stop,
        }
        Flow::Continue
    }
}

/// Handle of an actor worker running on its own thread.
///
/// Every call returns immediately; calls returning data hand back a
/// [`Pending`] reply.
pub struct RemoteActor(RemoteHandle<ActorMessage>);

impl RemoteActor {
    /// Spawns an actor worker hosting no actor.
    pub fn spawn(name: impl Into<String>, env_stats: EnvStats, registry: Arc<AlgorithmRegistry>) -> Self {
        let worker = ActorWorker {
            name: name.into(),
            env_stats,
            constructors: ConstructorCache::new(registry),
            actors: InstanceMap::default(),
            configs: InstanceMap::default(),
        };
        Self(spawn(worker))
    }

    /// Name of the worker.
    pub fn name(&self) -> &str {
        self.0.name()
    }

    /// Builds model and actor of `config.algorithm`, stores the actor under
    /// the identifier of `(agent_id, strategy_id)` and applies `weights`.
    pub fn construct_actor_from_config(
        &self,
        config: WorkerConfig,
        agent_id: Option<AgentId>,
        strategy_id: Option<StrategyId>,
        weights: Option<Weights>,
    ) -> Pending<Identifier> {
        let id = get_identifier(agent_id, strategy_id);
        self.0.call(|reply| ActorMessage::Construct {
            config,
            id,
            weights,
            reply,
        })
    }

    /// Installs a prebuilt actor built from `config`.
    pub fn set_actor(
        &self,
        actor: Box<dyn ActorRole>,
        config: WorkerConfig,
        agent_id: Option<AgentId>,
        strategy_id: Option<StrategyId>,
    ) -> Pending<Identifier> {
        let id = get_identifier(agent_id, strategy_id);
        self.0.call(|reply| ActorMessage::SetActor {
            actor,
            config,
            id,
            reply,
        })
    }

    /// Overwrites the weights of an actor.
    pub fn set_weights(
        &self,
        weights: Weights,
        agent_id: Option<AgentId>,
        strategy_id: Option<StrategyId>,
    ) -> Pending<()> {
        let id = get_identifier(agent_id, strategy_id);
        self.0.call(|reply| ActorMessage::SetWeights { weights, id, reply })
    }

    /// Copies the weights of an actor.
    pub fn get_weights(&self, agent_id: Option<AgentId>, strategy_id: Option<StrategyId>) -> Pending<Weights> {
        let id = get_identifier(agent_id, strategy_id);
        self.0.call(|reply| ActorMessage::GetWeights { id, reply })
    }

    /// Reads the auxiliary statistics of an actor.
    pub fn get_auxiliary_stats(
        &self,
        agent_id: Option<AgentId>,
        strategy_id: Option<StrategyId>,
    ) -> Pending<Record> {
        let id = get_identifier(agent_id, strategy_id);
        self.0.call(|reply| ActorMessage::GetAuxiliaryStats { id, reply })
    }

    /// Reads the configuration an actor was built from.
    pub fn get_config(&self, agent_id: Option<AgentId>, strategy_id: Option<StrategyId>) -> Pending<WorkerConfig> {
        let id = get_identifier(agent_id, strategy_id);
        self.0.call(|reply| ActorMessage::GetConfig { id, reply })
    }

    /// Lists hosted identifiers.
    pub fn identifiers(&self) -> Pending<Vec<Identifier>> {
        self.0.call(|reply| ActorMessage::Identifiers { reply })
    }

    /// Returns `true` if the worker thread has exited.
    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }

    /// Stops the worker and waits for its thread.
    pub fn stop_and_join(&mut self) {
        self.0.stop_and_join(ActorMessage::Stop)
    }
}
