//! Worker hosting trainers and their training tasks.
use super::{
    base::{respond, spawn, ConstructorCache, Flow, InstanceMap, Pending, RemoteHandle, Reply, Worker},
    training_task::{SharedTrainer, TrainingTask},
};
use crate::{
    get_identifier, AgentId, AlgorithmRegistry, DistributedError, EnvStats, Identifier,
    StrategyId, TrainerFactories, TrainerRole, Weights, WorkerConfig,
};
use log::{error, info, warn};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tandem_core::{
    record::{Record, RecordSummary},
    DataSource,
};

/// Messages of [`TrainerWorker`].
pub enum TrainerMessage {
    /// Builds a trainer from a configuration.
    Construct {
        config: WorkerConfig,
        id: Identifier,
        weights: Option<Weights>,
        reply: Reply<Identifier>,
    },

    /// Installs a prebuilt trainer.
    SetTrainer {
        trainer: Box<dyn TrainerRole>,
        config: WorkerConfig,
        id: Identifier,
        reply: Reply<Identifier>,
    },

    /// Overwrites the weights of a trainer.
    SetWeights {
        weights: Weights,
        id: Identifier,
        reply: Reply<()>,
    },

    /// Copies the weights of a trainer.
    GetWeights { id: Identifier, reply: Reply<Weights> },

    /// Reads the optimization step and the weights at once.
    GetTrainStepWeights {
        id: Identifier,
        reply: Reply<(usize, Weights)>,
    },

    /// Reads the optimization step and the records aggregated since the
    /// previous call.
    GetStats {
        id: Identifier,
        reply: Reply<(usize, Record)>,
    },

    /// Reads the configuration a trainer was built from.
    GetConfig { id: Identifier, reply: Reply<WorkerConfig> },

    /// Lists hosted identifiers.
    Identifiers { reply: Reply<Vec<Identifier>> },

    /// Attaches the buffer training reads from.
    AssociateBuffer {
        source: Arc<dyn DataSource>,
        reply: Reply<()>,
    },

    /// Starts the training task of a trainer.
    StartTraining { id: Identifier, reply: Reply<()> },

    /// Stops the training task of a trainer.
    StopTraining { id: Identifier, reply: Reply<()> },

    /// Stops all training tasks and ends the worker.
    Stop,
}

/// State of a trainer worker thread.
pub struct TrainerWorker {
    name: String,
    env_stats: EnvStats,
    poll_interval: Duration,
    constructors: ConstructorCache<TrainerFactories>,
    trainers: InstanceMap<SharedTrainer>,
    configs: InstanceMap<WorkerConfig>,
    stats: InstanceMap<Arc<Mutex<RecordSummary>>>,
    tasks: InstanceMap<TrainingTask>,
    buffer: Option<Arc<dyn DataSource>>,
}

impl TrainerWorker {
    fn construct(
        &mut self,
        config: WorkerConfig,
        id: Identifier,
        weights: Option<Weights>,
    ) -> Result<Identifier, DistributedError> {
        let factories = self
            .constructors
            .get_or_resolve(&config.algorithm, |r, a| r.trainer_factories(a))?;
        let failed = |reason: anyhow::Error| DistributedError::Construction {
            role: "trainer",
            algorithm: config.algorithm.clone(),
            reason: reason.to_string(),
        };

        let model = (factories.create_model)(&config.model, &self.env_stats).map_err(failed)?;
        let loss = (factories.create_loss)(&config.loss, &*model).map_err(failed)?;
        let mut trainer = (factories.create_trainer)(&config.trainer, model, loss, &self.env_stats)
            .map_err(failed)?;
        if let Some(weights) = weights {
            trainer.set_weights(weights).map_err(failed)?;
        }

        info!("{}: constructed trainer {} of {}", self.name, id, config.algorithm);
        self.install(trainer, config, id);
        Ok(id)
    }

    fn install(&mut self, trainer: Box<dyn TrainerRole>, config: WorkerConfig, id: Identifier) {
        if let Some(mut task) = self.tasks.remove(&id) {
            warn!("{}: replacing trainer {} stops its training", self.name, id);
            task.stop_and_join();
        }
        self.trainers.insert(id, Arc::new(Mutex::new(trainer)));
        self.configs.insert(id, config);
        self.stats.insert(id, Arc::new(Mutex::new(RecordSummary::new())));
    }

    fn with_trainer<T>(
        &self,
        id: &Identifier,
        f: impl FnOnce(&mut Box<dyn TrainerRole>) -> T,
    ) -> Result<T, DistributedError> {
        let mut trainer = self
            .trainers
            .get(id)?
            .lock()
            .map_err(|_| DistributedError::Poisoned(*id))?;
        Ok(f(&mut *trainer))
    }

    fn get_stats(&self, id: &Identifier) -> Result<(usize, Record), DistributedError> {
        let train_step = self.with_trainer(id, |t| t.train_step())?;
        let record = self
            .stats
            .get(id)?
            .lock()
            .map_err(|_| DistributedError::Poisoned(*id))?
            .aggregate();
        Ok((train_step, record))
    }

    fn start_training(&mut self, id: Identifier) -> Result<(), DistributedError> {
        let source = match &self.buffer {
            Some(source) => source.clone(),
            None => {
                return Err(DistributedError::Precondition(
                    "no buffer is associated with the trainer".to_string(),
                ))
            }
        };
        let trainer = self.trainers.get(&id)?.clone();
        let stats = self.stats.get(&id)?.clone();
        let config = self.configs.get(&id)?.clone();

        if let Ok(task) = self.tasks.get(&id) {
            if !task.is_finished() {
                warn!("{}: trainer {} is already training", self.name, id);
                return Ok(());
            }
        }

        let factories = self
            .constructors
            .get_or_resolve(&config.algorithm, |r, a| r.trainer_factories(a))?;
        let env_stats = self.env_stats.clone();
        let dataset = Box::new(move || {
            (factories.create_dataset)(&config.dataset, source, &env_stats)
        });

        let task = TrainingTask::spawn(
            format!("{}/{}", self.name, id),
            trainer,
            dataset,
            self.poll_interval,
            stats,
        );
        if let Some(mut old) = self.tasks.insert(id, task) {
            old.stop_and_join();
        }
        Ok(())
    }

    fn stop_training(&mut self, id: Identifier) -> Result<(), DistributedError> {
        if !self.trainers.contains(&id) {
            return Err(DistributedError::UnknownIdentifier(id));
        }
        if let Some(mut task) = self.tasks.remove(&id) {
            task.stop_and_join();
        }
        Ok(())
    }
}

impl Worker for TrainerWorker {
    type Message = TrainerMessage;

    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&mut self, message: TrainerMessage) -> Flow {
        match message {
            TrainerMessage::Construct {
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
            TrainerMessage::SetTrainer {
                trainer,
                config,
                id,
                reply,
            } => {
                self.install(trainer, config, id);
                info!("{}: installed trainer {}", self.name, id);
                respond(reply, Ok(id));
            }
            TrainerMessage::SetWeights { weights, id, reply } => {
                let result = self
                    .with_trainer(&id, |t| t.set_weights(weights))
                    .and_then(|r| r.map_err(|e| DistributedError::Role(e.to_string())));
                respond(reply, result);
            }
            TrainerMessage::GetWeights { id, reply } => {
                respond(reply, self.with_trainer(&id, |t| t.get_weights()));
            }
            TrainerMessage::GetTrainStepWeights { id, reply } => {
                let result = self.with_trainer(&id, |t| (t.train_step(), t.get_weights()));
                respond(reply, result);
            }
            TrainerMessage::GetStats { id, reply } => {
                respond(reply, self.get_stats(&id));
            }
            TrainerMessage::GetConfig { id, reply } => {
                respond(reply, self.configs.get(&id).cloned());
            }
            TrainerMessage::Identifiers { reply } => {
                respond(reply, Ok(self.trainers.identifiers()));
            }
            TrainerMessage::AssociateBuffer { source, reply } => {
                self.buffer = Some(source);
                respond(reply, Ok(()));
            }
            TrainerMessage::StartTraining { id, reply } => {
                let result = self.start_training(id);
                let fatal = matches!(result, Err(DistributedError::Precondition(_)));
                if let Err(e) = &result {
                    error!("{}: cannot start training {}: {}", self.name, id, e);
                }
                respond(reply, result);
                if fatal {
                    return Flow::Stop;
                }
            }
            TrainerMessage::StopTraining { id, reply } => {
                respond(reply, self.stop_training(id));
            }
            TrainerMessage::Stop => return Flow::Stop,
        }
        Flow::Continue
    }

    fn on_stop(&mut self) {
        self.tasks.values_mut().for_each(|task| task.stop_and_join());
    }
}

/// Handle of a trainer worker running on its own thread.
pub struct RemoteTrainer(RemoteHandle<TrainerMessage>);

impl RemoteTrainer {
    /// Spawns a trainer worker hosting no trainer.
    ///
    /// Its training tasks poll datasets every `poll_interval`.
    pub fn spawn(
        name: impl Into<String>,
        env_stats: EnvStats,
        registry: Arc<AlgorithmRegistry>,
        poll_interval: Duration,
    ) -> Self {
        let worker = TrainerWorker {
            name: name.into(),
            env_stats,
            poll_interval,
            constructors: ConstructorCache::new(registry),
            trainers: InstanceMap::default(),
            configs: InstanceMap::default(),
            stats: InstanceMap::default(),
            tasks: InstanceMap::default(),
            buffer: None,
        };
        Self(spawn(worker))
    }

    /// Name of the worker.
    pub fn name(&self) -> &str {
        self.0.name()
    }

    /// Builds model, loss and trainer of `config.algorithm`, in that order,
    /// stores the trainer under the identifier of `(agent_id, strategy_id)`
    /// and applies `weights`.
    pub fn construct_trainer_from_config(
        &self,
        config: WorkerConfig,
        agent_id: Option<AgentId>,
        strategy_id: Option<StrategyId>,
        weights: Option<Weights>,
    ) -> Pending<Identifier> {
        let id = get_identifier(agent_id, strategy_id);
        self.0.call(|reply| TrainerMessage::Construct {
            config,
            id,
            weights,
            reply,
        })
    }

    /// Installs a prebuilt trainer; `config` names the algorithm whose
    /// dataset factory training uses.
    pub fn set_trainer(
        &self,
        trainer: Box<dyn TrainerRole>,
        config: WorkerConfig,
        agent_id: Option<AgentId>,
        strategy_id: Option<StrategyId>,
    ) -> Pending<Identifier> {
        let id = get_identifier(agent_id, strategy_id);
        self.0.call(|reply| TrainerMessage::SetTrainer {
            trainer,
            config,
            id,
            reply,
        })
    }

    /// Overwrites the weights of a trainer.
    pub fn set_weights(
        &self,
        weights: Weights,
        agent_id: Option<AgentId>,
        strategy_id: Option<StrategyId>,
    ) -> Pending<()> {
        let id = get_identifier(agent_id, strategy_id);
        self.0.call(|reply| TrainerMessage::SetWeights { weights, id, reply })
    }

    /// Copies the weights of a trainer.
    pub fn get_weights(&self, agent_id: Option<AgentId>, strategy_id: Option<StrategyId>) -> Pending<Weights> {
        let id = get_identifier(agent_id, strategy_id);
        self.0.call(|reply| TrainerMessage::GetWeights { id, reply })
    }

    /// Reads the optimization step and the weights of a trainer together.
    pub fn get_train_step_weights(
        &self,
        agent_id: Option<AgentId>,
        strategy_id: Option<StrategyId>,
    ) -> Pending<(usize, Weights)> {
        let id = get_identifier(agent_id, strategy_id);
        self.0.call(|reply| TrainerMessage::GetTrainStepWeights { id, reply })
    }

    /// Reads the optimization step and the training records aggregated since
    /// the previous call.
    pub fn get_stats(
        &self,
        agent_id: Option<AgentId>,
        strategy_id: Option<StrategyId>,
    ) -> Pending<(usize, Record)> {
        let id = get_identifier(agent_id, strategy_id);
        self.0.call(|reply| TrainerMessage::GetStats { id, reply })
    }

    /// Reads the configuration a trainer was built from.
    pub fn get_config(&self, agent_id: Option<AgentId>, strategy_id: Option<StrategyId>) -> Pending<WorkerConfig> {
        let id = get_identifier(agent_id, strategy_id);
        self.0.call(|reply| TrainerMessage::GetConfig { id, reply })
    }

    /// Lists hosted identifiers.
    pub fn identifiers(&self) -> Pending<Vec<Identifier>> {
        self.0.call(|reply| TrainerMessage::Identifiers { reply })
    }

    /// Attaches the buffer every training task of the worker reads from.
    pub fn associate_buffer(&self, source: Arc<dyn DataSource>) -> Pending<()> {
        self.0.call(|reply| TrainerMessage::AssociateBuffer { source, reply })
    }

    /// Starts the training task of a trainer.
    ///
    /// Starting without an associated buffer fails with
    /// [`DistributedError::Precondition`] and shuts the worker down.
    pub fn start_training(&self, agent_id: Option<AgentId>, strategy_id: Option<StrategyId>) -> Pending<()> {
        let id = get_identifier(agent_id, strategy_id);
        self.0.call(|reply| TrainerMessage::StartTraining { id, reply })
    }

    /// Stops the training task of a trainer and waits for it.
    pub fn stop_training(&self, agent_id: Option<AgentId>, strategy_id: Option<StrategyId>) -> Pending<()> {
        let id = get_identifier(agent_id, strategy_id);
        self.0.call(|reply| TrainerMessage::StopTraining { id, reply })
    }

    /// Returns `true` if the worker thread has exited.
    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }

    /// Stops all training tasks and the worker, and waits for its thread.
    pub fn stop_and_join(&mut self) {
        self.0.stop_and_join(TrainerMessage::Stop)
    }
}
