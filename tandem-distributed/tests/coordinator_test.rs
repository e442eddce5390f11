use anyhow::Result;
use serde_yaml::Value;
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tandem_core::{record::Record, DataSource};
use tandem_distributed::{
    get_identifier, ActorFactories, ActorManager, ActorManagerConfig, ActorRole,
    AlgorithmRegistry, Allocation, Coordinator, CoordinatorConfig, Dataset, DistributedError,
    EnvStats, Loss, Model, PoolConfig, PoolKind, RemoteActor, TrainerFactories, TrainerManager,
    TrainerManagerConfig, TrainerRole, Weights, WorkerConfig,
};
use test_log::test;

fn weights_of(v: f32, size: usize) -> Weights {
    [("pi", vec![v; size]), ("vf", vec![v; size])]
        .into_iter()
        .collect()
}

struct MockModel(Weights);

impl Model for MockModel {
    fn get_weights(&self) -> Weights {
        self.0.clone()
    }

    fn set_weights(&mut self, weights: Weights) -> Result<()> {
        self.0 = weights;
        Ok(())
    }
}

fn create_model(config: &Value, env_stats: &EnvStats) -> Result<Box<dyn Model>> {
    let size = config
        .get("size")
        .and_then(Value::as_u64)
        .map_or(env_stats.action_dim, |s| s as usize);
    Ok(Box::new(MockModel(weights_of(0.0, size))))
}

fn broken_model(_: &Value, _: &EnvStats) -> Result<Box<dyn Model>> {
    Err(anyhow::anyhow!("bad model"))
}

struct MockActor {
    model: Box<dyn Model>,
    n_sets: usize,
}

impl ActorRole for MockActor {
    fn get_weights(&self) -> Weights {
        self.model.get_weights()
    }

    fn set_weights(&mut self, weights: Weights) -> Result<()> {
        self.n_sets += 1;
        self.model.set_weights(weights)
    }

    fn get_auxiliary_stats(&self) -> Record {
        Record::from_scalar("n_sets", self.n_sets as f32)
    }
}

fn create_actor(_: &Value, model: Box<dyn Model>) -> Result<Box<dyn ActorRole>> {
    Ok(Box::new(MockActor { model, n_sets: 0 }))
}

struct MockLoss;

impl Loss for MockLoss {
    fn name(&self) -> &str {
        "mock"
    }
}

fn create_loss(_: &Value, _: &dyn Model) -> Result<Box<dyn Loss>> {
    Ok(Box::new(MockLoss))
}

/// Sets every parameter to the number of steps done.
struct MockTrainer {
    model: Box<dyn Model>,
    size: usize,
    step: usize,
}

impl TrainerRole for MockTrainer {
    fn get_weights(&self) -> Weights {
        self.model.get_weights()
    }

    fn set_weights(&mut self, weights: Weights) -> Result<()> {
        self.model.set_weights(weights)
    }

    fn train_record(&mut self, dataset: &mut dyn Dataset) -> Result<Record> {
        assert!(dataset.good_to_learn());
        self.step += 1;
        let mut weights = self.model.get_weights();
        weights.insert("pi", vec![self.step as f32; self.size]);
        self.model.set_weights(weights.clone())?;
        weights.insert("vf", vec![self.step as f32; self.size]);
        self.model.set_weights(weights)?;
        Ok(Record::from_scalar("loss", 1.0 / self.step as f32))
    }

    fn train_step(&self) -> usize {
        self.step
    }
}

fn create_trainer(
    _: &Value,
    model: Box<dyn Model>,
    _: Box<dyn Loss>,
    env_stats: &EnvStats,
) -> Result<Box<dyn TrainerRole>> {
    Ok(Box::new(MockTrainer {
        model,
        size: env_stats.action_dim,
        step: 0,
    }))
}

struct MockDataset {
    source: Arc<dyn DataSource>,
    min_len: usize,
}

impl Dataset for MockDataset {
    fn good_to_learn(&self) -> bool {
        self.source.len() >= self.min_len
    }
}

fn create_dataset(
    config: &Value,
    source: Arc<dyn DataSource>,
    _: &EnvStats,
) -> Result<Box<dyn Dataset>> {
    let min_len = config.get("min_len").and_then(Value::as_u64).unwrap_or(1) as usize;
    Ok(Box::new(MockDataset { source, min_len }))
}

#[derive(Default)]
struct Counter(AtomicUsize);

impl DataSource for Counter {
    fn len(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

fn registry() -> Arc<AlgorithmRegistry> {
    let registry = AlgorithmRegistry::new()
        .register_actor(
            "mock",
            ActorFactories {
                create_model,
                create_actor,
            },
        )
        .register_actor(
            "broken",
            ActorFactories {
                create_model: broken_model,
                create_actor,
            },
        )
        .register_trainer(
            "mock",
            TrainerFactories {
                create_model,
                create_loss,
                create_trainer,
                create_dataset,
            },
        );
    Arc::new(registry)
}

fn env_stats() -> EnvStats {
    EnvStats {
        n_envs: 4,
        obs_shape: vec![8],
        action_dim: 3,
        ..Default::default()
    }
}

fn mock_config() -> WorkerConfig {
    WorkerConfig::new("mock").dataset(serde_yaml::from_str("{min_len: 4}").unwrap())
}

fn trainer_manager() -> TrainerManager {
    let config = TrainerManagerConfig::default().poll_interval_ms(1);
    TrainerManager::build(&config, env_stats(), registry())
}

fn wait_until(mut f: impl FnMut() -> bool) {
    let start = Instant::now();
    while !f() {
        assert!(start.elapsed() < Duration::from_secs(10), "timed out");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_actor_hosts_several_identifiers() -> Result<()> {
    let mut actor = RemoteActor::spawn("actor-test", env_stats(), registry());

    let id = actor
        .construct_actor_from_config(mock_config(), Some(0), None, None)
        .wait()?;
    assert_eq!(id, get_identifier(Some(0), None));
    actor
        .construct_actor_from_config(mock_config(), Some(1), Some(2), Some(weights_of(1.0, 3)))
        .wait()?;

    assert_eq!(actor.get_weights(Some(0), None).wait()?, weights_of(0.0, 3));
    assert_eq!(actor.get_weights(Some(1), Some(2)).wait()?, weights_of(1.0, 3));
    assert_eq!(actor.identifiers().wait()?.len(), 2);
    assert_eq!(actor.get_config(Some(0), None).wait()?, mock_config());
    assert_eq!(
        actor.get_weights(Some(1), None).wait(),
        Err(DistributedError::UnknownIdentifier(get_identifier(Some(1), None)))
    );
    assert!(actor.get_auxiliary_stats(None, None).wait().is_err());

    actor.stop_and_join();
    assert!(actor.is_finished());
    Ok(())
}

#[test]
fn test_prebuilt_actor_keeps_its_config() -> Result<()> {
    let mut actor = RemoteActor::spawn("actor-test", env_stats(), registry());

    let prebuilt = create_actor(&Value::Null, create_model(&Value::Null, &env_stats())?)?;
    actor.set_actor(prebuilt, mock_config(), Some(1), None).wait()?;
    assert_eq!(actor.get_weights(Some(1), None).wait()?, weights_of(0.0, 3));
    assert_eq!(actor.get_config(Some(1), None).wait()?, mock_config());

    let mut manager = ActorManager::build(&ActorManagerConfig::default(), env_stats(), registry());
    manager.spawn_worker(0);
    let prebuilt = create_actor(&Value::Null, create_model(&Value::Null, &env_stats())?)?;
    manager.set_actor(0, prebuilt, mock_config(), Some(2), None)?;
    assert_eq!(manager.get_actor_weights(0, Some(2), None)?, weights_of(0.0, 3));

    actor.stop_and_join();
    manager.stop_and_join();
    Ok(())
}

#[test]
fn test_construction_failures_keep_worker_alive() -> Result<()> {
    let mut actor = RemoteActor::spawn("actor-test", env_stats(), registry());

    let unknown = actor
        .construct_actor_from_config(WorkerConfig::new("ppo"), None, None, None)
        .wait();
    assert!(matches!(unknown, Err(DistributedError::Construction { .. })));

    match actor
        .construct_actor_from_config(WorkerConfig::new("broken"), None, None, None)
        .wait()
    {
        Err(DistributedError::Construction { reason, .. }) => assert_eq!(reason, "bad model"),
        other => panic!("unexpected {:?}", other),
    }

    assert!(actor.identifiers().wait()?.is_empty());
    actor.stop_and_join();
    Ok(())
}

#[test]
fn test_actor_manager_pushes_and_pulls_weights() -> Result<()> {
    let mut manager = ActorManager::build(&ActorManagerConfig::default(), env_stats(), registry());
    manager.add_remote_actor(0, mock_config(), Some(0), None, Some(weights_of(0.5, 3)))?;

    // Messages to a worker are handled in order, so the actor exists by now.
    assert_eq!(manager.get_actor_weights(0, Some(0), None)?, weights_of(0.5, 3));
    manager.set_actor_weights(0, weights_of(2.0, 3), Some(0), None)?;
    assert_eq!(manager.get_actor_weights(0, Some(0), None)?, weights_of(2.0, 3));
    assert_eq!(
        manager.get_auxiliary_stats(0, Some(0), None)?.get_scalar("n_sets")?,
        2.0
    );

    assert_eq!(
        manager.get_actor_weights(5, Some(0), None),
        Err(DistributedError::UnknownWorker(5))
    );
    manager.stop_and_join();
    assert!(manager.is_empty());
    Ok(())
}

#[test]
fn test_start_training_without_buffer_shuts_worker_down() -> Result<()> {
    let mut manager = trainer_manager();
    manager.add_trainer(0, mock_config(), Some(0), None, None)?;

    assert!(matches!(
        manager.start_training(0, Some(0), None),
        Err(DistributedError::Precondition(_))
    ));
    assert!(matches!(
        manager.get_train_step_weights(0, Some(0), None),
        Err(DistributedError::WorkerDisconnected(_))
    ));
    manager.stop_and_join();
    Ok(())
}

#[test]
fn test_training_waits_for_data_and_stops() -> Result<()> {
    let mut manager = trainer_manager();
    let source = Arc::new(Counter::default());
    manager.add_trainer(0, mock_config(), Some(0), None, None)?;
    manager.associate_buffer(0, source.clone())?;

    assert_eq!(
        manager.start_training(0, Some(9), None),
        Err(DistributedError::UnknownIdentifier(get_identifier(Some(9), None)))
    );
    manager.start_training(0, Some(0), None)?;
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(manager.get_train_step_weights(0, Some(0), None)?.0, 0);

    source.0.store(4, Ordering::SeqCst);
    wait_until(|| {
        manager
            .get_train_step_weights(0, Some(0), None)
            .map_or(false, |(step, _)| step > 3)
    });

    // Weights are read under the lock of the training step.
    let (step, weights) = manager.get_train_step_weights(0, Some(0), None)?;
    assert_eq!(weights, weights_of(step as f32, 3));

    manager.stop_training(0, Some(0), None)?;
    let (stopped_at, _) = manager.get_train_step_weights(0, Some(0), None)?;
    std::thread::sleep(Duration::from_millis(20));
    let (step, record) = manager.get_stats(0, Some(0), None)?;
    assert_eq!(step, stopped_at);
    assert_eq!(record.get_scalar("loss_max")?, 1.0);

    // Records are aggregated since the previous call.
    assert!(manager.get_stats(0, Some(0), None)?.1.is_empty());
    manager.stop_and_join();
    Ok(())
}

#[test]
fn test_worker_shutdown_stops_training() -> Result<()> {
    let mut manager = trainer_manager();
    let source = Arc::new(Counter::default());
    source.0.store(10, Ordering::SeqCst);
    manager.spawn_worker(3);
    let id = manager.construct_on(3, mock_config(), None, None, None)?.wait()?;
    assert_eq!(id, get_identifier(None, None));
    manager.associate_buffer(3, source)?;
    manager.start_training(3, None, None)?;
    // Starting twice keeps the running task.
    manager.start_training(3, None, None)?;

    wait_until(|| {
        manager
            .get_train_step_weights(3, None, None)
            .map_or(false, |(step, _)| step > 0)
    });
    manager.stop_and_join();
    assert!(manager.is_empty());
    Ok(())
}

fn coordinator(actor_pool: PoolConfig, trainer_pool: PoolConfig) -> Result<Coordinator> {
    let config = CoordinatorConfig::default()
        .env(serde_yaml::from_str("{n_envs: 4}")?)
        .trainer_manager(TrainerManagerConfig::default().poll_interval_ms(1))
        .actor_pool(actor_pool)
        .trainer_pool(trainer_pool);
    let coordinator = Coordinator::build(&config, registry(), |env| {
        let n_envs = env.get("n_envs").and_then(Value::as_u64).unwrap_or(1) as usize;
        Ok(EnvStats {
            n_envs,
            action_dim: 3,
            ..Default::default()
        })
    })?;
    Ok(coordinator)
}

#[test]
fn test_coordinator_queues_until_start() -> Result<()> {
    let pool = PoolConfig::default()
        .initial_workers(1)
        .max_workers(2)
        .tenants_per_worker(1);
    let mut coordinator = coordinator(pool.clone(), pool)?;
    assert_eq!(coordinator.env_stats().n_envs, 4);

    let agents = [(0, 1), (1, 2)].into_iter().collect();
    let first = coordinator.allocate_worker(Some(agents));
    let second = coordinator.allocate_worker(None);
    assert!(matches!(first, Allocation::Queued { .. }));
    assert!(matches!(second, Allocation::Queued { .. }));
    assert!(coordinator.trainer_manager().is_empty());

    let placements = coordinator.start();
    let workers: Vec<_> = placements.iter().map(|p| p.worker_id).collect();
    assert_eq!(workers, vec![0, 1]);
    assert_eq!(placements[0].request, first.request());
    assert_eq!(coordinator.trainer_manager().worker_ids(), vec![0, 1]);
    assert_eq!(coordinator.actor_manager().worker_ids(), vec![0]);

    // The pool is full.
    let third = coordinator.allocate_worker(None);
    assert_eq!(coordinator.queued(PoolKind::Trainer), vec![third.request()]);
    assert_eq!(coordinator.start(), placements);

    let placed = coordinator.release(PoolKind::Trainer, first.request())?;
    assert_eq!(placed.len(), 1);
    assert_eq!(placed[0].request, third.request());
    assert_eq!(placed[0].worker_id, 0);

    coordinator.stop_and_join();
    Ok(())
}

#[test]
fn test_coordinator_places_work_on_shared_workers() -> Result<()> {
    let pool = PoolConfig::default()
        .initial_workers(0)
        .max_workers(1)
        .tenants_per_worker(2);
    let mut coordinator = coordinator(pool.clone(), pool)?;
    coordinator.start();

    let mut ids = vec![];
    for agent_id in 0..2 {
        match coordinator.allocate_actor(Some([(agent_id, 0)].into_iter().collect())) {
            Allocation::Placed { worker_id, .. } => {
                let pending = coordinator.actor_manager().construct_on(
                    worker_id,
                    mock_config(),
                    Some(agent_id),
                    None,
                    None,
                )?;
                ids.push((worker_id, pending.wait()?));
            }
            Allocation::Queued { request } => panic!("request {} queued", request),
        }
    }
    assert_eq!(ids[0].0, ids[1].0);
    assert_eq!(coordinator.actor_manager().identifiers(ids[0].0)?.len(), 2);
    assert!(matches!(
        coordinator.allocate_actor(None),
        Allocation::Queued { .. }
    ));

    coordinator.stop_and_join();
    Ok(())
}

#[test]
fn test_invalid_coordinator_config() -> Result<()> {
    let pool = PoolConfig::default().tenants_per_worker(0);
    let err = coordinator(pool, PoolConfig::default())
        .err()
        .and_then(|e| e.downcast::<DistributedError>().ok());
    assert!(matches!(err, Some(DistributedError::Config(_))));

    let failed = Coordinator::build(&CoordinatorConfig::default(), registry(), |_| {
        Err(anyhow::anyhow!("no such env"))
    });
    assert!(matches!(failed, Err(DistributedError::Config(_))));
    Ok(())
}
