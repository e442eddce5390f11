//! Collect-then-train cycle of on-policy agents.
mod config;
mod warmup;
use crate::{
    error::CoreError,
    record::{AggregateRecorder, Record, RecordValue::Scalar},
    util::{Every, Timer},
    Act, Agent, Env, EnvOutput, Obs, RandomAction, RolloutStep, TrajectoryBuffer,
};
use anyhow::Result;
pub use config::CollectTrainConfig;
use log::{info, warn};
pub use warmup::{random_run, WarmupData};

fn rate(count: usize, secs: f32) -> f32 {
    count as f32 / secs.max(f32::EPSILON)
}

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Alternates data collection and optimization until `max_steps`
/// environment steps are done.
///
/// # Training loop
///
/// 0. If the agent normalizes observations, the environment step is 0 and the
///    loop was built [`with_rms_warmup`](CollectTrainLoop::with_rms_warmup),
///    run `n_warmup_rollouts` random-action rollouts to seed the running
///    statistics, then save the agent.
/// 1. Reset the buffer.
/// 2. Until the buffer is ready, collect one pass over all slots:
///     * a slot reporting a bad episode is removed from the buffer,
///     * valid steps are added and the last valid output of each slot kept,
///     * `score`, `epslen` and `win_rate` are stored,
///     * the rewards of valid slots update the reward statistics and are
///       replaced with normalized ones,
///     * the kept outputs go to the value function and the buffer is
///       finished with the resulting values.
/// 3. Run one optimization pass and store `fps` and `tps`.
/// 4. Every `log_period` optimization steps, if a score was stored, store
///    timing statistics, flush the recorder and save the agent.
///
/// ```mermaid
/// graph LR
///     A[Agent]-->|Env::Act|B[Env]
///     B -->|EnvOutput|A
///     B -->|RolloutStep|C[TrajectoryBuffer]
///     C -->|finished trajectories|A
/// ```
pub struct CollectTrainLoop<E: Env> {
    env: E,
    config: CollectTrainConfig,
    random_action: Option<fn(&mut E) -> E::Act>,
    run_timer: Timer,
    train_timer: Timer,
    log_timer: Timer,
}

impl<E: Env> CollectTrainLoop<E> {
    /// Constructs the loop. Observation statistics are not warmed up unless
    /// [`CollectTrainLoop::with_rms_warmup`] is called.
    pub fn build(env: E, config: &CollectTrainConfig) -> Self {
        Self {
            env,
            config: config.clone(),
            random_action: None,
            run_timer: Timer::new("run"),
            train_timer: Timer::new("train"),
            log_timer: Timer::new("log"),
        }
    }

    /// The environment.
    pub fn env(&self) -> &E {
        &self.env
    }

    /// The environment.
    pub fn env_mut(&mut self) -> &mut E {
        &mut self.env
    }

    /// Returns the environment.
    pub fn into_env(self) -> E {
        self.env
    }

    /// Trains the agent and returns the final environment step.
    pub fn train<A, B, R>(&mut self, agent: &mut A, buffer: &mut B, recorder: &mut R) -> Result<usize>
    where
        A: Agent<E, B>,
        B: TrajectoryBuffer<E::Obs, E::Act>,
        R: AggregateRecorder,
    {
        let step = agent.env_step();
        let mut step = self.initialize_rms::<A, B>(agent, step)?;
        let mut to_record = Every::new(self.config.log_period, self.config.log_period);

        info!("Training starts at step {}", step);
        while step < self.config.max_steps {
            buffer.reset();
            let start_env_step = agent.env_step();
            while !buffer.ready() {
                step = self.collect_data(agent, buffer, recorder, step)?;
            }

            let start_train_step = agent.train_step();
            let record = self.train_timer.time(|| agent.train_record(buffer))?;
            recorder.store(record);
            let fps = rate(step.saturating_sub(start_env_step), self.run_timer.last());
            let tps = rate(
                agent.train_step().saturating_sub(start_train_step),
                self.train_timer.last(),
            );
            recorder.store(Record::from_scalars([("fps", fps), ("tps", tps)]));
            agent.set_env_step(step);

            if to_record.fires(agent.train_step()) && recorder.contains_key("score") {
                self.record_stats::<A, B, R>(agent, recorder, step, fps, tps)?;
            }
        }
        info!("Training finished at step {}", step);

        Ok(step)
    }

    fn initialize_rms<A, B>(&mut self, agent: &mut A, step: usize) -> Result<usize>
    where
        A: Agent<E, B>,
    {
        if step != 0 || !agent.is_obs_normalized() {
            return Ok(step);
        }
        let random_action = match self.random_action {
            Some(f) => f,
            None => {
                warn!("Running statistics are not warmed up: the loop was built without random actions");
                return Ok(step);
            }
        };

        info!("Start to initialize running stats");
        let mut step = step;
        for _ in 0..self.config.n_warmup_rollouts {
            let (s, data) = random_run(&mut self.env, random_action, step)?;
            step = s;
            agent.update_obs_rms(&data.obs);
            agent.update_reward_rms(&data.reward, &data.discount);
        }
        agent.set_env_step(step);
        agent.save()?;
        Ok(step)
    }

    fn collect_data<A, B, R>(
        &mut self,
        agent: &mut A,
        buffer: &mut B,
        recorder: &mut R,
        step: usize,
    ) -> Result<usize>
    where
        A: Agent<E, B>,
        B: TrajectoryBuffer<E::Obs, E::Act>,
        R: AggregateRecorder,
    {
        let env = &mut self.env;
        let (step, last_env_output) = self
            .run_timer
            .time(|| collect_run(env, agent, buffer, recorder, step))?;

        for i in 0..buffer.n_slots() {
            if !buffer.is_valid_traj(i) {
                continue;
            }
            let reward = buffer.rewards(i);
            let discount = buffer.discounts(i);
            agent.update_reward_rms(&reward, &discount);
            buffer.update_rewards(i, &agent.normalize_reward(&reward))?;
        }
        agent.record_inputs_to_vf(&last_env_output);
        let value = agent.compute_value();
        buffer.finish(&value);

        Ok(step)
    }

    fn record_stats<A, B, R>(
        &mut self,
        agent: &mut A,
        recorder: &mut R,
        step: usize,
        fps: f32,
        tps: f32,
    ) -> Result<()>
    where
        A: Agent<E, B>,
        R: AggregateRecorder,
    {
        let record = Record::from_scalars([
            ("time/fps", fps),
            ("time/tps", tps),
            ("misc/train_step", agent.train_step() as f32),
            ("time/run", self.run_timer.total()),
            ("time/train", self.train_timer.total()),
            ("time/log", self.log_timer.total()),
            ("time/run_mean", self.run_timer.average()),
            ("time/train_mean", self.train_timer.average()),
            ("time/log_mean", self.log_timer.average()),
        ]);
        self.log_timer.time(|| {
            recorder.store(record);
            recorder.flush(step as i64);
            agent.save()
        })
    }
}

impl<E: RandomAction> CollectTrainLoop<E> {
    /// Enables the warm-up of running statistics with random actions.
    pub fn with_rms_warmup(mut self) -> Self {
        let random_action: fn(&mut E) -> E::Act = E::random_action;
        self.random_action = Some(random_action);
        self
    }
}

/// Steps all slots until each has reset once, filling the buffer.
///
/// Returns `step` advanced by the finished episodes' lengths, and the last
/// valid output of every slot.
pub fn collect_run<E, A, B, R>(
    env: &mut E,
    agent: &mut A,
    buffer: &mut B,
    recorder: &mut R,
    step: usize,
) -> Result<(usize, EnvOutput<E::Obs>)>
where
    E: Env,
    A: Agent<E, B>,
    B: TrajectoryBuffer<E::Obs, E::Act>,
    R: AggregateRecorder,
{
    let n_envs = env.n_envs();
    agent.reset_states();
    buffer.clear();

    let mut env_output = env.output();
    let mut last_env_output = env_output.clone();
    let mut finished = vec![false; n_envs];
    let mut ended = vec![None; n_envs];

    while !finished.iter().all(|&f| f) {
        let (act, frame_skip, terms) = agent.sample(&env_output, false).into_parts();
        if terms.contains_key("reward") {
            return Err(CoreError::RewardInTerms.into());
        }
        let next = env.step(&act, frame_skip.as_deref())?;
        let info = env.info(None);

        for i in 0..n_envs {
            if finished[i] {
                continue;
            }
            if info[i].bad_episode {
                buffer.remove(i);
            } else if info[i].valid_step && buffer.is_valid_traj(i) {
                buffer.add(
                    i,
                    RolloutStep {
                        obs: env_output.obs.select(&[i]),
                        act: act.select(&[i]),
                        reward: next.reward[i],
                        discount: next.discount[i],
                        terms: terms
                            .iter()
                            .filter_map(|(k, v)| v.get(i).map(|x| (k.clone(), *x)))
                            .collect(),
                    },
                )?;
                last_env_output.splice(&[i], &next.select(&[i]));
            }
            if next.reset[i] {
                finished[i] = true;
                ended[i] = Some(info[i].clone());
            }
        }
        env_output = next;
    }

    let mut step = step;
    for (i, info) in ended.into_iter().enumerate() {
        let info = info.unwrap_or_default();
        let score = info
            .score
            .or_else(|| env.score(Some(&[i][..])).first().copied())
            .unwrap_or(0.0);
        let epslen = info
            .epslen
            .or_else(|| env.epslen(Some(&[i][..])).first().copied())
            .unwrap_or(0);
        step += epslen;

        let mut record = Record::from_scalars([("score", score), ("epslen", epslen as f32)]);
        if let Some(won) = info.won {
            record.insert("win_rate", Scalar(if won { 1.0 } else { 0.0 }));
        }
        recorder.store(record);
    }

    Ok((step, last_env_output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dummy::{DummyAgent, DummyEnv, DummyEnvConfig},
        record::BufferedRecorder,
        RolloutBuffer, RolloutBufferConfig,
    };
    use test_log::test;

    fn buffer(n_envs: usize, batch_size: usize) -> RolloutBuffer<Vec<f32>, Vec<i64>> {
        RolloutBuffer::build(
            &RolloutBufferConfig::default()
                .n_envs(n_envs)
                .batch_size(batch_size),
        )
    }

    #[test]
    fn test_bad_slot_is_excluded_from_reward_rms() -> Result<()> {
        let env = DummyEnv::build(
            DummyEnvConfig::vectorized(vec![3, 3])
                .rewards(vec![1.0, 1000.0])
                .bad_slots(vec![1]),
        );
        let mut lp = CollectTrainLoop::build(env, &CollectTrainConfig::default());
        let mut agent = DummyAgent::default();
        let mut buffer = buffer(2, 3);
        let mut recorder = BufferedRecorder::new();

        let step = lp.collect_data(&mut agent, &mut buffer, &mut recorder, 0)?;
        assert_eq!(step, 6);
        assert!(buffer.is_valid_traj(0));
        assert!(!buffer.is_valid_traj(1));
        assert_eq!(agent.reward_rms_inputs, vec![1.0, 1.0, 1.0]);

        // Only slot 0 was finished, with rewards scaled by its return statistics.
        let normalized = agent.reward_rms.normalize(&[1.0])[0];
        assert!(normalized > 1.0);
        assert!(buffer.ready());
        assert!(buffer.samples().iter().all(|s| s.step.reward == normalized));
        assert_eq!(agent.vf_inputs.as_ref().map(|o| o.len()), Some(2));
        assert!(recorder.contains_key("win_rate"));
        Ok(())
    }

    #[test]
    fn test_train_loop() -> Result<()> {
        let env = DummyEnv::build(DummyEnvConfig::vectorized(vec![2, 2]));
        let config = CollectTrainConfig::default().max_steps(8).log_period(1);
        let mut lp = CollectTrainLoop::build(env, &config);
        let mut agent = DummyAgent::default();
        let mut buffer = buffer(2, 4);
        let mut recorder = BufferedRecorder::new();

        let step = lp.train(&mut agent, &mut buffer, &mut recorder)?;
        assert_eq!(step, 8);
        assert_eq!(agent.env_step, 8);
        assert_eq!(agent.n_train_steps, 2);
        assert_eq!(agent.n_saves, 2);
        assert_eq!(recorder.len(), 2);

        let written = recorder.iter().last().unwrap();
        assert_eq!(written.get_scalar("step")?, 8.0);
        assert_eq!(written.get_scalar("score_mean")?, 2.0);
        assert_eq!(written.get_scalar("misc/train_step")?, 2.0);
        assert!(written.get_scalar("time/fps")? > 0.0);
        Ok(())
    }

    #[test]
    fn test_rms_warmup() -> Result<()> {
        let env = DummyEnv::build(DummyEnvConfig::vectorized(vec![3, 2]));
        let config = CollectTrainConfig::default().max_steps(0).n_warmup_rollouts(2);
        let mut lp = CollectTrainLoop::build(env, &config).with_rms_warmup();
        let mut agent = DummyAgent {
            obs_normalized: true,
            ..Default::default()
        };

        let step = lp.train(&mut agent, &mut buffer(2, 4), &mut BufferedRecorder::new())?;
        assert_eq!(step, 10);
        assert_eq!(agent.env_step, 10);
        // Slot 1 enters the second rollout mid-episode.
        assert_eq!(agent.obs_rms_inputs.len(), 9);
        assert_eq!(agent.reward_rms_inputs.len(), 9);
        let obs_rms = agent.obs_rms.as_ref().unwrap();
        assert_eq!(obs_rms.dim(), 1);
        assert!((obs_rms.count() - 9.0).abs() < 1e-3);
        assert!(agent.reward_rms.stats().count() > 9.0);
        assert_eq!(agent.n_saves, 1);
        Ok(())
    }

    #[test]
    fn test_warmup_needs_random_actions() -> Result<()> {
        let env = DummyEnv::build(DummyEnvConfig::vectorized(vec![3, 2]));
        let config = CollectTrainConfig::default().max_steps(0);
        let mut lp = CollectTrainLoop::build(env, &config);
        let mut agent = DummyAgent {
            obs_normalized: true,
            ..Default::default()
        };

        let step = lp.train(&mut agent, &mut buffer(2, 4), &mut BufferedRecorder::new())?;
        assert_eq!(step, 0);
        assert!(agent.obs_rms_inputs.is_empty());
        assert_eq!(lp.env().n_steps, 0);
        Ok(())
    }
}
