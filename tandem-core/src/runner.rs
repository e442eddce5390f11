//! Environment-stepping loop.
mod config;
use crate::{
    error::CoreError,
    record::{AggregateRecorder, Record, RecordValue::Scalar},
    Env, EnvOutput, EnvType, EpisodeInfo, Policy, PolicyOutput, Terms,
};
use anyhow::Result;
pub use config::{RunMode, RunnerConfig};
use log::warn;

/// Episode step bound assumed when an environment does not set one.
pub const DEFAULT_MAX_EPISODE_STEPS: usize = 1_000_000_000;

/// A transition passed to the step callback of [`Runner`].
#[derive(Debug)]
pub struct Transition<'a, O, A> {
    /// Observation the action was taken on.
    pub obs: &'a O,

    /// Action.
    pub act: &'a A,

    /// Reward.
    pub reward: &'a [f32],

    /// Discount.
    pub discount: &'a [f32],

    /// Next observation.
    pub next_obs: &'a O,

    /// Auxiliary terms returned by the policy.
    pub terms: &'a Terms,
}

/// Callback invoked after every environment step with the environment, the
/// step counter, the reset flags before the step and the transition.
pub type StepFn<'a, E> =
    dyn FnMut(&E, usize, &[bool], &Transition<'_, <E as Env>::Obs, <E as Env>::Act>) + 'a;

/// Callback invoked with the episode information each time statistics are stored.
pub type InfoFn = Box<dyn FnMut(&[EpisodeInfo])>;

/// Steps an environment with a policy and stores episode statistics.
///
/// The stepping strategy is chosen from [`RunMode`] and [`Env::env_type`]:
///
/// | | [`EnvType::Single`] | [`EnvType::Vectorized`] |
/// |---|---|---|
/// | [`RunMode::NSteps`] | `nsteps` steps, stats on every reset | `nsteps` steps, stats on game over of recorded slots |
/// | [`RunMode::Traj`] | until the first reset | until all slots reset |
///
/// Statistics are stored as `score` and `epslen` scalars.
pub struct Runner<E: Env> {
    env: E,
    run_mode: RunMode,
    step: usize,
    env_output: EnvOutput<E::Obs>,
    episodes: Vec<usize>,
    frames_per_step: usize,
    nsteps: usize,
    record_envs: Vec<usize>,
    info_fn: Option<InfoFn>,
}

impl<E: Env> Runner<E> {
    /// Creates a runner starting at `step`.
    pub fn new(env: E, config: &RunnerConfig, step: usize) -> Self {
        let n_envs = env.n_envs();
        let frame_skip = env.frame_skip().max(1);
        let nsteps = match (config.nsteps, env.max_episode_steps()) {
            (Some(nsteps), _) => nsteps,
            (None, Some(max_episode_steps)) => (max_episode_steps / frame_skip).max(1),
            (None, None) => {
                warn!(
                    "Neither nsteps nor max_episode_steps is given, the step budget is set to {}",
                    DEFAULT_MAX_EPISODE_STEPS / frame_skip
                );
                DEFAULT_MAX_EPISODE_STEPS / frame_skip
            }
        };
        if config.run_mode == RunMode::Traj && env.env_type() == EnvType::Vectorized {
            warn!("Runner step is not the actual number of environment steps in Traj mode with vectorized environments");
        }
        let record_envs = config.record_envs.unwrap_or(n_envs).min(n_envs);

        Self {
            env_output: env.output(),
            run_mode: config.run_mode,
            step,
            episodes: vec![0; n_envs],
            frames_per_step: n_envs * frame_skip,
            nsteps,
            record_envs: (0..record_envs).collect(),
            info_fn: None,
            env,
        }
    }

    /// Sets a callback receiving the episode information of stored statistics.
    pub fn with_info_fn(mut self, f: impl FnMut(&[EpisodeInfo]) + 'static) -> Self {
        self.info_fn = Some(Box::new(f));
        self
    }

    /// Runs the configured stepping strategy and returns the step counter.
    ///
    /// `nsteps` overrides the configured step budget for this call.
    pub fn run<P, R>(
        &mut self,
        policy: &mut P,
        recorder: &mut R,
        step_fn: Option<&mut StepFn<'_, E>>,
        nsteps: Option<usize>,
    ) -> Result<usize>
    where
        P: Policy<E>,
        R: AggregateRecorder,
    {
        let nsteps = nsteps.unwrap_or(self.nsteps);
        match (self.run_mode, self.env.env_type()) {
            (RunMode::NSteps, EnvType::Single) => self.run_env(policy, recorder, step_fn, nsteps),
            (RunMode::NSteps, EnvType::Vectorized) => {
                self.run_envvec(policy, recorder, step_fn, nsteps)
            }
            (RunMode::Traj, EnvType::Single) => self.run_traj_env(policy, recorder, step_fn, nsteps),
            (RunMode::Traj, EnvType::Vectorized) => {
                self.run_traj_envvec(policy, recorder, step_fn, nsteps)
            }
        }
    }

    fn run_env<P, R>(
        &mut self,
        policy: &mut P,
        recorder: &mut R,
        mut step_fn: Option<&mut StepFn<'_, E>>,
        nsteps: usize,
    ) -> Result<usize>
    where
        P: Policy<E>,
        R: AggregateRecorder,
    {
        for _ in 0..nsteps {
            let action = policy.sample(&self.env_output, false);
            let (_, reset) = self.step_env(action, step_fn.as_deref_mut())?;

            if reset.first().copied().unwrap_or(false) {
                let info = self.env.info(None);
                if info.iter().any(|i| i.score.is_some()) {
                    self.store_info(recorder, &info);
                    self.episodes[0] += 1;
                }
            }
        }
        Ok(self.step)
    }

    fn run_envvec<P, R>(
        &mut self,
        policy: &mut P,
        recorder: &mut R,
        mut step_fn: Option<&mut StepFn<'_, E>>,
        nsteps: usize,
    ) -> Result<usize>
    where
        P: Policy<E>,
        R: AggregateRecorder,
    {
        for _ in 0..nsteps {
            let action = policy.sample(&self.env_output, false);
            let (_, reset) = self.step_env(action, step_fn.as_deref_mut())?;

            let done_env_ids: Vec<usize> = reset
                .iter()
                .enumerate()
                .filter(|&(i, &r)| r && self.record_envs.contains(&i))
                .map(|(i, _)| i)
                .collect();
            if !done_env_ids.is_empty() {
                // Life losses reset a slot without ending the game.
                let (ids, info): (Vec<usize>, Vec<EpisodeInfo>) = done_env_ids
                    .iter()
                    .copied()
                    .zip(self.env.info(Some(done_env_ids.as_slice())))
                    .filter(|(_, i)| i.game_over)
                    .unzip();
                if !info.is_empty() {
                    self.store_info(recorder, &info);
                }
                for i in ids {
                    self.episodes[i] += 1;
                }
            }
        }
        Ok(self.step)
    }

    fn run_traj_env<P, R>(
        &mut self,
        policy: &mut P,
        recorder: &mut R,
        mut step_fn: Option<&mut StepFn<'_, E>>,
        nsteps: usize,
    ) -> Result<usize>
    where
        P: Policy<E>,
        R: AggregateRecorder,
    {
        for _ in 0..nsteps {
            let action = policy.sample(&self.env_output, false);
            let (_, reset) = self.step_env(action, step_fn.as_deref_mut())?;
            if reset.first().copied().unwrap_or(false) {
                break;
            }
        }

        let info = self.env.info(None);
        self.store_info(recorder, &info);
        self.episodes[0] += 1;
        Ok(self.step)
    }

    fn run_traj_envvec<P, R>(
        &mut self,
        policy: &mut P,
        recorder: &mut R,
        mut step_fn: Option<&mut StepFn<'_, E>>,
        nsteps: usize,
    ) -> Result<usize>
    where
        P: Policy<E>,
        R: AggregateRecorder,
    {
        for _ in 0..nsteps {
            let action = policy.sample(&self.env_output, false);
            let (_, reset) = self.step_env(action, step_fn.as_deref_mut())?;
            if reset.iter().all(|&r| r) {
                break;
            }
        }

        let info: Vec<EpisodeInfo> = self
            .env
            .info(None)
            .into_iter()
            .enumerate()
            .filter(|(i, _)| self.record_envs.contains(i))
            .map(|(_, info)| info)
            .collect();
        self.store_info(recorder, &info);
        self.episodes.iter_mut().for_each(|e| *e += 1);
        Ok(self.step)
    }

    /// Applies one policy output to the environment and returns the next
    /// observation and the reset flags.
    ///
    /// Frame skips in [`PolicyOutput::WithFrameSkip`] are zero-based; the
    /// environment receives them incremented by one and the step counter grows
    /// by their sum. Otherwise it grows by `n_envs * frame_skip`.
    pub fn step_env(
        &mut self,
        action: PolicyOutput<E::Act>,
        step_fn: Option<&mut StepFn<'_, E>>,
    ) -> Result<(E::Obs, Vec<bool>)> {
        let (act, frame_skip, terms) = action.into_parts();
        // A reward in terms would belong to the previous step.
        if terms.contains_key("reward") {
            return Err(CoreError::RewardInTerms.into());
        }

        let output = self.env.step(&act, frame_skip.as_deref())?;
        self.step += match frame_skip.as_ref() {
            Some(frame_skip) => frame_skip.iter().sum(),
            None => self.frames_per_step,
        };
        let prev = std::mem::replace(&mut self.env_output, output);

        if let Some(f) = step_fn {
            let transition = Transition {
                obs: &prev.obs,
                act: &act,
                reward: &self.env_output.reward,
                discount: &self.env_output.discount,
                next_obs: &self.env_output.obs,
                terms: &terms,
            };
            f(&self.env, self.step, &prev.reset, &transition);
        }

        Ok((self.env_output.obs.clone(), self.env_output.reset.clone()))
    }

    fn store_info<R: AggregateRecorder>(&mut self, recorder: &mut R, info: &[EpisodeInfo]) {
        for i in info.iter() {
            let mut record = Record::empty();
            if let Some(score) = i.score {
                record.insert("score", Scalar(score));
            }
            if let Some(epslen) = i.epslen {
                record.insert("epslen", Scalar(epslen as f32));
            }
            if !record.is_empty() {
                recorder.store(record);
            }
        }
        if let Some(f) = self.info_fn.as_mut() {
            f(info);
        }
    }

    /// Restarts the runner state at `step` for a new outer iteration.
    pub fn reset_state(&mut self, step: usize) {
        self.step = step;
        self.env_output = self.env.output();
        self.episodes.iter_mut().for_each(|e| *e = 0);
    }

    /// Step counter.
    pub fn step(&self) -> usize {
        self.step
    }

    /// Episodes counted per environment.
    pub fn episodes(&self) -> &[usize] {
        &self.episodes
    }

    /// Default step budget.
    pub fn nsteps(&self) -> usize {
        self.nsteps
    }

    /// Latest output of the environment.
    pub fn env_output(&self) -> &EnvOutput<E::Obs> {
        &self.env_output
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dummy::{DummyEnv, DummyEnvConfig, DummyPolicy},
        record::BufferedRecorder,
    };
    use std::{cell::Cell, rc::Rc};
    use test_log::test;

    fn runner(env: DummyEnvConfig, config: RunnerConfig) -> Runner<DummyEnv> {
        Runner::new(DummyEnv::build(env), &config, 0)
    }

    #[test]
    fn test_nsteps_single_runs_exactly_nsteps() -> Result<()> {
        let mut runner = runner(
            DummyEnvConfig::single(100).frame_skip(4),
            RunnerConfig::default().nsteps(10),
        );
        let mut policy = DummyPolicy::default();
        let mut recorder = BufferedRecorder::new();
        let mut calls = 0;
        let step_fn: &mut StepFn<'_, DummyEnv> = &mut |_, _, _, _| calls += 1;

        let step = runner.run(&mut policy, &mut recorder, Some(step_fn), None)?;
        assert_eq!(step, 40);
        assert_eq!(runner.env().n_steps, 10);
        assert_eq!(calls, 10);
        assert_eq!(runner.episodes(), &[0]);
        Ok(())
    }

    #[test]
    fn test_nsteps_single_stores_episodes() -> Result<()> {
        let mut runner = runner(DummyEnvConfig::single(3), RunnerConfig::default());
        let mut recorder = BufferedRecorder::new();
        runner.run(&mut DummyPolicy::default(), &mut recorder, None, Some(7))?;
        assert_eq!(runner.episodes(), &[2]);
        recorder.flush(7);
        let record = recorder.iter().next().unwrap();
        assert_eq!(record.get_scalar("score_mean")?, 3.0);
        assert_eq!(record.get_scalar("epslen_max")?, 3.0);
        Ok(())
    }

    #[test]
    fn test_traj_single_stops_at_first_reset() -> Result<()> {
        let mut runner = runner(
            DummyEnvConfig::single(3),
            RunnerConfig::default().run_mode(RunMode::Traj).nsteps(10),
        );
        let mut recorder = BufferedRecorder::new();
        let step = runner.run(&mut DummyPolicy::default(), &mut recorder, None, None)?;
        assert_eq!(step, 3);
        assert_eq!(runner.env().n_steps, 3);
        assert_eq!(runner.episodes(), &[1]);
        assert!(recorder.contains_key("score"));
        Ok(())
    }

    #[test]
    fn test_nsteps_vectorized_records_selected_envs() -> Result<()> {
        let stored = Rc::new(Cell::new(0));
        let stored_ = stored.clone();
        let mut runner = runner(
            DummyEnvConfig::vectorized(vec![2, 3]),
            RunnerConfig::default().nsteps(6).record_envs(1),
        )
        .with_info_fn(move |info| stored_.set(stored_.get() + info.len()));

        let step = runner.run(&mut DummyPolicy::default(), &mut BufferedRecorder::new(), None, None)?;
        assert_eq!(step, 12);
        assert_eq!(runner.episodes(), &[3, 0]);
        assert_eq!(stored.get(), 3);
        Ok(())
    }

    #[test]
    fn test_nsteps_vectorized_skips_life_losses() -> Result<()> {
        let stored = Rc::new(Cell::new(0));
        let stored_ = stored.clone();
        let mut runner = runner(
            DummyEnvConfig::vectorized(vec![2, 3]).lives(2),
            RunnerConfig::default().nsteps(8),
        )
        .with_info_fn(move |info| stored_.set(stored_.get() + info.len()));
        let mut recorder = BufferedRecorder::new();

        runner.run(&mut DummyPolicy::default(), &mut recorder, None, None)?;
        // Slot 0 resets at steps 2, 4, 6 and 8 but its games end at 4 and 8.
        // Slot 1 resets at steps 3 and 6 and its game ends at 6.
        assert_eq!(runner.episodes(), &[2, 1]);
        assert_eq!(stored.get(), 3);

        recorder.flush(8);
        let record = recorder.iter().next().unwrap();
        assert_eq!(record.get_scalar("epslen_min")?, 4.0);
        assert_eq!(record.get_scalar("epslen_max")?, 6.0);
        Ok(())
    }

    #[test]
    fn test_traj_vectorized_waits_for_all_slots() -> Result<()> {
        let mut runner = runner(
            DummyEnvConfig::vectorized(vec![2, 4]),
            RunnerConfig::default().run_mode(RunMode::Traj).nsteps(10),
        );
        let mut recorder = BufferedRecorder::new();
        runner.run(&mut DummyPolicy::default(), &mut recorder, None, None)?;
        assert_eq!(runner.env().n_steps, 4);
        assert_eq!(runner.episodes(), &[1, 1]);
        Ok(())
    }

    #[test]
    fn test_traj_vectorized_records_selected_envs() -> Result<()> {
        let mut runner = runner(
            DummyEnvConfig::vectorized(vec![2, 4]).rewards(vec![1.0, 5.0]),
            RunnerConfig::default()
                .run_mode(RunMode::Traj)
                .nsteps(10)
                .record_envs(1),
        );
        let mut recorder = BufferedRecorder::new();
        runner.run(&mut DummyPolicy::default(), &mut recorder, None, None)?;

        recorder.flush(4);
        let record = recorder.iter().next().unwrap();
        // Only slot 0, restarted once, is recorded.
        assert_eq!(record.get_scalar("score")?, 2.0);
        assert_eq!(record.get_scalar("epslen")?, 2.0);
        assert!(record.get_scalar("score_max").is_err());
        Ok(())
    }

    #[test]
    fn test_frame_skip_is_incremented_and_counted() -> Result<()> {
        let mut runner = runner(
            DummyEnvConfig::vectorized(vec![100, 100]),
            RunnerConfig::default().nsteps(3),
        );
        let mut policy = DummyPolicy {
            frame_skip: Some(1),
            ..Default::default()
        };
        let step = runner.run(&mut policy, &mut BufferedRecorder::new(), None, None)?;
        assert_eq!(step, 12);
        assert_eq!(runner.env().frame_skips[0], Some(vec![2, 2]));
        Ok(())
    }

    #[test]
    fn test_reward_in_terms_is_rejected() {
        let mut runner = runner(DummyEnvConfig::single(5), RunnerConfig::default().nsteps(1));
        let mut policy = DummyPolicy {
            terms: Some(Terms::from([("reward".to_string(), vec![1.0])])),
            ..Default::default()
        };
        let err = runner
            .run(&mut policy, &mut BufferedRecorder::new(), None, None)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CoreError>(),
            Some(CoreError::RewardInTerms)
        ));
        assert_eq!(runner.env().n_steps, 0);
    }

    #[test]
    fn test_terms_reach_step_fn() -> Result<()> {
        let mut runner = runner(DummyEnvConfig::single(5), RunnerConfig::default().nsteps(2));
        let mut policy = DummyPolicy {
            terms: Some(Terms::from([("logpi".to_string(), vec![-0.5])])),
            ..Default::default()
        };
        let mut seen = vec![];
        let step_fn: &mut StepFn<'_, DummyEnv> = &mut |_, step, prev_reset, t| {
            seen.push((step, prev_reset.to_vec(), t.obs.clone(), t.terms["logpi"].clone()))
        };
        runner.run(&mut policy, &mut BufferedRecorder::new(), Some(step_fn), None)?;
        assert_eq!(seen[0], (1, vec![false], vec![0.0], vec![-0.5]));
        assert_eq!(seen[1].2, vec![1.0]);
        Ok(())
    }

    #[test]
    fn test_default_nsteps() {
        let r = runner(
            DummyEnvConfig::single(5).max_episode_steps(Some(1000)).frame_skip(4),
            RunnerConfig::default(),
        );
        assert_eq!(r.nsteps(), 250);

        let r = runner(
            DummyEnvConfig::single(5).max_episode_steps(None),
            RunnerConfig::default(),
        );
        assert_eq!(r.nsteps(), DEFAULT_MAX_EPISODE_STEPS);
    }

    #[test]
    fn test_reset_state() -> Result<()> {
        let mut runner = runner(DummyEnvConfig::single(2), RunnerConfig::default().nsteps(4));
        runner.run(&mut DummyPolicy::default(), &mut BufferedRecorder::new(), None, None)?;
        assert_eq!(runner.episodes(), &[2]);
        runner.reset_state(100);
        assert_eq!(runner.step(), 100);
        assert_eq!(runner.episodes(), &[0]);
        Ok(())
    }
}
