//! Scripted environments and policies used in tests.
//!
//! Observations are the number of steps taken in the current episode, one
//! `f32` per environment. Every step yields the slot's reward, and episodes of
//! slot `i` last `episode_lens[i]` steps.
use crate::{
    record::Record,
    rms::{RewardRms, RunningMeanStd},
    Agent, Env, EnvOutput, EnvType, EpisodeInfo, Policy, PolicyOutput,
    RandomAction, Screen, Terms,
};
use anyhow::Result;

/// Configuration of [`DummyEnv`].
#[derive(Clone, Debug)]
pub struct DummyEnvConfig {
    /// Single or vectorized.
    pub env_type: EnvType,

    /// Episode length of each slot; its length is the number of environments.
    pub episode_lens: Vec<usize>,

    /// Reward given at every step, per slot.
    pub rewards: Vec<f32>,

    /// Slots whose episodes end as bad episodes.
    pub bad_slots: Vec<usize>,

    /// Start a new episode immediately after termination.
    pub auto_reset: bool,

    /// Reported episode step bound.
    pub max_episode_steps: Option<usize>,

    /// Default frame skip.
    pub frame_skip: usize,

    /// Lives per game. A game lasts `lives` episodes of `episode_lens[i]`
    /// steps, and losing a life resets the slot without ending the game.
    pub lives: usize,
}

impl DummyEnvConfig {
    /// A single environment whose episodes last `len` steps.
    pub fn single(len: usize) -> Self {
        Self {
            env_type: EnvType::Single,
            episode_lens: vec![len],
            rewards: vec![1.0],
            bad_slots: vec![],
            auto_reset: true,
            max_episode_steps: Some(1000),
            frame_skip: 1,
            lives: 1,
        }
    }

    /// Vectorized environments with the given episode lengths.
    pub fn vectorized(episode_lens: Vec<usize>) -> Self {
        Self {
            env_type: EnvType::Vectorized,
            rewards: vec![1.0; episode_lens.len()],
            episode_lens,
            bad_slots: vec![],
            auto_reset: true,
            max_episode_steps: Some(1000),
            frame_skip: 1,
            lives: 1,
        }
    }

    /// Sets per-slot rewards.
    pub fn rewards(mut self, v: Vec<f32>) -> Self {
        self.rewards = v;
        self
    }

    /// Sets slots ending with bad episodes.
    pub fn bad_slots(mut self, v: Vec<usize>) -> Self {
        self.bad_slots = v;
        self
    }

    /// Sets automatic reset.
    pub fn auto_reset(mut self, v: bool) -> Self {
        self.auto_reset = v;
        self
    }

    /// Sets the episode step bound.
    pub fn max_episode_steps(mut self, v: Option<usize>) -> Self {
        self.max_episode_steps = v;
        self
    }

    /// Sets the frame skip.
    pub fn frame_skip(mut self, v: usize) -> Self {
        self.frame_skip = v;
        self
    }

    /// Sets the number of lives per game.
    pub fn lives(mut self, v: usize) -> Self {
        self.lives = v;
        self
    }
}

/// A scripted environment.
pub struct DummyEnv {
    config: DummyEnvConfig,
    t: Vec<usize>,
    lives: Vec<usize>,
    score: Vec<f32>,
    epslen: Vec<usize>,
    game_over: Vec<bool>,
    info: Vec<EpisodeInfo>,
    output: EnvOutput<Vec<f32>>,
    rng: fastrand::Rng,

    /// Number of [`Env::step`] calls.
    pub n_steps: usize,

    /// Arguments of [`Env::reset`] calls.
    pub resets: Vec<Option<Vec<usize>>>,

    /// Frame skips passed to [`Env::step`].
    pub frame_skips: Vec<Option<Vec<usize>>>,
}

impl DummyEnv {
    /// Builds the environment.
    pub fn build(config: DummyEnvConfig) -> Self {
        let n = config.episode_lens.len();
        Self {
            t: vec![0; n],
            lives: vec![config.lives; n],
            score: vec![0.0; n],
            epslen: vec![0; n],
            game_over: vec![false; n],
            info: vec![EpisodeInfo::default(); n],
            output: EnvOutput {
                obs: vec![0.0; n],
                reward: vec![0.0; n],
                discount: vec![1.0; n],
                reset: vec![false; n],
            },
            rng: fastrand::Rng::with_seed(42),
            n_steps: 0,
            resets: vec![],
            frame_skips: vec![],
            config,
        }
    }

    fn restart(&mut self, i: usize) {
        self.t[i] = 0;
        self.lives[i] = self.config.lives;
        self.score[i] = 0.0;
        self.epslen[i] = 0;
        self.game_over[i] = false;
    }

    fn idxes(&self, idxes: Option<&[usize]>) -> Vec<usize> {
        match idxes {
            Some(idxes) => idxes.to_vec(),
            None => (0..self.config.episode_lens.len()).collect(),
        }
    }
}

impl Env for DummyEnv {
    type Obs = Vec<f32>;
    type Act = Vec<i64>;

    fn env_type(&self) -> EnvType {
        self.config.env_type
    }

    fn n_envs(&self) -> usize {
        self.config.episode_lens.len()
    }

    fn max_episode_steps(&self) -> Option<usize> {
        self.config.max_episode_steps
    }

    fn frame_skip(&self) -> usize {
        self.config.frame_skip
    }

    fn step(&mut self, _act: &Vec<i64>, frame_skip: Option<&[usize]>) -> Result<EnvOutput<Vec<f32>>> {
        self.n_steps += 1;
        self.frame_skips.push(frame_skip.map(|f| f.to_vec()));

        for i in 0..self.n_envs() {
            if self.game_over[i] {
                if self.config.auto_reset {
                    self.restart(i);
                } else {
                    self.output.reward[i] = 0.0;
                    self.output.discount[i] = 0.0;
                    self.output.reset[i] = false;
                    self.info[i] = EpisodeInfo {
                        game_over: true,
                        ..Default::default()
                    };
                    continue;
                }
            }

            let reward = self.config.rewards[i];
            self.t[i] += 1;
            self.score[i] += reward;
            self.epslen[i] += 1;

            let life_lost = self.t[i] >= self.config.episode_lens[i];
            let terminal = life_lost && self.lives[i] <= 1;
            if life_lost && !terminal {
                self.lives[i] -= 1;
                self.t[i] = 0;
            }
            let bad = terminal && self.config.bad_slots.contains(&i);
            self.game_over[i] = terminal;
            self.output.obs[i] = if terminal && self.config.auto_reset {
                0.0
            } else {
                self.t[i] as f32
            };
            self.output.reward[i] = reward;
            self.output.discount[i] = if life_lost { 0.0 } else { 1.0 };
            self.output.reset[i] = life_lost;
            self.info[i] = EpisodeInfo {
                score: terminal.then_some(self.score[i]),
                epslen: terminal.then_some(self.epslen[i]),
                game_over: terminal,
                valid_step: !bad,
                bad_episode: bad,
                won: terminal.then_some(self.score[i] > 0.0),
            };
        }

        Ok(self.output.clone())
    }

    fn reset(&mut self, idxes: Option<&[usize]>) -> Result<EnvOutput<Vec<f32>>> {
        self.resets.push(idxes.map(|i| i.to_vec()));
        let idxes = self.idxes(idxes);
        for &i in idxes.iter() {
            self.restart(i);
            self.output.obs[i] = 0.0;
            self.output.reward[i] = 0.0;
            self.output.discount[i] = 1.0;
            self.output.reset[i] = true;
            self.info[i] = EpisodeInfo::default();
        }
        Ok(self.output.select(&idxes))
    }

    fn output(&self) -> EnvOutput<Vec<f32>> {
        self.output.clone()
    }

    fn score(&self, idxes: Option<&[usize]>) -> Vec<f32> {
        self.idxes(idxes).iter().map(|&i| self.score[i]).collect()
    }

    fn epslen(&self, idxes: Option<&[usize]>) -> Vec<usize> {
        self.idxes(idxes).iter().map(|&i| self.epslen[i]).collect()
    }

    fn info(&self, idxes: Option<&[usize]>) -> Vec<EpisodeInfo> {
        self.idxes(idxes).iter().map(|&i| self.info[i].clone()).collect()
    }

    fn game_over(&self) -> Vec<bool> {
        self.game_over.clone()
    }
}

impl RandomAction for DummyEnv {
    fn random_action(&mut self) -> Vec<i64> {
        (0..self.n_envs()).map(|_| self.rng.i64(0..4)).collect()
    }
}

impl Screen for DummyEnv {
    type Frame = usize;

    /// Frames are the number of steps taken in the current episode.
    fn screen(&mut self) -> Vec<usize> {
        self.t.clone()
    }
}

/// A policy returning zero actions and remembering what it observed.
#[derive(Default)]
pub struct DummyPolicy {
    /// Observations passed to [`Policy::sample`].
    pub seen: Vec<Vec<f32>>,

    /// Number of [`Policy::reset_states`] calls.
    pub n_reset_states: usize,

    /// Zero-based frame skips to emit, if any.
    pub frame_skip: Option<usize>,

    /// Terms to emit, if any.
    pub terms: Option<Terms>,
}

impl Policy<DummyEnv> for DummyPolicy {
    fn sample(&mut self, output: &EnvOutput<Vec<f32>>, _evaluation: bool) -> PolicyOutput<Vec<i64>> {
        self.seen.push(output.obs.clone());
        let n = output.len();
        let act = vec![0; n];
        match (self.frame_skip, &self.terms) {
            (Some(f), terms) => {
                PolicyOutput::WithFrameSkip(act, vec![f; n], terms.clone().unwrap_or_default())
            }
            (None, Some(terms)) => PolicyOutput::WithTerms(act, terms.clone()),
            (None, None) => PolicyOutput::Act(act),
        }
    }

    fn reset_states(&mut self) {
        self.n_reset_states += 1;
    }
}

/// An agent recording how the collect/train cycle drives it.
pub struct DummyAgent {
    /// Policy part.
    pub policy: DummyPolicy,

    /// Optimization steps done.
    pub n_train_steps: usize,

    /// Environment step set by the cycle.
    pub env_step: usize,

    /// Normalize observations, enabling the warm-up phase.
    pub obs_normalized: bool,

    /// Observation rows fed to the running statistics.
    pub obs_rms_inputs: Vec<Vec<f32>>,

    /// Rewards fed to the running statistics.
    pub reward_rms_inputs: Vec<f32>,

    /// Observation statistics, sized by the first observation.
    pub obs_rms: Option<RunningMeanStd>,

    /// Return statistics scaling rewards.
    pub reward_rms: RewardRms,

    /// Last outputs given for value estimation.
    pub vf_inputs: Option<EnvOutput<Vec<f32>>>,

    /// Number of checkpoints saved.
    pub n_saves: usize,
}

impl Default for DummyAgent {
    fn default() -> Self {
        Self {
            policy: DummyPolicy::default(),
            n_train_steps: 0,
            env_step: 0,
            obs_normalized: false,
            obs_rms_inputs: vec![],
            reward_rms_inputs: vec![],
            obs_rms: None,
            reward_rms: RewardRms::new(0.99),
            vf_inputs: None,
            n_saves: 0,
        }
    }
}

impl Policy<DummyEnv> for DummyAgent {
    fn sample(&mut self, output: &EnvOutput<Vec<f32>>, evaluation: bool) -> PolicyOutput<Vec<i64>> {
        self.policy.sample(output, evaluation)
    }

    fn reset_states(&mut self) {
        self.policy.reset_states()
    }
}

impl<B> Agent<DummyEnv, B> for DummyAgent {
    fn train_record(&mut self, _buffer: &mut B) -> Result<Record> {
        self.n_train_steps += 1;
        Ok(Record::from_scalar("loss", 0.5))
    }

    fn train_step(&self) -> usize {
        self.n_train_steps
    }

    fn env_step(&self) -> usize {
        self.env_step
    }

    fn set_env_step(&mut self, step: usize) {
        self.env_step = step;
    }

    fn is_obs_normalized(&self) -> bool {
        self.obs_normalized
    }

    fn update_obs_rms(&mut self, obs: &[Vec<f32>]) {
        if let Some(first) = obs.first() {
            let dim = first.len();
            self.obs_rms
                .get_or_insert_with(|| RunningMeanStd::new(dim))
                .update(obs, None);
        }
        self.obs_rms_inputs.extend(obs.iter().cloned());
    }

    fn update_reward_rms(&mut self, reward: &[f32], discount: &[f32]) {
        self.reward_rms.update(reward, discount);
        self.reward_rms_inputs.extend_from_slice(reward);
    }

    fn normalize_reward(&self, reward: &[f32]) -> Vec<f32> {
        self.reward_rms.normalize(reward)
    }

    fn record_inputs_to_vf(&mut self, last_output: &EnvOutput<Vec<f32>>) {
        self.vf_inputs = Some(last_output.clone());
    }

    fn compute_value(&mut self) -> Vec<f32> {
        self.vf_inputs
            .as_ref()
            .map(|o| vec![0.0; o.len()])
            .unwrap_or_default()
    }

    fn save(&mut self) -> Result<()> {
        self.n_saves += 1;
        Ok(())
    }
}
