//! Rollout-only evaluation of policies.
mod default_evaluator;
mod video;
use crate::{
    runner::{StepFn, Transition, DEFAULT_MAX_EPISODE_STEPS},
    Env, EnvType, Policy, Screen,
};
use anyhow::Result;
pub use default_evaluator::DefaultEvaluator;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};
pub use video::VideoBuffer;

/// Evaluates a policy.
pub trait Evaluator<E: Env> {
    /// Runs evaluation episodes and returns their statistics.
    ///
    /// The caller handles the internal state of `policy`, like training or
    /// evaluation mode.
    fn evaluate<P: Policy<E>>(&mut self, policy: &mut P) -> Result<crate::record::Record>;
}

/// Configuration of [`evaluate_with_video`].
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct EvaluateConfig {
    /// Number of episodes, raised to at least the number of environments.
    pub n: usize,

    /// Capacity of the frame buffer of each tracked environment.
    pub video_len: usize,

    /// Maximum number of environments whose frames are tracked.
    pub n_windows: usize,
}

impl Default for EvaluateConfig {
    fn default() -> Self {
        Self {
            n: 1,
            video_len: 1000,
            n_windows: 4,
        }
    }
}

impl EvaluateConfig {
    /// Sets the number of episodes.
    pub fn n(mut self, v: usize) -> Self {
        self.n = v;
        self
    }

    /// Sets the frame buffer capacity.
    pub fn video_len(mut self, v: usize) -> Self {
        self.video_len = v;
        self
    }

    /// Sets the number of tracked environments.
    pub fn n_windows(mut self, v: usize) -> Self {
        self.n_windows = v;
        self
    }

    /// Constructs [`EvaluateConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`EvaluateConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Scores and lengths of evaluation episodes in order of completion.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EvalOutput {
    /// Episode scores.
    pub scores: Vec<f32>,

    /// Episode lengths.
    pub epslens: Vec<usize>,
}

/// Runs at least `n` evaluation episodes, and at least one per environment.
///
/// Vectorized environments are reset partially: a slot whose game ends is
/// reset, alone, only while fewer than `n` episodes have been started, and its
/// fresh output is spliced into the batch the policy sees. Other slots keep
/// running untouched. A single environment is reset fully after each game over
/// while episodes remain, followed by [`Policy::reset_states`].
pub fn evaluate<E, P>(
    env: &mut E,
    policy: &mut P,
    n: usize,
    step_fn: Option<&mut StepFn<'_, E>>,
) -> Result<EvalOutput>
where
    E: Env,
    P: Policy<E>,
{
    run_episodes(env, policy, n, step_fn, |_| {})
}

/// Runs [`evaluate`] while capturing frames of the first
/// `min(n_windows, n_envs)` environments.
///
/// The returned videos have equal lengths; shorter ones are padded with their
/// last frame.
pub fn evaluate_with_video<E, P>(
    env: &mut E,
    policy: &mut P,
    config: &EvaluateConfig,
    step_fn: Option<&mut StepFn<'_, E>>,
) -> Result<(EvalOutput, Vec<Vec<E::Frame>>)>
where
    E: Screen,
    P: Policy<E>,
{
    let mut video = VideoBuffer::new(config.n_windows.min(env.n_envs()), config.video_len);
    let output = run_episodes(env, policy, config.n, step_fn, |env| {
        video.push_all(env.screen())
    })?;
    Ok((output, video.into_padded()))
}

fn run_episodes<E, P, F>(
    env: &mut E,
    policy: &mut P,
    n: usize,
    mut step_fn: Option<&mut StepFn<'_, E>>,
    mut on_step: F,
) -> Result<EvalOutput>
where
    E: Env,
    P: Policy<E>,
    F: FnMut(&mut E),
{
    let n_envs = env.n_envs();
    // At least one step per round, even when the episode bound is below the frame skip.
    let max_steps = (env.max_episode_steps().unwrap_or(DEFAULT_MAX_EPISODE_STEPS)
        / env.frame_skip().max(1))
    .max(1);
    let mut output = EvalOutput::default();

    policy.reset_states();
    let mut env_output = env.reset(None)?;
    let n = n.max(n_envs);
    // Episodes that have begun to run.
    let mut n_run_eps = n_envs;
    let mut n_done_eps = 0;
    let mut prev_done = vec![false; n_envs];
    let mut step = 0;

    while n_done_eps < n {
        for _ in 0..max_steps {
            on_step(env);

            let (act, frame_skip, terms) = policy.sample(&env_output, true).into_parts();
            let next = env.step(&act, frame_skip.as_deref())?;
            step += 1;
            if let Some(f) = step_fn.as_deref_mut() {
                let transition = Transition {
                    obs: &env_output.obs,
                    act: &act,
                    reward: &next.reward,
                    discount: &next.discount,
                    next_obs: &next.obs,
                    terms: &terms,
                };
                f(&*env, step, &env_output.reset, &transition);
            }
            env_output = next;

            match env.env_type() {
                EnvType::Single => {
                    if env.game_over().first().copied().unwrap_or(false) {
                        output.scores.extend(env.score(None));
                        output.epslens.extend(env.epslen(None));
                        n_done_eps += 1;
                        if n_run_eps < n {
                            n_run_eps += 1;
                            env_output = env.reset(None)?;
                            policy.reset_states();
                        }
                        break;
                    }
                }
                EnvType::Vectorized => {
                    let mut done = env.game_over();
                    let done_env_ids: Vec<usize> = done
                        .iter()
                        .zip(prev_done.iter())
                        .enumerate()
                        .filter(|(_, (&d, &pd))| d && !pd)
                        .map(|(i, _)| i)
                        .collect();
                    n_done_eps += done_env_ids.len();

                    if !done_env_ids.is_empty() {
                        output.scores.extend(env.score(Some(done_env_ids.as_slice())));
                        output.epslens.extend(env.epslen(Some(done_env_ids.as_slice())));

                        if n_run_eps < n {
                            let n_reset = (n - n_run_eps).min(done_env_ids.len());
                            let reset_env_ids = &done_env_ids[..n_reset];
                            n_run_eps += n_reset;
                            let fresh = env.reset(Some(reset_env_ids))?;
                            env_output.splice(reset_env_ids, &fresh);
                            // Reset slots run again and must be able to finish next step.
                            reset_env_ids.iter().for_each(|&i| done[i] = false);
                        } else if n_done_eps >= n {
                            break;
                        }
                    }
                    prev_done = done;
                }
            }
        }
    }

    Ok(output)
}
