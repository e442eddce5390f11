//! Random-action rollouts for seeding running statistics.
use crate::{Env, Obs};
use anyhow::Result;

/// Valid-step data of one rollout, concatenated slot by slot.
pub struct WarmupData<O> {
    /// One-row observation batches.
    pub obs: Vec<O>,

    /// Rewards.
    pub reward: Vec<f32>,

    /// Discounts.
    pub discount: Vec<f32>,
}

/// Steps all slots with random actions until each has reset once.
///
/// Returns `step` advanced by the lengths of the finished episodes.
pub fn random_run<E: Env>(
    env: &mut E,
    random_action: fn(&mut E) -> E::Act,
    step: usize,
) -> Result<(usize, WarmupData<E::Obs>)> {
    let n_envs = env.n_envs();
    let mut obs: Vec<Vec<E::Obs>> = (0..n_envs).map(|_| vec![]).collect();
    let mut reward: Vec<Vec<f32>> = vec![vec![]; n_envs];
    let mut discount: Vec<Vec<f32>> = vec![vec![]; n_envs];
    let mut epslen = vec![0; n_envs];
    let mut finished = vec![false; n_envs];
    let mut env_output = env.output();

    while !finished.iter().all(|&f| f) {
        let act = random_action(env);
        let next = env.step(&act, None)?;
        let info = env.info(None);

        for i in 0..n_envs {
            if finished[i] {
                continue;
            }
            if info[i].valid_step {
                obs[i].push(env_output.obs.select(&[i]));
                reward[i].push(next.reward[i]);
                discount[i].push(next.discount[i]);
            }
            if next.reset[i] {
                finished[i] = true;
                epslen[i] = info[i]
                    .epslen
                    .or_else(|| env.epslen(Some(&[i][..])).first().copied())
                    .unwrap_or(0);
            }
        }
        env_output = next;
    }

    let data = WarmupData {
        obs: obs.into_iter().flatten().collect(),
        reward: reward.concat(),
        discount: discount.concat(),
    };
    Ok((step + epslen.iter().sum::<usize>(), data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dummy::{DummyEnv, DummyEnvConfig},
        RandomAction,
    };

    #[test]
    fn test_random_run_collects_each_slot_once() -> Result<()> {
        let mut env = DummyEnv::build(DummyEnvConfig::vectorized(vec![3, 2]).rewards(vec![1.0, 2.0]));
        let (step, data) = random_run(&mut env, DummyEnv::random_action, 0)?;
        assert_eq!(step, 5);
        assert_eq!(data.reward, vec![1.0, 1.0, 1.0, 2.0, 2.0]);
        assert_eq!(data.discount, vec![1.0, 1.0, 0.0, 1.0, 0.0]);
        assert_eq!(data.obs[..3], [vec![0.0], vec![1.0], vec![2.0]]);
        Ok(())
    }
}
