//! Default implementation of the [`Evaluator`] trait.
use super::{evaluate, Evaluator};
use crate::{record::Record, Env, Policy};
use anyhow::Result;

/// Runs a fixed number of episodes on its own environment and reports the
/// mean score and episode length as `eval_score` and `eval_epslen`.
pub struct DefaultEvaluator<E: Env> {
    n_episodes: usize,
    env: E,
}

impl<E: Env> DefaultEvaluator<E> {
    /// Constructs the evaluator.
    pub fn new(env: E, n_episodes: usize) -> Self {
        Self { n_episodes, env }
    }

    /// The environment used for evaluation.
    pub fn env(&self) -> &E {
        &self.env
    }
}

impl<E: Env> Evaluator<E> for DefaultEvaluator<E> {
    fn evaluate<P: Policy<E>>(&mut self, policy: &mut P) -> Result<Record> {
        let output = evaluate(&mut self.env, policy, self.n_episodes, None)?;
        let n = output.scores.len().max(1) as f32;
        let score = output.scores.iter().sum::<f32>() / n;
        let epslen = output.epslens.iter().sum::<usize>() as f32 / n;
        Ok(Record::from_scalars([("eval_score", score), ("eval_epslen", epslen)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dummy::{DummyEnv, DummyEnvConfig, DummyPolicy};

    #[test]
    fn test_default_evaluator() -> Result<()> {
        let env = DummyEnv::build(
            DummyEnvConfig::vectorized(vec![2, 4])
                .rewards(vec![1.0, 0.5])
                .auto_reset(false),
        );
        let mut evaluator = DefaultEvaluator::new(env, 2);
        let record = evaluator.evaluate(&mut DummyPolicy::default())?;
        assert_eq!(record.get_scalar("eval_score")?, 2.0);
        assert_eq!(record.get_scalar("eval_epslen")?, 3.0);
        Ok(())
    }
}
