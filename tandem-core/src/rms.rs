//! Running statistics for observation and reward normalization.
use serde::{Deserialize, Serialize};

/// Running mean and variance per dimension, merged batch-wise.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RunningMeanStd {
    mean: Vec<f64>,
    var: Vec<f64>,
    count: f64,
    epsilon: f64,
}

impl RunningMeanStd {
    /// Statistics over `dim` dimensions.
    pub fn new(dim: usize) -> Self {
        Self {
            mean: vec![0.0; dim],
            var: vec![1.0; dim],
            count: 1e-4,
            epsilon: 1e-8,
        }
    }

    /// Number of dimensions.
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Number of samples seen.
    pub fn count(&self) -> f64 {
        self.count
    }

    /// Running mean.
    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Running variance.
    pub fn var(&self) -> &[f64] {
        &self.var
    }

    /// Merges a batch of samples, each of length [`RunningMeanStd::dim`].
    ///
    /// Samples with a zero `mask` entry are skipped.
    pub fn update(&mut self, batch: &[Vec<f32>], mask: Option<&[f32]>) {
        let rows: Vec<&Vec<f32>> = batch
            .iter()
            .enumerate()
            .filter(|(i, _)| mask.map_or(true, |m| m.get(*i).map_or(true, |&v| v != 0.0)))
            .map(|(_, row)| row)
            .collect();
        if rows.is_empty() {
            return;
        }
        let n = rows.len() as f64;

        for d in 0..self.dim() {
            let batch_mean = rows.iter().map(|r| r[d] as f64).sum::<f64>() / n;
            let batch_var = rows
                .iter()
                .map(|r| (r[d] as f64 - batch_mean).powi(2))
                .sum::<f64>()
                / n;

            let delta = batch_mean - self.mean[d];
            let total = self.count + n;
            let m2 = self.var[d] * self.count + batch_var * n + delta * delta * self.count * n / total;
            self.mean[d] += delta * n / total;
            self.var[d] = m2 / total;
        }
        self.count += n;
    }

    /// Normalizes a sample.
    pub fn normalize(&self, x: &[f32]) -> Vec<f32> {
        x.iter()
            .zip(self.mean.iter().zip(self.var.iter()))
            .map(|(&x, (&m, &v))| ((x as f64 - m) / (v + self.epsilon).sqrt()) as f32)
            .collect()
    }
}

/// Scale of rewards estimated from the variance of running discounted returns.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RewardRms {
    rms: RunningMeanStd,
    gamma: f32,
    ret: f32,
}

impl RewardRms {
    /// Statistics of returns discounted with `gamma`.
    pub fn new(gamma: f32) -> Self {
        Self {
            rms: RunningMeanStd::new(1),
            gamma,
            ret: 0.0,
        }
    }

    /// Accumulates a trajectory of rewards. The running return restarts after
    /// every zero discount.
    pub fn update(&mut self, reward: &[f32], discount: &[f32]) {
        let mut rets = Vec::with_capacity(reward.len());
        for (&r, &d) in reward.iter().zip(discount) {
            self.ret = self.ret * self.gamma + r;
            rets.push(vec![self.ret]);
            if d == 0.0 {
                self.ret = 0.0;
            }
        }
        self.rms.update(&rets, None);
    }

    /// Divides rewards by the running standard deviation of returns.
    pub fn normalize(&self, reward: &[f32]) -> Vec<f32> {
        let std = (self.rms.var()[0] + 1e-8).sqrt() as f32;
        reward.iter().map(|r| r / std).collect()
    }

    /// Underlying statistics.
    pub fn stats(&self) -> &RunningMeanStd {
        &self.rms
    }
}
