//! Batched outputs of environments and policies.
use crate::error::CoreError;
use std::{collections::HashMap, fmt::Debug};

/// A batch of observations, one row per environment.
pub trait Obs: Clone + Debug {
    /// Returns the number of rows.
    fn len(&self) -> usize;

    /// Returns the rows at `idxes`, in that order.
    fn select(&self, idxes: &[usize]) -> Self;

    /// Overwrites row `idxes[k]` with row `k` of `fresh`.
    fn splice(&mut self, idxes: &[usize], fresh: &Self);
}

/// A batch of actions, one row per environment.
pub trait Act: Clone + Debug {
    /// Returns the number of rows.
    fn len(&self) -> usize;

    /// Returns the rows at `idxes`, in that order.
    fn select(&self, idxes: &[usize]) -> Self;
}

impl<T: Clone + Debug> Obs for Vec<T> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn select(&self, idxes: &[usize]) -> Self {
        idxes.iter().map(|&i| self[i].clone()).collect()
    }

    fn splice(&mut self, idxes: &[usize], fresh: &Self) {
        for (k, &i) in idxes.iter().enumerate() {
            self[i] = fresh[k].clone();
        }
    }
}

impl<T: Clone + Debug> Act for Vec<T> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn select(&self, idxes: &[usize]) -> Self {
        idxes.iter().map(|&i| self[i].clone()).collect()
    }
}

/// `(observation, reward, discount, reset)` batched over the environments.
///
/// `reset[i] == true` means environment `i` terminated and `obs` row `i`
/// already belongs to a fresh episode.
#[derive(Clone, Debug, PartialEq)]
pub struct EnvOutput<O> {
    /// Observations.
    pub obs: O,

    /// Rewards.
    pub reward: Vec<f32>,

    /// Discounts, `0` at terminal steps.
    pub discount: Vec<f32>,

    /// Reset flags.
    pub reset: Vec<bool>,
}

impl<O: Obs> EnvOutput<O> {
    /// Constructs an output, checking that all fields share the batch size.
    pub fn new(
        obs: O,
        reward: Vec<f32>,
        discount: Vec<f32>,
        reset: Vec<bool>,
    ) -> Result<Self, CoreError> {
        let n = obs.len();
        if reward.len() != n || discount.len() != n || reset.len() != n {
            return Err(CoreError::BatchSizeMismatch(format!(
                "obs: {}, reward: {}, discount: {}, reset: {}",
                n,
                reward.len(),
                discount.len(),
                reset.len()
            )));
        }
        Ok(Self {
            obs,
            reward,
            discount,
            reset,
        })
    }

    /// Batch size.
    pub fn len(&self) -> usize {
        self.reset.len()
    }

    /// Returns `true` if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.reset.is_empty()
    }

    /// Returns `true` if every environment has been reset.
    pub fn all_reset(&self) -> bool {
        self.reset.iter().all(|&r| r)
    }

    /// Returns the rows at `idxes`.
    pub fn select(&self, idxes: &[usize]) -> Self {
        Self {
            obs: self.obs.select(idxes),
            reward: idxes.iter().map(|&i| self.reward[i]).collect(),
            discount: idxes.iter().map(|&i| self.discount[i]).collect(),
            reset: idxes.iter().map(|&i| self.reset[i]).collect(),
        }
    }

    /// Overwrites rows `idxes` in place with the rows of `fresh`.
    ///
    /// `fresh` holds `idxes.len()` rows, typically the output of a partial reset.
    pub fn splice(&mut self, idxes: &[usize], fresh: &Self) {
        self.obs.splice(idxes, &fresh.obs);
        for (k, &i) in idxes.iter().enumerate() {
            self.reward[i] = fresh.reward[k];
            self.discount[i] = fresh.discount[k];
            self.reset[i] = fresh.reset[k];
        }
    }
}

/// Auxiliary values a policy returns along with its action, one entry per row.
pub type Terms = HashMap<String, Vec<f32>>;

/// What a policy emits for one step.
#[derive(Clone, Debug)]
pub enum PolicyOutput<A> {
    /// An action alone.
    Act(A),

    /// An action with auxiliary terms.
    WithTerms(A, Terms),

    /// An action with zero-based frame skips and auxiliary terms.
    WithFrameSkip(A, Vec<usize>, Terms),
}

impl<A> PolicyOutput<A> {
    /// Splits the output into the action, the frame skips (already incremented
    /// by one, since policies emit zero-based counts) and the terms.
    pub fn into_parts(self) -> (A, Option<Vec<usize>>, Terms) {
        match self {
            Self::Act(a) => (a, None, Terms::new()),
            Self::WithTerms(a, terms) => (a, None, terms),
            Self::WithFrameSkip(a, frame_skip, terms) => {
                let frame_skip = frame_skip.into_iter().map(|f| f + 1).collect();
                (a, Some(frame_skip), terms)
            }
        }
    }

    /// The action.
    pub fn act(&self) -> &A {
        match self {
            Self::Act(a) | Self::WithTerms(a, _) | Self::WithFrameSkip(a, _, _) => a,
        }
    }
}
