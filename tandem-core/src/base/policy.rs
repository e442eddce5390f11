//! Policy.
use super::{Env, EnvOutput, PolicyOutput};

/// A mapping from environment outputs to actions.
pub trait Policy<E: Env> {
    /// Samples an action batch given the latest output of the environment.
    ///
    /// `evaluation` selects the deterministic/evaluation behavior, if any.
    fn sample(&mut self, output: &EnvOutput<E::Obs>, evaluation: bool) -> PolicyOutput<E::Act>;

    /// Resets recurrent states. Stateless policies keep the default no-op.
    fn reset_states(&mut self) {}
}
