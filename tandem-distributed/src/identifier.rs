//! Addressing of role instances inside a worker.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Id of a logical agent.
pub type AgentId = u32;

/// Id of a strategy of an agent.
pub type StrategyId = u32;

/// Id a manager assigns to a worker, unrelated to [`Identifier`]s of the
/// instances it hosts.
pub type WorkerId = usize;

/// Key of a role instance hosted by a worker, derived from an agent id and a
/// strategy id.
///
/// A missing id stands for the sole instance on that axis, so the identifier
/// of `(None, None)` addresses the only instance of a single-agent setup.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Identifier {
    agent_id: Option<AgentId>,
    strategy_id: Option<StrategyId>,
}

impl Identifier {
    /// The identifier of the sole instance.
    pub const SOLE: Identifier = Identifier {
        agent_id: None,
        strategy_id: None,
    };

    /// Agent id, if any.
    pub fn agent_id(&self) -> Option<AgentId> {
        self.agent_id
    }

    /// Strategy id, if any.
    pub fn strategy_id(&self) -> Option<StrategyId> {
        self.strategy_id
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.agent_id, self.strategy_id) {
            (None, None) => write!(f, "sole"),
            (Some(a), None) => write!(f, "a{}", a),
            (Some(a), Some(s)) => write!(f, "a{}-s{}", a, s),
            (None, Some(s)) => write!(f, "s{}", s),
        }
    }
}

/// Derives the identifier of an (agent, strategy) pair.
///
/// ```rust
/// use tandem_distributed::get_identifier;
///
/// assert_eq!(get_identifier(Some(3), Some(1)).to_string(), "a3-s1");
/// assert_eq!(get_identifier(None, None), get_identifier(None, None));
/// ```
pub fn get_identifier(agent_id: Option<AgentId>, strategy_id: Option<StrategyId>) -> Identifier {
    Identifier {
        agent_id,
        strategy_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_identifier_is_injective() {
        let ids = [None, Some(0), Some(1), Some(7)];
        let mut seen = HashSet::new();
        for a in ids {
            for s in ids {
                assert_eq!(get_identifier(a, s), get_identifier(a, s));
                assert!(seen.insert(get_identifier(a, s)));
            }
        }
        let names: HashSet<String> = seen.iter().map(|i| i.to_string()).collect();
        assert_eq!(names.len(), seen.len());
    }

    #[test]
    fn test_display() {
        assert_eq!(Identifier::SOLE.to_string(), "sole");
        assert_eq!(get_identifier(Some(3), None).to_string(), "a3");
        assert_eq!(get_identifier(None, Some(1)).to_string(), "s1");
        assert_eq!(get_identifier(Some(0), Some(2)).agent_id(), Some(0));
    }
}
