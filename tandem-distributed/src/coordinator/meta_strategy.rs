use super::PoolConfig;
use crate::{AgentId, DistributedError, WorkerId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Index of an environment.
pub type EnvId = usize;

/// Environments the agents of a request act in.
pub type AgentToEnv = BTreeMap<AgentId, EnvId>;

/// Id of an allocation request.
pub type RequestId = usize;

/// The pool a request is served from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PoolKind {
    /// Actor workers.
    Actor,

    /// Trainer workers.
    Trainer,
}

/// Outcome of an allocation request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Allocation {
    /// The request runs on a worker.
    Placed {
        /// Request id.
        request: RequestId,

        /// Worker serving the request.
        worker_id: WorkerId,
    },

    /// The request waits for capacity.
    Queued {
        /// Request id.
        request: RequestId,
    },
}

impl Allocation {
    /// Id of the request.
    pub fn request(&self) -> RequestId {
        match self {
            Self::Placed { request, .. } | Self::Queued { request } => *request,
        }
    }
}

/// A request served by a worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Placement {
    /// Pool of the worker.
    pub kind: PoolKind,

    /// Request id.
    pub request: RequestId,

    /// Worker serving the request.
    pub worker_id: WorkerId,

    /// Agents of the request and their environments.
    pub agent_to_env: Option<AgentToEnv>,
}

/// A placement, and whether its worker must be spawned first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decision {
    /// The placement.
    pub placement: Placement,

    /// The worker is new to the pool.
    pub spawn: bool,
}

struct Pool {
    kind: PoolKind,
    config: PoolConfig,
    load: BTreeMap<WorkerId, usize>,
    next_worker_id: WorkerId,
    queue: VecDeque<(RequestId, Option<AgentToEnv>)>,
    placements: BTreeMap<RequestId, Placement>,
}

impl Pool {
    fn new(kind: PoolKind, config: &PoolConfig) -> Self {
        Self {
            kind,
            config: config.clone(),
            load: BTreeMap::new(),
            next_worker_id: 0,
            queue: VecDeque::new(),
            placements: BTreeMap::new(),
        }
    }

    fn add_worker(&mut self) -> Option<WorkerId> {
        if self.load.len() >= self.config.max_workers {
            return None;
        }
        let worker_id = self.next_worker_id;
        self.next_worker_id += 1;
        self.load.insert(worker_id, 0);
        Some(worker_id)
    }

    /// The least loaded worker with spare capacity, lowest id first.
    fn free_worker(&self) -> Option<WorkerId> {
        self.load
            .iter()
            .filter(|(_, &n)| n < self.config.tenants_per_worker)
            .min_by_key(|(&id, &n)| (n, id))
            .map(|(&id, _)| id)
    }

    fn drain(&mut self) -> Vec<Decision> {
        let mut decisions = vec![];
        while !self.queue.is_empty() {
            let (worker_id, spawn) = match self.free_worker() {
                Some(id) => (id, false),
                None => match self.add_worker() {
                    Some(id) => (id, true),
                    None => break,
                },
            };
            let Some((request, agent_to_env)) = self.queue.pop_front() else {
                break;
            };
            *self.load.entry(worker_id).or_insert(0) += 1;
            let placement = Placement {
                kind: self.kind,
                request,
                worker_id,
                agent_to_env,
            };
            self.placements.insert(request, placement.clone());
            decisions.push(Decision { placement, spawn });
        }
        decisions
    }

    fn release(&mut self, request: RequestId) -> Result<(), DistributedError> {
        if let Some(placement) = self.placements.remove(&request) {
            if let Some(n) = self.load.get_mut(&placement.worker_id) {
                *n = n.saturating_sub(1);
            }
            return Ok(());
        }
        let n = self.queue.len();
        self.queue.retain(|(r, _)| *r != request);
        if self.queue.len() < n {
            Ok(())
        } else {
            Err(DistributedError::Precondition(format!(
                "request {} is not allocated",
                request
            )))
        }
    }
}

/// Allocation policy of the coordinator.
///
/// Requests are served in FIFO order. A request goes to the least loaded
/// worker below its tenant limit; when every worker is full a new one is
/// added while the pool is below its maximum size, otherwise the request and
/// every later one wait in the queue.
pub struct MetaStrategy {
    actors: Pool,
    trainers: Pool,
    next_request: RequestId,
}

impl MetaStrategy {
    /// Creates the policy with empty pools.
    pub fn new(actor_pool: &PoolConfig, trainer_pool: &PoolConfig) -> Self {
        Self {
            actors: Pool::new(PoolKind::Actor, actor_pool),
            trainers: Pool::new(PoolKind::Trainer, trainer_pool),
            next_request: 0,
        }
    }

    fn pool(&self, kind: PoolKind) -> &Pool {
        match kind {
            PoolKind::Actor => &self.actors,
            PoolKind::Trainer => &self.trainers,
        }
    }

    fn pool_mut(&mut self, kind: PoolKind) -> &mut Pool {
        match kind {
            PoolKind::Actor => &mut self.actors,
            PoolKind::Trainer => &mut self.trainers,
        }
    }

    /// Appends a request to the queue of a pool.
    pub fn enqueue(&mut self, kind: PoolKind, agent_to_env: Option<AgentToEnv>) -> RequestId {
        let request = self.next_request;
        self.next_request += 1;
        self.pool_mut(kind).queue.push_back((request, agent_to_env));
        request
    }

    /// Adds the initial empty workers of a pool and returns their ids.
    pub fn add_initial_workers(&mut self, kind: PoolKind) -> Vec<WorkerId> {
        let pool = self.pool_mut(kind);
        (0..pool.config.initial_workers)
            .map_while(|_| pool.add_worker())
            .collect()
    }

    /// Places queued requests of a pool while they fit.
    pub fn drain(&mut self, kind: PoolKind) -> Vec<Decision> {
        self.pool_mut(kind).drain()
    }

    /// Frees the capacity held by a placed request, or drops a queued one.
    pub fn release(&mut self, kind: PoolKind, request: RequestId) -> Result<(), DistributedError> {
        self.pool_mut(kind).release(request)
    }

    /// Current placements of a pool in request order.
    pub fn placements(&self, kind: PoolKind) -> Vec<Placement> {
        self.pool(kind).placements.values().cloned().collect()
    }

    /// Queued requests of a pool in FIFO order.
    pub fn queued(&self, kind: PoolKind) -> Vec<RequestId> {
        self.pool(kind).queue.iter().map(|(r, _)| *r).collect()
    }

    /// Number of requests a worker serves.
    pub fn load(&self, kind: PoolKind, worker_id: WorkerId) -> Option<usize> {
        self.pool(kind).load.get(&worker_id).copied()
    }

    /// Number of workers in a pool.
    pub fn n_workers(&self, kind: PoolKind) -> usize {
        self.pool(kind).load.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn strategy(initial: usize, max: usize, tenants: usize) -> MetaStrategy {
        let pool = PoolConfig::default()
            .initial_workers(initial)
            .max_workers(max)
            .tenants_per_worker(tenants);
        MetaStrategy::new(&pool, &pool)
    }

    #[test]
    fn test_spreads_over_least_loaded_workers() {
        let mut s = strategy(2, 2, 2);
        assert_eq!(s.add_initial_workers(PoolKind::Actor), vec![0, 1]);
        (0..3).for_each(|_| {
            s.enqueue(PoolKind::Actor, None);
        });

        let workers: Vec<_> = s
            .drain(PoolKind::Actor)
            .into_iter()
            .map(|d| (d.placement.worker_id, d.spawn))
            .collect();
        assert_eq!(workers, vec![(0, false), (1, false), (0, false)]);
        assert_eq!(s.load(PoolKind::Actor, 0), Some(2));
        assert_eq!(s.n_workers(PoolKind::Trainer), 0);
    }

    #[test]
    fn test_spawns_within_limit_then_queues() {
        let mut s = strategy(0, 2, 1);
        let requests: Vec<_> = (0..3).map(|_| s.enqueue(PoolKind::Trainer, None)).collect();

        let decisions = s.drain(PoolKind::Trainer);
        assert_eq!(decisions.len(), 2);
        assert!(decisions.iter().all(|d| d.spawn));
        assert_eq!(s.queued(PoolKind::Trainer), vec![requests[2]]);

        s.release(PoolKind::Trainer, requests[0]).unwrap();
        let decisions = s.drain(PoolKind::Trainer);
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].placement.request, requests[2]);
        assert_eq!(decisions[0].placement.worker_id, 0);
        assert!(!decisions[0].spawn);
    }

    #[test]
    fn test_queue_is_fifo() {
        let mut s = strategy(0, 1, 1);
        let a = s.enqueue(PoolKind::Actor, None);
        let b = s.enqueue(PoolKind::Actor, Some([(0, 3)].into_iter().collect()));
        let c = s.enqueue(PoolKind::Actor, None);
        s.drain(PoolKind::Actor);

        s.release(PoolKind::Actor, a).unwrap();
        let placed = s.drain(PoolKind::Actor);
        assert_eq!(placed[0].placement.request, b);
        assert_eq!(placed[0].placement.agent_to_env.as_ref().and_then(|m| m.get(&0)), Some(&3));
        assert_eq!(s.queued(PoolKind::Actor), vec![c]);

        // Queued requests may be withdrawn.
        s.release(PoolKind::Actor, c).unwrap();
        assert!(s.queued(PoolKind::Actor).is_empty());
        assert!(s.release(PoolKind::Actor, c).is_err());
    }
}
