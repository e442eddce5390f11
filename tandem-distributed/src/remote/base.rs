//! Message loop, reply handles and state shared by actor and trainer workers.
use crate::{AlgorithmRegistry, DistributedError, Identifier};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use log::{debug, error, info};
use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::JoinHandle,
};

/// Sender side of a reply.
pub type Reply<T> = Sender<Result<T, DistributedError>>;

/// What a worker does after handling a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keeps receiving messages.
    Continue,

    /// Ends the worker thread.
    Stop,
}

/// State and message handler of a worker thread.
pub trait Worker: Send + 'static {
    /// Messages understood by the worker.
    type Message: Send + 'static;

    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Handles a message.
    fn handle(&mut self, message: Self::Message) -> Flow;

    /// Releases resources before the thread exits.
    fn on_stop(&mut self) {}
}

/// Runs `worker` on its own thread.
///
/// The thread ends when the worker returns [`Flow::Stop`] or when every
/// handle to its mailbox is dropped.
pub fn spawn<W: Worker>(mut worker: W) -> RemoteHandle<W::Message> {
    let (sender, receiver) = unbounded();
    let name = worker.name().to_string();
    let thread = std::thread::spawn(move || {
        info!("Worker {} starts", worker.name());
        run_loop(&mut worker, receiver);
        worker.on_stop();
        info!("Worker {} stops", worker.name());
    });

    RemoteHandle {
        name,
        sender,
        thread: Some(thread),
    }
}

fn run_loop<W: Worker>(worker: &mut W, receiver: Receiver<W::Message>) {
    while let Ok(message) = receiver.recv() {
        if worker.handle(message) == Flow::Stop {
            break;
        }
    }
}

/// Mailbox and thread of a running worker.
pub struct RemoteHandle<M> {
    name: String,
    sender: Sender<M>,
    thread: Option<JoinHandle<()>>,
}

impl<M> RemoteHandle<M> {
    /// Name of the worker.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sends a message without expecting a reply.
    pub fn send(&self, message: M) -> Result<(), DistributedError> {
        self.sender
            .send(message)
            .map_err(|_| DistributedError::WorkerDisconnected(self.name.clone()))
    }

    /// Sends a message carrying a reply channel built by `message`.
    ///
    /// A worker that is gone resolves the returned handle with
    /// [`DistributedError::WorkerDisconnected`].
    pub fn call<T>(&self, message: impl FnOnce(Reply<T>) -> M) -> Pending<T> {
        let (reply, pending) = Pending::channel(&self.name);
        match self.send(message(reply)) {
            Ok(()) => pending,
            Err(e) => Pending::failed(&self.name, e),
        }
    }

    /// Returns `true` if the worker thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Sends `stop` and waits for the thread to exit.
    pub fn stop_and_join(&mut self, stop: M) {
        // A failed send means the worker has already exited.
        let _ = self.sender.send(stop);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Worker {} panicked", self.name);
            }
        }
    }
}

/// Reply of a worker that may not have arrived yet.
pub struct Pending<T> {
    worker: String,
    receiver: Receiver<Result<T, DistributedError>>,
}

impl<T> Pending<T> {
    fn channel(worker: &str) -> (Reply<T>, Self) {
        let (sender, receiver) = bounded(1);
        let pending = Self {
            worker: worker.to_string(),
            receiver,
        };
        (sender, pending)
    }

    fn failed(worker: &str, e: DistributedError) -> Self {
        let (reply, pending) = Self::channel(worker);
        let _ = reply.send(Err(e));
        pending
    }

    /// Blocks until the reply arrives.
    pub fn wait(self) -> Result<T, DistributedError> {
        match self.receiver.recv() {
            Ok(reply) => reply,
            Err(_) => Err(DistributedError::WorkerDisconnected(self.worker)),
        }
    }
}

/// Sends a reply, ignoring callers that stopped waiting.
pub(crate) fn respond<T>(reply: Reply<T>, value: Result<T, DistributedError>) {
    let _ = reply.send(value);
}

/// Role instances of a worker keyed by identifier.
pub struct InstanceMap<T>(BTreeMap<Identifier, T>);

impl<T> Default for InstanceMap<T> {
    fn default() -> Self {
        Self(BTreeMap::new())
    }
}

impl<T> InstanceMap<T> {
    /// Inserts an instance, returning the one it replaces.
    pub fn insert(&mut self, id: Identifier, instance: T) -> Option<T> {
        self.0.insert(id, instance)
    }

    /// Returns the instance of `id`.
    pub fn get(&self, id: &Identifier) -> Result<&T, DistributedError> {
        self.0.get(id).ok_or(DistributedError::UnknownIdentifier(*id))
    }

    /// Returns the instance of `id` mutably.
    pub fn get_mut(&mut self, id: &Identifier) -> Result<&mut T, DistributedError> {
        self.0
            .get_mut(id)
            .ok_or(DistributedError::UnknownIdentifier(*id))
    }

    /// Removes the instance of `id`.
    pub fn remove(&mut self, id: &Identifier) -> Option<T> {
        self.0.remove(id)
    }

    /// Returns `true` if `id` has an instance.
    pub fn contains(&self, id: &Identifier) -> bool {
        self.0.contains_key(id)
    }

    /// Hosted identifiers in order.
    pub fn identifiers(&self) -> Vec<Identifier> {
        self.0.keys().copied().collect()
    }

    /// Iterates over instances mutably.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.0.values_mut()
    }

    /// Number of instances.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there is no instance.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Factories of the algorithms a worker has used so far.
///
/// Each algorithm is looked up in the registry once.
pub struct ConstructorCache<F> {
    registry: Arc<AlgorithmRegistry>,
    cache: HashMap<String, F>,
}

impl<F: Copy> ConstructorCache<F> {
    /// Creates an empty cache over `registry`.
    pub fn new(registry: Arc<AlgorithmRegistry>) -> Self {
        Self {
            registry,
            cache: HashMap::new(),
        }
    }

    /// Returns the factories of `algorithm`, resolving them with `lookup` on
    /// first use.
    pub fn get_or_resolve(
        &mut self,
        algorithm: &str,
        lookup: impl FnOnce(&AlgorithmRegistry, &str) -> Result<F, DistributedError>,
    ) -> Result<F, DistributedError> {
        if let Some(factories) = self.cache.get(algorithm) {
            return Ok(*factories);
        }
        let factories = lookup(&self.registry, algorithm)?;
        debug!("Resolved factories of {}", algorithm);
        self.cache.insert(algorithm.to_string(), factories);
        Ok(factories)
    }

    /// Number of resolved algorithms.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Returns `true` if nothing has been resolved.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

/// Flag asking a background task to finish.
#[derive(Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// Creates a lowered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the signal.
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once the signal is raised.
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{get_identifier, ActorFactories};
    use test_log::test;

    enum EchoMessage {
        Echo(u32, Reply<u32>),
        Stop,
    }

    struct Echo;

    impl Worker for Echo {
        type Message = EchoMessage;

        fn name(&self) -> &str {
            "echo"
        }

        fn handle(&mut self, message: EchoMessage) -> Flow {
            match message {
                EchoMessage::Echo(v, reply) => {
                    respond(reply, Ok(v));
                    Flow::Continue
                }
                EchoMessage::Stop => Flow::Stop,
            }
        }
    }

    #[test]
    fn test_call_and_stop() {
        let mut handle = spawn(Echo);
        let replies: Vec<_> = (0..3).map(|v| handle.call(|r| EchoMessage::Echo(v, r))).collect();
        let values: Vec<u32> = replies.into_iter().map(|p| p.wait().unwrap()).collect();
        assert_eq!(values, vec![0, 1, 2]);

        handle.stop_and_join(EchoMessage::Stop);
        assert!(handle.is_finished());
        assert_eq!(
            handle.call(|r| EchoMessage::Echo(7, r)).wait(),
            Err(DistributedError::WorkerDisconnected("echo".to_string()))
        );
    }

    #[test]
    fn test_instance_map() {
        let mut map = InstanceMap::default();
        let id = get_identifier(Some(1), None);
        map.insert(id, 10);
        assert_eq!(map.get(&id), Ok(&10));
        assert_eq!(
            map.get(&Identifier::SOLE),
            Err(DistributedError::UnknownIdentifier(Identifier::SOLE))
        );
        *map.get_mut(&id).unwrap() += 1;
        assert_eq!(map.identifiers(), vec![id]);
        assert_eq!(map.remove(&id), Some(11));
        assert!(map.is_empty());
    }

    #[test]
    fn test_constructor_cache_resolves_once() {
        let mut cache = ConstructorCache::<ActorFactories>::new(Arc::new(AlgorithmRegistry::new()));
        let mut lookups = 0;
        for _ in 0..2 {
            let result = cache.get_or_resolve("missing", |r, a| {
                lookups += 1;
                r.actor_factories(a)
            });
            assert!(result.is_err());
        }
        // Misses are not cached.
        assert_eq!(lookups, 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_stop_signal_is_shared() {
        let signal = StopSignal::new();
        let other = signal.clone();
        assert!(!other.is_raised());
        signal.raise();
        assert!(other.is_raised());
    }
}
