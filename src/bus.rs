//! Addressable endpoints and the message bus seam.
//!
//! The bus itself is an external collaborator: anything that can publish opaque byte
//! messages to a [`Destination`], hand out a stream of messages arriving at one, and mint
//! anonymous destinations can carry remote invocations. [`MemoryBus`] is an in-process
//! implementation with queue semantics, used by tests and by the process-wide registry.
//!
//! # Example
//!
//! ```
//! use courier::bus::{Destination, MemoryBus, MessageBus};
//! use futures::StreamExt;
//!
//! # futures::executor::block_on(async {
//! let bus = MemoryBus::new();
//! let queue = Destination::well_known("FOO");
//!
//! // Well-known queues buffer messages until a consumer subscribes.
//! bus.publish(&queue, b"ping".to_vec()).await?;
//! let mut messages = bus.subscribe(&queue).await?;
//! assert_eq!(messages.next().await, Some(b"ping".to_vec()));
//! # Ok::<(), courier::error::BusError>(())
//! # });
//! ```

use std::{
    collections::{hash_map::Entry, HashMap},
    fmt,
    sync::{Mutex, MutexGuard, PoisonError},
};

use futures::{
    future::{self, BoxFuture},
    stream::BoxStream,
    FutureExt, StreamExt,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::BusError;

/// A stream of raw messages arriving at a subscribed destination.
///
/// The stream ends when the destination is unsubscribed or the bus connection closes.
pub type Subscription = BoxStream<'static, Vec<u8>>;

/// An address on the message bus.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Destination {
    /// A caller-supplied, stable address which may be shared out-of-band.
    WellKnown(String),
    /// A system-allocated address, unique for the lifetime of the bus.
    Anonymous(u64),
}

impl Destination {
    /// Creates a well-known destination with the given name.
    pub fn well_known(name: impl Into<String>) -> Self {
        Destination::WellKnown(name.into())
    }

    /// Creates an anonymous destination with the given sequence number.
    ///
    /// Buses mint these through [`MessageBus::allocate_anonymous`]; constructing one by hand is
    /// only useful for tests and bus implementations.
    pub fn anonymous(sequence: u64) -> Self {
        Destination::Anonymous(sequence)
    }

    /// Returns `true` if this is a well-known destination.
    pub fn is_well_known(&self) -> bool {
        matches!(self, Destination::WellKnown(_))
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::WellKnown(name) => write!(f, "queue://{name}"),
            Destination::Anonymous(sequence) => write!(f, "temp://{sequence}"),
        }
    }
}

/// Publish/subscribe primitives of an asynchronous message bus.
///
/// Delivery ordering and guarantees are whatever the implementation provides; the
/// invocation layer does not strengthen them.
pub trait MessageBus: Send + Sync + 'static {
    /// Mints a fresh anonymous destination.
    fn allocate_anonymous(&self) -> Result<Destination, BusError>;

    /// Starts consuming messages arriving at `destination`.
    fn subscribe<'a>(
        &'a self,
        destination: &'a Destination,
    ) -> BoxFuture<'a, Result<Subscription, BusError>>;

    /// Stops consuming `destination`, ending its subscription stream.
    ///
    /// Anonymous destinations are released and cannot be published to afterwards.
    fn unsubscribe<'a>(&'a self, destination: &'a Destination) -> BoxFuture<'a, ()>;

    /// Publishes a message to `destination`.
    fn publish<'a>(
        &'a self,
        destination: &'a Destination,
        message: Vec<u8>,
    ) -> BoxFuture<'a, Result<(), BusError>>;

    /// Closes the connection. Every subscription ends and later publishes fail.
    fn close(&self) -> BoxFuture<'_, ()>;
}

/// An in-process message bus with queue semantics.
///
/// - Every destination is a queue with at most one consumer.
/// - Well-known queues are created on first use and buffer messages until consumed.
/// - Anonymous queues exist from [`allocate_anonymous`](MessageBus::allocate_anonymous)
///   until they are unsubscribed; publishing to a released one fails with
///   [`BusError::UnknownDestination`].
/// - [`close`](MessageBus::close) simulates a lost connection.
#[derive(Debug, Default)]
pub struct MemoryBus {
    state: Mutex<BusState>,
}

#[derive(Debug, Default)]
struct BusState {
    closed: bool,
    next_anonymous: u64,
    queues: HashMap<Destination, Queue>,
}

#[derive(Debug)]
struct Queue {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl Queue {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Queue { tx, rx: Some(rx) }
    }
}

impl MemoryBus {
    /// Creates a new open bus with no destinations.
    pub fn new() -> Self {
        MemoryBus::default()
    }

    /// Returns `true` once the bus has been closed.
    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    /// The number of live queues.
    pub fn queue_count(&self) -> usize {
        self.state().queues.len()
    }

    fn state(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribe_now(&self, destination: &Destination) -> Result<Subscription, BusError> {
        let mut state = self.state();
        if state.closed {
            return Err(BusError::Closed);
        }
        let queue = match state.queues.entry(destination.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) if destination.is_well_known() => entry.insert(Queue::new()),
            Entry::Vacant(_) => return Err(BusError::UnknownDestination(destination.clone())),
        };
        let rx = queue
            .rx
            .take()
            .ok_or_else(|| BusError::AlreadySubscribed(destination.clone()))?;
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    fn publish_now(&self, destination: &Destination, message: Vec<u8>) -> Result<(), BusError> {
        let mut state = self.state();
        if state.closed {
            return Err(BusError::Closed);
        }
        let message = match state.queues.get(destination) {
            Some(queue) => match queue.tx.send(message) {
                Ok(()) => return Ok(()),
                // The consumer went away without unsubscribing.
                Err(mpsc::error::SendError(message)) => {
                    state.queues.remove(destination);
                    message
                }
            },
            None => message,
        };
        if !destination.is_well_known() {
            return Err(BusError::UnknownDestination(destination.clone()));
        }
        let queue = state
            .queues
            .entry(destination.clone())
            .or_insert_with(Queue::new);
        queue
            .tx
            .send(message)
            .map_err(|_| BusError::UnknownDestination(destination.clone()))
    }
}

impl MessageBus for MemoryBus {
    fn allocate_anonymous(&self) -> Result<Destination, BusError> {
        let mut state = self.state();
        if state.closed {
            return Err(BusError::Closed);
        }
        let destination = Destination::Anonymous(state.next_anonymous);
        state.next_anonymous += 1;
        state.queues.insert(destination.clone(), Queue::new());
        Ok(destination)
    }

    fn subscribe<'a>(
        &'a self,
        destination: &'a Destination,
    ) -> BoxFuture<'a, Result<Subscription, BusError>> {
        future::ready(self.subscribe_now(destination)).boxed()
    }

    fn unsubscribe<'a>(&'a self, destination: &'a Destination) -> BoxFuture<'a, ()> {
        self.state().queues.remove(destination);
        future::ready(()).boxed()
    }

    fn publish<'a>(
        &'a self,
        destination: &'a Destination,
        message: Vec<u8>,
    ) -> BoxFuture<'a, Result<(), BusError>> {
        future::ready(self.publish_now(destination, message)).boxed()
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        let mut state = self.state();
        state.closed = true;
        state.queues.clear();
        future::ready(()).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn well_known_queue_buffers_until_subscribed() {
        let bus = MemoryBus::new();
        let foo = Destination::well_known("FOO");

        bus.publish(&foo, vec![1]).await.unwrap();
        bus.publish(&foo, vec![2]).await.unwrap();
        let mut messages = bus.subscribe(&foo).await.unwrap();

        assert_eq!(messages.next().await, Some(vec![1]));
        assert_eq!(messages.next().await, Some(vec![2]));
    }

    #[tokio::test]
    async fn queue_allows_a_single_consumer() {
        let bus = MemoryBus::new();
        let foo = Destination::well_known("FOO");

        let _messages = bus.subscribe(&foo).await.unwrap();
        assert_eq!(
            bus.subscribe(&foo).await.err(),
            Some(BusError::AlreadySubscribed(foo))
        );
    }

    #[tokio::test]
    async fn anonymous_destinations_are_unique_and_released() {
        let bus = MemoryBus::new();
        let a = bus.allocate_anonymous().unwrap();
        let b = bus.allocate_anonymous().unwrap();
        assert_ne!(a, b);

        let mut messages = bus.subscribe(&a).await.unwrap();
        bus.publish(&a, vec![7]).await.unwrap();
        assert_eq!(messages.next().await, Some(vec![7]));

        bus.unsubscribe(&a).await;
        assert_eq!(messages.next().await, None);
        assert_eq!(
            bus.publish(&a, vec![8]).await,
            Err(BusError::UnknownDestination(a))
        );
    }

    #[tokio::test]
    async fn never_allocated_anonymous_destination_is_unknown() {
        let bus = MemoryBus::new();
        let ghost = Destination::anonymous(42);
        assert_eq!(
            bus.publish(&ghost, vec![]).await,
            Err(BusError::UnknownDestination(ghost))
        );
    }

    #[tokio::test]
    async fn dropped_consumer_recreates_well_known_queue() {
        let bus = MemoryBus::new();
        let foo = Destination::well_known("FOO");
        drop(bus.subscribe(&foo).await.unwrap());

        bus.publish(&foo, vec![9]).await.unwrap();
        let mut messages = bus.subscribe(&foo).await.unwrap();
        assert_eq!(messages.next().await, Some(vec![9]));
    }

    #[tokio::test]
    async fn close_ends_subscriptions_and_rejects_publishes() {
        let bus = MemoryBus::new();
        let foo = Destination::well_known("FOO");
        let mut messages = bus.subscribe(&foo).await.unwrap();

        bus.close().await;

        assert!(bus.is_closed());
        assert_eq!(messages.next().await, None);
        assert_eq!(bus.publish(&foo, vec![]).await, Err(BusError::Closed));
        assert_eq!(bus.allocate_anonymous(), Err(BusError::Closed));
    }

    #[test]
    fn destinations_display_as_urls() {
        assert_eq!(Destination::well_known("FOO").to_string(), "queue://FOO");
        assert_eq!(Destination::anonymous(4).to_string(), "temp://4");
    }
}
