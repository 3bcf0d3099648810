//! The invocation registry: address book and dispatcher of a process.
//!
//! A [`Registry`] binds exported objects to bus destinations and turns proxy calls into
//! published requests. It owns a small tokio runtime consuming its subscriptions: one
//! consumer task per exported destination, plus one for its own anonymous reply destination.
//!
//! Requests are handed to the skeleton of the object bound at their destination and run on the
//! runtime's blocking pool, so a skeleton may itself call through proxies (including callbacks
//! into the calling process) without starving the consumers. Replies complete the pending call
//! carrying the same correlation token.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use courier::{bus::Destination, error::RemoteError, registry::Registry, remote_interface, Remote};
//!
//! #[remote_interface]
//! pub trait Counter {
//!     fn add(&self, n: u64) -> Result<u64, RemoteError>;
//! }
//!
//! #[derive(Remote)]
//! struct Fixed(u64);
//!
//! impl Counter for Fixed {
//!     fn add(&self, n: u64) -> Result<u64, RemoteError> {
//!         Ok(self.0 + n)
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Registry::builder().build()?;
//! let counter: Arc<dyn Counter> = Arc::new(Fixed(40));
//! registry.export_at(&counter, Destination::well_known("COUNTER"))?;
//!
//! let proxy = registry.lookup::<dyn Counter>(Destination::well_known("COUNTER"));
//! assert_eq!(proxy.add(2)?, 42);
//! # Ok(())
//! # }
//! ```

use std::{
    any::Any,
    cell::RefCell,
    collections::HashMap,
    fmt,
    future::Future,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, Weak,
    },
    time::Duration,
};

use futures::StreamExt;
use tokio::{
    runtime::{Handle, Runtime},
    sync::{OwnedSemaphorePermit, Semaphore},
    task::JoinHandle,
};
use tracing::{debug, error, trace, warn};

use crate::{
    bus::{Destination, MemoryBus, MessageBus, Subscription},
    config::RegistryConfig,
    error::{ExportError, RemoteError, StartError},
    id::ObjectId,
    marshal::Marshaler,
    pending::{PendingCall, PendingCalls},
    proxy::{RemoteRef, Response},
    remote::{self, RemoteInterface},
    skeleton::{Failure, Skeleton},
    wire::{
        Envelope, InvocationReply, InvocationRequest, Marshaled, MethodSignature, ObjectRef,
        Outcome,
    },
};

/// A handle to an invocation registry.
///
/// Handles are cheap to clone; the registry shuts down when the last handle, including those
/// held by proxies it created, is dropped.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    config: RegistryConfig,
    bus: Arc<dyn MessageBus>,
    runtime: Option<Runtime>,
    handle: Handle,
    reply_to: Destination,
    exports: Mutex<ExportTable>,
    pending: PendingCalls,
    permits: Arc<Semaphore>,
    closed: AtomicBool,
    reply_loop: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Default)]
struct ExportTable {
    by_destination: HashMap<Destination, ExportRecord>,
    by_identity: HashMap<usize, Destination>,
}

struct ExportRecord {
    object_id: ObjectId,
    destination: Destination,
    interface: &'static str,
    identity: usize,
    skeleton: Arc<dyn Skeleton>,
    consumer: Option<JoinHandle<()>>,
}

impl ExportRecord {
    fn object_ref(&self) -> ObjectRef {
        ObjectRef {
            destination: self.destination.clone(),
            object_id: Some(self.object_id),
            interface: self.interface.into(),
        }
    }

    fn stop(self) -> Destination {
        if let Some(consumer) = self.consumer {
            consumer.abort();
        }
        self.destination
    }
}

impl ExportTable {
    fn insert(&mut self, record: ExportRecord) {
        self.by_identity
            .insert(record.identity, record.destination.clone());
        self.by_destination
            .insert(record.destination.clone(), record);
    }

    fn remove(&mut self, destination: &Destination) -> Option<ExportRecord> {
        let record = self.by_destination.remove(destination)?;
        self.by_identity.remove(&record.identity);
        Some(record)
    }
}

/// Builds a [`Registry`].
#[derive(Default)]
pub struct RegistryBuilder {
    config: RegistryConfig,
    bus: Option<Arc<dyn MessageBus>>,
}

impl fmt::Debug for RegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryBuilder")
            .field("config", &self.config)
            .field("bus", &self.bus.as_ref().map(|_| "MessageBus"))
            .finish()
    }
}

impl RegistryBuilder {
    /// Uses the given bus. Without one, the registry gets a private [`MemoryBus`].
    pub fn bus(mut self, bus: Arc<dyn MessageBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the default window a proxy call waits for its reply.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = timeout;
        self
    }

    /// Sets the number of runtime worker threads.
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.config.worker_threads = threads;
        self
    }

    /// Sets the bound on skeleton invocations running at once.
    pub fn max_concurrent_invocations(mut self, max: usize) -> Self {
        self.config.max_concurrent_invocations = max;
        self
    }

    /// Publishes calls to unit-returning methods without waiting for a reply.
    pub fn one_way_unit_calls(mut self, enabled: bool) -> Self {
        self.config.one_way_unit_calls = enabled;
        self
    }

    /// Starts the runtime, subscribes the reply destination and returns the registry.
    pub fn build(self) -> Result<Registry, StartError> {
        let RegistryBuilder { config, bus } = self;
        let bus = bus.unwrap_or_else(|| Arc::new(MemoryBus::new()) as Arc<dyn MessageBus>);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .thread_name(config.thread_name.clone())
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();

        let reply_to = bus.allocate_anonymous()?;
        let replies = {
            let _guard = handle.enter();
            futures::executor::block_on(bus.subscribe(&reply_to))?
        };

        let permits = Arc::new(Semaphore::new(config.max_concurrent_invocations.max(1)));
        let registry = Registry {
            inner: Arc::new(RegistryInner {
                config,
                bus,
                runtime: Some(runtime),
                handle,
                reply_to,
                exports: Mutex::default(),
                pending: PendingCalls::new(),
                permits,
                closed: AtomicBool::new(false),
                reply_loop: Mutex::new(None),
            }),
        };

        let reply_loop = registry.spawn_reply_loop(replies);
        *lock(&registry.inner.reply_loop) = Some(reply_loop);
        debug!(reply_to = %registry.inner.reply_to, "registry started");

        Ok(registry)
    }
}

impl Registry {
    /// Returns a builder with the default configuration.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Builds a registry over `bus` with the default configuration.
    pub fn new(bus: Arc<dyn MessageBus>) -> Result<Self, StartError> {
        Registry::builder().bus(bus).build()
    }

    /// The configuration the registry was built with.
    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    /// The bus the registry publishes to.
    pub fn bus(&self) -> &Arc<dyn MessageBus> {
        &self.inner.bus
    }

    /// The anonymous destination replies to this registry's calls are sent to.
    pub fn reply_destination(&self) -> &Destination {
        &self.inner.reply_to
    }

    /// Exports `object` at a fresh anonymous destination and returns a proxy to it.
    ///
    /// Exporting an object that is already exported reuses its existing record.
    pub fn export<I>(&self, object: &Arc<I>) -> Result<Arc<I>, ExportError>
    where
        I: ?Sized + RemoteInterface,
    {
        let object = self.export_object(object, None)?;
        Ok(I::into_proxy(RemoteRef::new(object, self.clone())))
    }

    /// Exports `object` at a well-known destination and returns a proxy to it.
    ///
    /// Re-exporting the same object at the same destination reuses the existing record.
    /// Fails with [`ExportError::DestinationInUse`] if another object is bound to the
    /// destination, and with [`ExportError::AlreadyExported`] if the object is bound elsewhere.
    pub fn export_at<I>(
        &self,
        object: &Arc<I>,
        destination: Destination,
    ) -> Result<Arc<I>, ExportError>
    where
        I: ?Sized + RemoteInterface,
    {
        let object = self.export_object(object, Some(destination))?;
        Ok(I::into_proxy(RemoteRef::new(object, self.clone())))
    }

    /// Returns a proxy to whichever object is bound at `destination`.
    ///
    /// No message is sent; a call through the proxy fails if nothing serves the destination.
    pub fn lookup<I>(&self, destination: Destination) -> Arc<I>
    where
        I: ?Sized + RemoteInterface,
    {
        I::into_proxy(RemoteRef::new(Self::unbound(destination, I::NAME), self.clone()))
    }

    /// Returns a proxy to whichever object is bound at `destination`, whose calls wait at most
    /// `timeout` for a reply.
    pub fn lookup_with_timeout<I>(&self, destination: Destination, timeout: Duration) -> Arc<I>
    where
        I: ?Sized + RemoteInterface,
    {
        let remote = RemoteRef::new(Self::unbound(destination, I::NAME), self.clone());
        I::into_proxy(remote.with_timeout(timeout))
    }

    /// Removes the export of `object`. Returns `false` if it was not exported.
    pub fn unexport<I>(&self, object: &Arc<I>) -> bool
    where
        I: ?Sized + RemoteInterface,
    {
        let identity = remote::identity(object);
        let record = {
            let mut exports = self.inner.exports();
            let Some(destination) = exports.by_identity.get(&identity).cloned() else {
                return false;
            };
            exports.remove(&destination)
        };
        match record {
            Some(record) => {
                self.inner.release(record);
                true
            }
            None => false,
        }
    }

    /// Removes the export bound at `destination`. Returns `false` if nothing was bound there.
    pub fn unexport_destination(&self, destination: &Destination) -> bool {
        let record = self.inner.exports().remove(destination);
        match record {
            Some(record) => {
                self.inner.release(record);
                true
            }
            None => false,
        }
    }

    /// Tears the registry down.
    ///
    /// Every export is removed and its subscription released, the reply destination is
    /// released, and every outstanding call fails with [`RemoteError::TransportUnavailable`].
    /// Later calls and exports fail the same way. The bus itself is left open, since it may be
    /// shared with other registries. Resetting twice is a no-op.
    pub fn reset(&self) {
        self.inner.shutdown("registry reset");
    }

    /// Returns `true` once the registry has been reset.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// The number of live exports.
    pub fn export_count(&self) -> usize {
        self.inner.exports().by_destination.len()
    }

    /// The number of calls awaiting a reply.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Exports `object`, returning the reference to send in its place.
    pub(crate) fn export_object<I>(
        &self,
        object: &Arc<I>,
        at: Option<Destination>,
    ) -> Result<ObjectRef, ExportError>
    where
        I: ?Sized + RemoteInterface,
    {
        if self.is_closed() {
            return Err(ExportError::Closed);
        }
        // Proxies are never re-exported; they stand for the object they already reference.
        if let Some(remote) = <I as RemoteInterface>::remote_ref(object) {
            let existing = remote.object();
            return match at {
                Some(at) if at != existing.destination => {
                    Err(ExportError::AlreadyExported(existing.destination.clone()))
                }
                _ => Ok(existing.clone()),
            };
        }
        let identity = remote::identity(object);

        // The record goes in before the subscription so that concurrent exports of the same
        // object agree on one destination.
        let destination = {
            let mut exports = self.inner.exports();
            if let Some(existing) = exports.by_identity.get(&identity) {
                return match at {
                    Some(at) if &at != existing => {
                        Err(ExportError::AlreadyExported(existing.clone()))
                    }
                    _ => Ok(exports.by_destination[existing].object_ref()),
                };
            }
            let destination = match at {
                Some(at) if exports.by_destination.contains_key(&at) => {
                    return Err(ExportError::DestinationInUse(at));
                }
                Some(at) => at,
                None => self.inner.bus.allocate_anonymous()?,
            };
            exports.insert(ExportRecord {
                object_id: ObjectId::generate(),
                destination: destination.clone(),
                interface: I::NAME,
                identity,
                skeleton: I::skeleton(Arc::clone(object)),
                consumer: None,
            });
            destination
        };

        let messages = match self.inner.block_on(|| self.inner.bus.subscribe(&destination)) {
            Ok(messages) => messages,
            Err(err) => {
                self.inner.exports().remove(&destination);
                if !destination.is_well_known() {
                    self.inner.block_on(|| self.inner.bus.unsubscribe(&destination));
                }
                return Err(err.into());
            }
        };
        let consumer = self.spawn_consumer(destination.clone(), messages);

        let mut exports = self.inner.exports();
        match exports.by_destination.get_mut(&destination) {
            Some(record) if record.identity == identity => {
                record.consumer = Some(consumer);
                debug!(%destination, interface = I::NAME, object_id = %record.object_id, "exported object");
                Ok(record.object_ref())
            }
            // Unexported or reset while subscribing.
            _ => {
                consumer.abort();
                Err(ExportError::Closed)
            }
        }
    }

    /// Publishes a request and blocks until its reply arrives.
    pub(crate) fn call(
        &self,
        object: &ObjectRef,
        method: &MethodSignature,
        args: Vec<Marshaled>,
        returns_unit: bool,
        timeout: Duration,
    ) -> Result<Response, RemoteError> {
        if self.is_closed() {
            return Err(RemoteError::TransportUnavailable(
                "registry has been shut down".to_string(),
            ));
        }
        let destination = &object.destination;

        if returns_unit && self.inner.config.one_way_unit_calls {
            let correlation = self.inner.pending.next_token();
            let request = Envelope::Request(InvocationRequest {
                target: object.object_id,
                method: method.clone(),
                args,
                reply_to: None,
                correlation,
            });
            let message = request.encode()?;
            self.inner
                .block_on(|| self.inner.bus.publish(destination, message))?;
            trace!(%destination, %method, %correlation, "sent one-way request");
            return Ok(Response::Sent);
        }

        let PendingCall { correlation, reply } = self.inner.pending.register()?;
        let request = Envelope::Request(InvocationRequest {
            target: object.object_id,
            method: method.clone(),
            args,
            reply_to: Some(self.inner.reply_to.clone()),
            correlation,
        });
        let sent = request
            .encode()
            .map_err(RemoteError::from)
            .and_then(|message| {
                self.inner
                    .block_on(|| self.inner.bus.publish(destination, message))
                    .map_err(RemoteError::from)
            });
        if let Err(err) = sent {
            self.inner.pending.evict(correlation);
            return Err(err);
        }
        trace!(%destination, %method, %correlation, "sent request");

        let waited = {
            let _suspended = SuspendedPermit::suspend();
            self.inner.block_on(|| tokio::time::timeout(timeout, reply))
        };
        match waited {
            Ok(Ok(Outcome::Returned(value))) => Ok(Response::Returned(value)),
            Ok(Ok(Outcome::Raised(err))) => Ok(Response::Raised(err)),
            Ok(Ok(Outcome::Failed(err))) => Err(err),
            Ok(Err(_)) => Err(RemoteError::TransportUnavailable(
                "registry dropped the pending call".to_string(),
            )),
            Err(_) => {
                self.inner.pending.evict(correlation);
                debug!(%destination, %method, %correlation, ?timeout, "call timed out");
                Err(RemoteError::Timeout {
                    method: method.to_string(),
                    timeout,
                })
            }
        }
    }

    fn unbound(destination: Destination, interface: &'static str) -> ObjectRef {
        ObjectRef {
            destination,
            object_id: None,
            interface: interface.into(),
        }
    }

    fn spawn_reply_loop(&self, mut replies: Subscription) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        let destination = self.inner.reply_to.clone();
        self.inner.handle.spawn(async move {
            while let Some(message) = replies.next().await {
                let Some(registry) = upgrade(&weak) else {
                    return;
                };
                registry.dispatch(&destination, message);
            }
            if let Some(registry) = upgrade(&weak) {
                let failed = registry
                    .inner
                    .pending
                    .fail_all("reply subscription ended");
                warn!(%destination, failed, "reply subscription ended, failing outstanding calls");
            }
        })
    }

    fn spawn_consumer(
        &self,
        destination: Destination,
        mut messages: Subscription,
    ) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        self.inner.handle.spawn(async move {
            while let Some(message) = messages.next().await {
                let Some(registry) = upgrade(&weak) else {
                    return;
                };
                registry.dispatch(&destination, message);
            }
            trace!(%destination, "subscription ended");
        })
    }

    /// Routes one inbound message.
    fn dispatch(&self, destination: &Destination, message: Vec<u8>) {
        let envelope = match Envelope::decode(&message) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(%destination, len = message.len(), "dropping undecodable message: {err}");
                return;
            }
        };

        match envelope {
            Envelope::Request(request) => self.handle_request(destination, request),
            Envelope::Reply(InvocationReply {
                correlation,
                outcome,
            }) => {
                if self.inner.pending.complete(correlation, outcome) {
                    trace!(%correlation, "delivered reply");
                } else {
                    debug!(%correlation, "dropping reply for unknown or expired call");
                }
            }
        }
    }

    fn handle_request(&self, destination: &Destination, request: InvocationRequest) {
        trace!(%destination, method = %request.method, correlation = %request.correlation, "received request");
        let bound = self
            .inner
            .exports()
            .by_destination
            .get(destination)
            .map(|record| (record.object_id, Arc::clone(&record.skeleton)));
        let destination = destination.clone();
        let registry = self.clone();

        self.inner.handle.spawn(async move {
            let permits = Arc::clone(&registry.inner.permits);
            let permit = match &bound {
                Some(_) => match Arc::clone(&permits).acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => return,
                },
                None => None,
            };
            let result = tokio::task::spawn_blocking(move || {
                let _held = permit.map(|permit| HeldPermit::hold(permits, permit));
                registry.run_invocation(&destination, bound, request);
            })
            .await;
            if let Err(err) = result {
                if !err.is_cancelled() {
                    error!("invocation task failed: {err}");
                }
            }
        });
    }

    /// Invokes the bound skeleton and publishes the reply. Runs on the blocking pool.
    fn run_invocation(
        &self,
        destination: &Destination,
        bound: Option<(ObjectId, Arc<dyn Skeleton>)>,
        request: InvocationRequest,
    ) {
        let InvocationRequest {
            target,
            method,
            args,
            reply_to,
            correlation,
        } = request;

        let outcome = match bound {
            Some((object_id, _)) if target.is_some_and(|target| target != object_id) => {
                debug!(%destination, %method, "request targets a stale export");
                Outcome::Failed(RemoteError::NoSuchObject(destination.clone()))
            }
            Some((_, skeleton)) => self.invoke(destination, &*skeleton, &method, args),
            None => {
                debug!(%destination, %method, "no object exported at destination");
                Outcome::Failed(RemoteError::NoSuchObject(destination.clone()))
            }
        };

        let Some(reply_to) = reply_to else {
            if let Outcome::Failed(err) = &outcome {
                debug!(%destination, %method, "one-way call failed: {err}");
            }
            return;
        };
        let reply = Envelope::Reply(InvocationReply {
            correlation,
            outcome,
        });
        let message = match reply.encode() {
            Ok(message) => message,
            Err(err) => {
                error!(%reply_to, %correlation, "failed to encode reply: {err}");
                return;
            }
        };
        match self
            .inner
            .block_on(|| self.inner.bus.publish(&reply_to, message))
        {
            Ok(()) => trace!(%reply_to, %correlation, "sent reply"),
            Err(err) => error!(%reply_to, %correlation, "failed to publish reply: {err}"),
        }
    }

    fn invoke(
        &self,
        destination: &Destination,
        skeleton: &dyn Skeleton,
        method: &MethodSignature,
        args: Vec<Marshaled>,
    ) -> Outcome {
        let marshaler = Marshaler::new(self);
        match panic::catch_unwind(AssertUnwindSafe(|| skeleton.invoke(&marshaler, method, args))) {
            Ok(Ok(value)) => Outcome::Returned(value),
            Ok(Err(Failure::Raised(err))) => Outcome::Raised(err),
            Ok(Err(Failure::Error(err))) => {
                debug!(%destination, %method, "invocation failed: {err}");
                Outcome::Failed(err)
            }
            Err(payload) => {
                let reason = panic_message(&*payload);
                error!(
                    %destination,
                    interface = skeleton.interface(),
                    %method,
                    "invocation panicked: {reason}"
                );
                Outcome::Failed(RemoteError::InvocationPanicked(reason))
            }
        }
    }
}

thread_local! {
    static INVOCATION_PERMIT: RefCell<Option<InvocationPermit>> = const { RefCell::new(None) };
}

/// The permit of the skeleton invocation running on a blocking thread.
struct InvocationPermit {
    semaphore: Arc<Semaphore>,
    permit: Option<OwnedSemaphorePermit>,
}

/// Keeps an invocation permit attached to the current thread until dropped.
struct HeldPermit;

impl HeldPermit {
    fn hold(semaphore: Arc<Semaphore>, permit: OwnedSemaphorePermit) -> Self {
        INVOCATION_PERMIT.with(|slot| {
            *slot.borrow_mut() = Some(InvocationPermit {
                semaphore,
                permit: Some(permit),
            });
        });
        HeldPermit
    }
}

impl Drop for HeldPermit {
    fn drop(&mut self) {
        INVOCATION_PERMIT.with(|slot| slot.borrow_mut().take());
    }
}

/// Releases the current thread's invocation permit while a skeleton waits on a reply, and
/// takes one back when dropped.
///
/// A skeleton blocked on an outbound call does not count against the invocation bound. Threads
/// not running a skeleton hold no permit and suspend nothing.
struct SuspendedPermit(Option<Arc<Semaphore>>);

impl SuspendedPermit {
    fn suspend() -> Self {
        let semaphore = INVOCATION_PERMIT.with(|slot| {
            let mut slot = slot.borrow_mut();
            let held = slot.as_mut()?;
            drop(held.permit.take()?);
            Some(Arc::clone(&held.semaphore))
        });
        SuspendedPermit(semaphore)
    }
}

impl Drop for SuspendedPermit {
    fn drop(&mut self) {
        let Some(semaphore) = self.0.take() else {
            return;
        };
        let Ok(permit) = futures::executor::block_on(semaphore.acquire_owned()) else {
            return;
        };
        INVOCATION_PERMIT.with(|slot| {
            if let Some(held) = slot.borrow_mut().as_mut() {
                held.permit = Some(permit);
            }
        });
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("reply_to", &self.inner.reply_to)
            .field("exports", &self.export_count())
            .field("pending", &self.pending_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl RegistryInner {
    fn exports(&self) -> MutexGuard<'_, ExportTable> {
        lock(&self.exports)
    }

    /// Drives a bus future to completion on the calling thread.
    ///
    /// The future is created inside the runtime context so that timers and tasks it sets up
    /// are bound to this registry's runtime.
    fn block_on<F, Fut>(&self, f: F) -> Fut::Output
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        let _guard = self.handle.enter();
        futures::executor::block_on(f())
    }

    fn release(&self, record: ExportRecord) {
        let destination = record.stop();
        self.block_on(|| self.bus.unsubscribe(&destination));
        debug!(%destination, "unexported object");
    }

    fn shutdown(&self, reason: &str) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let records: Vec<_> = {
            let mut exports = self.exports();
            exports.by_identity.clear();
            exports.by_destination.drain().map(|(_, record)| record).collect()
        };
        let exports = records.len();
        for record in records {
            let destination = record.stop();
            self.block_on(|| self.bus.unsubscribe(&destination));
        }

        if let Some(reply_loop) = lock(&self.reply_loop).take() {
            reply_loop.abort();
        }
        self.block_on(|| self.bus.unsubscribe(&self.reply_to));
        let failed = self.pending.fail_all(reason);

        debug!(exports, failed, "{reason}");
    }
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        self.shutdown("registry dropped");
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

fn upgrade(weak: &Weak<RegistryInner>) -> Option<Registry> {
    weak.upgrade().map(|inner| Registry { inner })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    // Types are strings if panicked with the `std::panic!` macro
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("panicked")
        .to_string()
}
