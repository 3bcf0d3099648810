//! Registry configuration.

use std::time::Duration;

/// The default window a proxy call waits for its reply.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// The default number of runtime worker threads driving the bus.
pub const DEFAULT_WORKER_THREADS: usize = 2;

/// The default bound on skeleton invocations running at once.
pub const DEFAULT_MAX_CONCURRENT_INVOCATIONS: usize = 64;

/// Configuration of a [`Registry`](crate::registry::Registry).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryConfig {
    /// How long a proxy call waits for its reply before failing with
    /// [`RemoteError::Timeout`](crate::error::RemoteError::Timeout).
    pub call_timeout: Duration,
    /// Worker threads of the runtime consuming bus subscriptions.
    pub worker_threads: usize,
    /// Skeleton invocations allowed to run at once. Requests beyond the bound wait for a
    /// permit. A skeleton gives up its permit while it waits on an outbound call, so nested
    /// callbacks into the same registry are serviced even with a single permit.
    pub max_concurrent_invocations: usize,
    /// Publish calls to unit-returning methods without waiting for a reply.
    ///
    /// Errors raised by such methods are lost.
    pub one_way_unit_calls: bool,
    /// The name of runtime threads.
    pub thread_name: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            worker_threads: DEFAULT_WORKER_THREADS,
            max_concurrent_invocations: DEFAULT_MAX_CONCURRENT_INVOCATIONS,
            one_way_unit_calls: false,
            thread_name: "courier-worker".to_string(),
        }
    }
}
