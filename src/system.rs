//! The process-wide default registry.
//!
//! The free functions in this module operate on a registry created lazily over a process-wide
//! [`MemoryBus`]. [`reset_system`] tears that registry down; the next call builds a fresh one
//! over the same bus.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use once_cell::sync::Lazy;
use tracing::debug;

use crate::{
    bus::{Destination, MemoryBus},
    error::ExportError,
    registry::Registry,
    remote::RemoteInterface,
};

static SYSTEM_BUS: Lazy<Arc<MemoryBus>> = Lazy::new(|| Arc::new(MemoryBus::new()));

static SYSTEM: Lazy<Mutex<Option<Registry>>> = Lazy::new(|| Mutex::new(None));

/// Returns the process-wide registry, starting it if needed.
pub fn system() -> Result<Registry, ExportError> {
    let mut system = SYSTEM.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(registry) = system.as_ref().filter(|registry| !registry.is_closed()) {
        return Ok(registry.clone());
    }
    let registry = Registry::new(SYSTEM_BUS.clone())?;
    debug!(reply_to = %registry.reply_destination(), "started system registry");
    *system = Some(registry.clone());
    Ok(registry)
}

/// The bus shared by the process-wide registry.
pub fn system_bus() -> Arc<MemoryBus> {
    SYSTEM_BUS.clone()
}

/// Exports `object` on the process-wide registry at an anonymous destination.
///
/// See [`Registry::export`].
pub fn export<I>(object: &Arc<I>) -> Result<Arc<I>, ExportError>
where
    I: ?Sized + RemoteInterface,
{
    system()?.export(object)
}

/// Exports `object` on the process-wide registry at a well-known destination.
///
/// See [`Registry::export_at`].
pub fn export_at<I>(object: &Arc<I>, destination: Destination) -> Result<Arc<I>, ExportError>
where
    I: ?Sized + RemoteInterface,
{
    system()?.export_at(object, destination)
}

/// Returns a proxy to whichever object is bound at `destination`, through the process-wide
/// registry.
pub fn lookup<I>(destination: Destination) -> Result<Arc<I>, ExportError>
where
    I: ?Sized + RemoteInterface,
{
    Ok(system()?.lookup(destination))
}

/// Like [`lookup`], with a per-proxy call timeout.
pub fn lookup_with_timeout<I>(
    destination: Destination,
    timeout: Duration,
) -> Result<Arc<I>, ExportError>
where
    I: ?Sized + RemoteInterface,
{
    Ok(system()?.lookup_with_timeout(destination, timeout))
}

/// Removes the export of `object` from the process-wide registry.
pub fn unexport<I>(object: &Arc<I>) -> bool
where
    I: ?Sized + RemoteInterface,
{
    let system = SYSTEM.lock().unwrap_or_else(PoisonError::into_inner);
    system
        .as_ref()
        .is_some_and(|registry| registry.unexport(object))
}

/// Tears down the process-wide registry.
///
/// Every export is removed and every outstanding call fails with
/// [`RemoteError::TransportUnavailable`](crate::error::RemoteError::TransportUnavailable).
pub fn reset_system() {
    let registry = SYSTEM
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    if let Some(registry) = registry {
        registry.reset();
    }
}
