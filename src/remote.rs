//! Capability interfaces.
//!
//! A capability interface is an ordinary trait annotated with
//! [`#[remote_interface]`](crate::remote_interface). The macro makes [`Remote`] a supertrait,
//! generates a proxy type implementing the trait by forwarding calls over the bus, generates
//! a skeleton dispatching requests to a local implementation, and implements
//! [`RemoteInterface`] for `dyn Trait` to tie the three together.

use std::sync::Arc;

use crate::{proxy::RemoteRef, skeleton::Skeleton};

/// Marker for values that can be reached remotely.
///
/// Local implementations use the provided method, usually through `#[derive(Remote)]`.
/// Generated proxies override it to expose the reference they forward to.
pub trait Remote: Send + Sync + 'static {
    /// The remote reference behind this value, or `None` for a local object.
    fn remote_ref(&self) -> Option<&RemoteRef> {
        None
    }
}

/// The descriptor of a capability interface, implemented for `dyn Trait`.
///
/// This is the explicit mapping from an interface to its proxy and skeleton implementations,
/// consulted whenever an object is exported or a reference is decoded.
pub trait RemoteInterface: Send + Sync + 'static {
    /// The interface descriptor carried in remote references.
    const NAME: &'static str;

    /// Wraps a remote reference in a proxy implementing the interface.
    fn into_proxy(remote: RemoteRef) -> Arc<Self>;

    /// Binds a local implementation to a skeleton.
    fn skeleton(target: Arc<Self>) -> Arc<dyn Skeleton>;

    /// The remote reference behind `this`, if it is a proxy.
    fn remote_ref(this: &Self) -> Option<&RemoteRef>;
}

/// The identity of an object, used to export each instance at most once.
pub(crate) fn identity<I>(object: &Arc<I>) -> usize
where
    I: ?Sized,
{
    Arc::as_ptr(object).cast::<()>() as usize
}
