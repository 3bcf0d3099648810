//! Client-side forwarding of calls.
//!
//! A generated proxy holds a [`RemoteRef`] and forwards each trait method through
//! [`RemoteRef::invoke`], blocking the calling thread until the reply arrives or the call
//! times out. [`complete`] turns the reply back into the method's declared result.

use std::{fmt, sync::Arc, time::Duration};

use serde::de::DeserializeOwned;

use crate::{
    bus::Destination,
    codec,
    error::RemoteError,
    marshal::Marshaler,
    registry::Registry,
    remote::RemoteInterface,
    wire::{Marshaled, MethodSignature, ObjectRef},
};

/// A reference to a remote object, bound to the registry that carries its calls.
#[derive(Clone)]
pub struct RemoteRef {
    object: ObjectRef,
    registry: Registry,
    timeout: Option<Duration>,
}

impl RemoteRef {
    /// Binds an object reference to a registry.
    pub fn new(object: ObjectRef, registry: Registry) -> Self {
        RemoteRef {
            object,
            registry,
            timeout: None,
        }
    }

    /// The referenced object.
    pub fn object(&self) -> &ObjectRef {
        &self.object
    }

    /// Where calls are published.
    pub fn destination(&self) -> &Destination {
        &self.object.destination
    }

    /// The registry carrying calls.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// How long calls wait for a reply.
    pub fn timeout(&self) -> Duration {
        self.timeout
            .unwrap_or_else(|| self.registry.config().call_timeout)
    }

    /// Returns a copy of this reference with a different call timeout.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        RemoteRef {
            timeout: Some(timeout),
            ..self.clone()
        }
    }

    /// A marshaler exporting callbacks through this reference's registry.
    pub fn marshaler(&self) -> Marshaler<'_> {
        Marshaler::new(&self.registry)
    }

    /// Sends a call and blocks until its reply arrives.
    pub fn invoke(
        &self,
        method: &MethodSignature,
        args: Vec<Marshaled>,
        returns_unit: bool,
    ) -> Result<Response, RemoteError> {
        self.registry
            .call(&self.object, method, args, returns_unit, self.timeout())
    }
}

impl fmt::Debug for RemoteRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteRef")
            .field("object", &self.object)
            .field("timeout", &self.timeout())
            .finish()
    }
}

/// The reply to a forwarded call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    /// The method returned a value.
    Returned(Marshaled),
    /// The method returned a declared error, still encoded.
    Raised(Vec<u8>),
    /// The call was published one-way; no reply is expected.
    Sent,
}

/// Turns the response to a forwarded call into the method's declared result.
///
/// `decode` receives the returned value, or `None` for a one-way call.
pub fn complete<T, E, F>(response: Result<Response, RemoteError>, decode: F) -> Result<T, E>
where
    E: DeserializeOwned + From<RemoteError>,
    F: FnOnce(Option<Marshaled>) -> Result<T, RemoteError>,
{
    match response {
        Ok(Response::Returned(value)) => decode(Some(value)).map_err(E::from),
        Ok(Response::Sent) => decode(None).map_err(E::from),
        Ok(Response::Raised(bytes)) => match codec::decode::<E>(&bytes) {
            Ok(err) => Err(err),
            Err(err) => Err(E::from(RemoteError::from(err))),
        },
        Err(err) => Err(E::from(err)),
    }
}

/// Extracts the returned value of a call that expects one.
pub fn returned(value: Option<Marshaled>) -> Result<Marshaled, RemoteError> {
    value.ok_or_else(|| RemoteError::Codec("missing return value".to_string()))
}

/// Returns a proxy to the same object whose calls wait at most `timeout` for a reply.
///
/// Fails with [`RemoteError::NotAProxy`] if `proxy` is a local object.
pub fn with_timeout<I>(proxy: &Arc<I>, timeout: Duration) -> Result<Arc<I>, RemoteError>
where
    I: ?Sized + RemoteInterface,
{
    let remote = <I as RemoteInterface>::remote_ref(proxy).ok_or(RemoteError::NotAProxy)?;
    Ok(I::into_proxy(remote.with_timeout(timeout)))
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    enum LookupError {
        Missing(String),
        Remote(RemoteError),
    }

    impl From<RemoteError> for LookupError {
        fn from(err: RemoteError) -> Self {
            LookupError::Remote(err)
        }
    }

    fn decode_u32(value: Option<Marshaled>) -> Result<u32, RemoteError> {
        match returned(value)? {
            Marshaled::Value(bytes) => Ok(codec::decode(&bytes)?),
            _ => Err(RemoteError::Codec("unexpected".to_string())),
        }
    }

    #[test]
    fn returned_values_are_decoded() {
        let value = Marshaled::Value(codec::encode(&7_u32).unwrap());
        let result: Result<u32, LookupError> = complete(Ok(Response::Returned(value)), decode_u32);
        assert_eq!(result, Ok(7));
    }

    #[test]
    fn raised_errors_are_decoded_as_declared() {
        let raised = codec::encode(&LookupError::Missing("key".to_string())).unwrap();
        let result: Result<u32, LookupError> = complete(Ok(Response::Raised(raised)), decode_u32);
        assert_eq!(result, Err(LookupError::Missing("key".to_string())));
    }

    #[test]
    fn transport_failures_surface_through_the_declared_error() {
        let result: Result<u32, LookupError> =
            complete(Err(RemoteError::NotAProxy), decode_u32);
        assert_eq!(result, Err(LookupError::Remote(RemoteError::NotAProxy)));

        let result: Result<u32, LookupError> = complete(Ok(Response::Sent), decode_u32);
        assert!(matches!(result, Err(LookupError::Remote(RemoteError::Codec(_)))));
    }
}
