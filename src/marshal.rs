//! Argument and return value marshaling.
//!
//! Ordinary values are encoded by the payload codec. Values of a capability interface type
//! are exported through the registry and replaced by an [`ObjectRef`]; on the receiving side
//! the reference is rehydrated into a proxy. A proxy passed back to its origin is sent as the
//! reference it already wraps, so the origin receives a proxy to its own export rather than a
//! fresh one.

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};

use crate::{
    codec,
    error::RemoteError,
    proxy::RemoteRef,
    registry::Registry,
    remote::RemoteInterface,
    wire::{Marshaled, ObjectRef},
};

/// Marshals values through a registry.
#[derive(Clone, Copy, Debug)]
pub struct Marshaler<'a> {
    registry: &'a Registry,
}

impl<'a> Marshaler<'a> {
    pub(crate) fn new(registry: &'a Registry) -> Self {
        Marshaler { registry }
    }

    /// The registry exports and proxies are bound to.
    pub fn registry(&self) -> &'a Registry {
        self.registry
    }

    /// Encodes an ordinary value.
    pub fn value<T>(&self, value: &T) -> Result<Marshaled, RemoteError>
    where
        T: Serialize + ?Sized,
    {
        Ok(Marshaled::Value(codec::encode(value)?))
    }

    /// Replaces a capability object with a reference to its export.
    ///
    /// Local objects are exported at a fresh anonymous destination, or at their existing
    /// destination if already exported.
    pub fn export<I>(&self, object: &Arc<I>) -> Result<Marshaled, RemoteError>
    where
        I: ?Sized + RemoteInterface,
    {
        if let Some(remote) = <I as RemoteInterface>::remote_ref(object) {
            return Ok(Marshaled::Remote(remote.object().clone()));
        }
        let object = self
            .registry
            .export_object(object, None)
            .map_err(|err| RemoteError::ExportFailed(err.to_string()))?;
        Ok(Marshaled::Remote(object))
    }

    /// Decodes an ordinary value.
    pub fn decode_value<T>(&self, marshaled: Marshaled) -> Result<T, RemoteError>
    where
        T: DeserializeOwned,
    {
        match marshaled {
            Marshaled::Value(bytes) => Ok(codec::decode(&bytes)?),
            other => Err(unexpected("value", &other)),
        }
    }

    /// Turns a reference into a proxy implementing the declared interface.
    pub fn rehydrate<I>(&self, marshaled: Marshaled) -> Result<Arc<I>, RemoteError>
    where
        I: ?Sized + RemoteInterface,
    {
        match marshaled {
            Marshaled::Remote(object) => self.proxy(object),
            other => Err(unexpected("remote reference", &other)),
        }
    }

    /// Unwraps an optional value. The contents are decoded by the caller.
    pub fn optional(&self, marshaled: Marshaled) -> Result<Option<Marshaled>, RemoteError> {
        match marshaled {
            Marshaled::Optional(inner) => Ok(inner.map(|inner| *inner)),
            other => Err(unexpected("optional", &other)),
        }
    }

    /// Unwraps a sequence. The elements are decoded by the caller.
    pub fn sequence(&self, marshaled: Marshaled) -> Result<Vec<Marshaled>, RemoteError> {
        match marshaled {
            Marshaled::Sequence(items) => Ok(items),
            other => Err(unexpected("sequence", &other)),
        }
    }

    pub(crate) fn proxy<I>(&self, object: ObjectRef) -> Result<Arc<I>, RemoteError>
    where
        I: ?Sized + RemoteInterface,
    {
        if object.interface != I::NAME {
            return Err(RemoteError::InterfaceMismatch {
                expected: I::NAME.to_string(),
                found: object.interface.into_owned(),
            });
        }
        Ok(I::into_proxy(RemoteRef::new(object, self.registry.clone())))
    }
}

fn unexpected(expected: &str, found: &Marshaled) -> RemoteError {
    RemoteError::Codec(format!("expected {expected}, found {}", found.kind()))
}
