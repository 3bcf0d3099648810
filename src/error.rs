//! Defines error handling constructs for courier.
//!
//! Errors fall into two groups. Call-site errors ([`RemoteError`]) are surfaced synchronously
//! to the thread blocked in a proxy call, and travel over the wire when a skeleton fails to
//! invoke its target. Setup errors ([`ExportError`], [`StartError`], [`BusError`]) are returned
//! from exporting objects, building registries and talking to the message bus.

use std::{io, time::Duration};

use serde::{Deserialize, Serialize};

use crate::bus::Destination;

/// Error that can occur when invoking a method through a proxy.
///
/// Capability interfaces declare their own error type, which must implement
/// `From<RemoteError>` so that transport failures can be surfaced through it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum RemoteError {
    /// The message bus connection was lost or the registry was shut down.
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),
    /// No reply arrived within the configured window.
    #[error("no reply to `{method}` within {timeout:?}")]
    Timeout {
        /// The signature of the method that timed out.
        method: String,
        /// The window that elapsed.
        timeout: Duration,
    },
    /// No object is exported at the destination, or the reference is stale.
    #[error("no object exported at {0}")]
    NoSuchObject(Destination),
    /// The target object does not have a method matching the signature.
    #[error("no method matching `{0}`")]
    NoSuchMethod(String),
    /// A request, reply or argument could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),
    /// A remote reference named a different interface than the one declared.
    #[error("expected a reference to `{expected}`, found `{found}`")]
    InterfaceMismatch {
        /// The declared interface.
        expected: String,
        /// The interface named by the reference.
        found: String,
    },
    /// A callback argument could not be exported.
    #[error("failed to export argument: {0}")]
    ExportFailed(String),
    /// The target method panicked.
    #[error("remote invocation panicked: {0}")]
    InvocationPanicked(String),
    /// The value is a local object, not a proxy.
    #[error("value is not a proxy")]
    NotAProxy,
}

/// Error that can occur when exporting an object.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// Another object is already bound to the destination.
    #[error("destination {0} is already bound to another object")]
    DestinationInUse(Destination),
    /// The object is already exported at a different destination.
    #[error("object is already exported at {0}")]
    AlreadyExported(Destination),
    /// The registry has been reset or shut down.
    #[error("registry has been shut down")]
    Closed,
    /// The message bus refused the operation.
    #[error(transparent)]
    Bus(#[from] BusError),
    /// The process-wide registry could not be started.
    #[error(transparent)]
    Start(#[from] StartError),
}

/// Error that can occur when building a registry.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    /// The dispatch runtime could not be created.
    #[error("failed to start dispatch runtime: {0}")]
    Runtime(#[from] io::Error),
    /// The reply destination could not be allocated or subscribed.
    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Error returned by a [`MessageBus`](crate::bus::MessageBus).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum BusError {
    /// The bus connection is closed.
    #[error("message bus connection closed")]
    Closed,
    /// The destination does not exist on the bus.
    #[error("unknown destination {0}")]
    UnknownDestination(Destination),
    /// The destination already has a consumer.
    #[error("destination {0} already has a consumer")]
    AlreadySubscribed(Destination),
}

impl From<BusError> for RemoteError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::UnknownDestination(destination) => RemoteError::NoSuchObject(destination),
            err => RemoteError::TransportUnavailable(err.to_string()),
        }
    }
}

/// An error that occurs during payload encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The value could not be serialized.
    #[error("failed to encode: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    /// The bytes could not be deserialized.
    #[error("failed to decode: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

impl From<CodecError> for RemoteError {
    fn from(err: CodecError) -> Self {
        RemoteError::Codec(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bus_errors_map_to_call_site_errors() {
        let dest = Destination::anonymous(3);
        assert_eq!(
            RemoteError::from(BusError::UnknownDestination(dest.clone())),
            RemoteError::NoSuchObject(dest)
        );
        assert!(matches!(
            RemoteError::from(BusError::Closed),
            RemoteError::TransportUnavailable(_)
        ));
    }
}
