//! Server-side binding of an exported object.
//!
//! A [`Skeleton`] turns one decoded request into one outcome. Skeletons are generated by
//! [`#[remote_interface]`](crate::remote_interface); the helpers in this module are what the
//! generated code calls into.

use std::vec;

use serde::Serialize;

use crate::{
    codec,
    error::{CodecError, RemoteError},
    marshal::Marshaler,
    wire::{Marshaled, MethodSignature},
};

/// Dispatches requests to one exported object.
pub trait Skeleton: Send + Sync + 'static {
    /// The interface descriptor of the exported object.
    fn interface(&self) -> &'static str;

    /// Locates the method matching `method`, invokes it synchronously and marshals the result.
    fn invoke(
        &self,
        marshaler: &Marshaler<'_>,
        method: &MethodSignature,
        args: Vec<Marshaled>,
    ) -> Result<Marshaled, Failure>;
}

/// Why a skeleton could not produce a return value.
#[derive(Debug)]
pub enum Failure {
    /// The method returned an error declared by the interface, already encoded.
    Raised(Vec<u8>),
    /// The invocation failed before or after the method ran.
    Error(RemoteError),
}

impl From<RemoteError> for Failure {
    fn from(err: RemoteError) -> Self {
        Failure::Error(err)
    }
}

impl From<CodecError> for Failure {
    fn from(err: CodecError) -> Self {
        Failure::Error(err.into())
    }
}

/// Encodes an error declared by the interface.
pub fn raise<E>(err: &E) -> Failure
where
    E: Serialize,
{
    match codec::encode(err) {
        Ok(bytes) => Failure::Raised(bytes),
        Err(err) => Failure::Error(err.into()),
    }
}

/// The arguments of a request, consumed in declaration order.
#[derive(Debug)]
pub struct Arguments {
    args: vec::IntoIter<Marshaled>,
}

impl Arguments {
    /// Checks the argument count against the method's arity.
    pub fn new(
        method: &MethodSignature,
        args: Vec<Marshaled>,
        arity: usize,
    ) -> Result<Self, RemoteError> {
        if args.len() != arity {
            return Err(RemoteError::Codec(format!(
                "`{method}` takes {arity} arguments but {} were sent",
                args.len()
            )));
        }
        Ok(Arguments {
            args: args.into_iter(),
        })
    }

    /// Takes the next argument.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Marshaled, RemoteError> {
        self.args
            .next()
            .ok_or_else(|| RemoteError::Codec("missing argument".to_string()))
    }
}
