//! Wire representation of invocation requests and replies.
//!
//! Every message on the bus is an [`Envelope`]: either a request addressed to an exported
//! object, or a reply addressed to the reply destination of the registry that sent the
//! request. Argument and return values travel as [`Marshaled`] trees, where callback-capable
//! objects are replaced by [`ObjectRef`]s.

use std::{borrow::Cow, fmt};

use serde::{Deserialize, Serialize};

use crate::{
    bus::Destination,
    codec,
    error::{CodecError, RemoteError},
    id::{CorrelationId, ObjectId},
};

/// A serializable reference to an exported object.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Where requests for the object are published.
    pub destination: Destination,
    /// The exported object, if known. References built from a bare well-known destination
    /// address whichever object is bound there.
    pub object_id: Option<ObjectId>,
    /// The capability interface descriptor.
    pub interface: Cow<'static, str>,
}

/// The identity of a method: its name and ordered parameter types.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodSignature {
    name: Cow<'static, str>,
    params: Cow<'static, [Cow<'static, str>]>,
}

impl MethodSignature {
    /// Creates a signature from static parts, usable in `const` items.
    pub const fn from_static(name: &'static str, params: &'static [Cow<'static, str>]) -> Self {
        MethodSignature {
            name: Cow::Borrowed(name),
            params: Cow::Borrowed(params),
        }
    }

    /// Creates a signature from owned parts.
    pub fn new(name: impl Into<String>, params: impl IntoIterator<Item = String>) -> Self {
        MethodSignature {
            name: Cow::Owned(name.into()),
            params: params.into_iter().map(Cow::Owned).collect(),
        }
    }

    /// The method name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The parameter types, as written in the interface.
    pub fn params(&self) -> &[Cow<'static, str>] {
        &self.params
    }

    /// Returns `true` if this signature has the given name and parameter types.
    pub fn matches(&self, name: &str, params: &[&str]) -> bool {
        self.name == name
            && self.params.len() == params.len()
            && self.params.iter().zip(params).all(|(a, b)| a == b)
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(param)?;
        }
        f.write_str(")")
    }
}

/// A marshaled argument or return value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Marshaled {
    /// An ordinary value encoded by the payload codec.
    Value(#[serde(with = "serde_bytes")] Vec<u8>),
    /// A reference to an exported object.
    Remote(ObjectRef),
    /// An optional value containing references.
    Optional(Option<Box<Marshaled>>),
    /// A sequence of values containing references.
    Sequence(Vec<Marshaled>),
}

impl Marshaled {
    /// A short name for the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Marshaled::Value(_) => "value",
            Marshaled::Remote(_) => "remote reference",
            Marshaled::Optional(_) => "optional",
            Marshaled::Sequence(_) => "sequence",
        }
    }
}

/// A request to invoke a method on an exported object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationRequest {
    /// The target object, checked against the object bound at the destination.
    pub target: Option<ObjectId>,
    /// The method to invoke.
    pub method: MethodSignature,
    /// The ordered arguments.
    pub args: Vec<Marshaled>,
    /// Where to send the reply. `None` marks a one-way call.
    pub reply_to: Option<Destination>,
    /// The token echoed back in the reply.
    pub correlation: CorrelationId,
}

/// The outcome of an invocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// The method returned a value.
    Returned(Marshaled),
    /// The method returned an error declared by the interface, encoded by the payload codec.
    Raised(#[serde(with = "serde_bytes")] Vec<u8>),
    /// The invocation itself failed.
    Failed(RemoteError),
}

/// The reply to an [`InvocationRequest`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationReply {
    /// The token of the request being answered.
    pub correlation: CorrelationId,
    /// The outcome of the invocation.
    pub outcome: Outcome,
}

/// A message on the bus.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Envelope {
    /// An invocation request.
    Request(InvocationRequest),
    /// An invocation reply.
    Reply(InvocationReply),
}

impl Envelope {
    /// Encodes the envelope into a bus message.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        codec::encode(self)
    }

    /// Decodes a bus message.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        codec::decode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORLD_PARAMS: &[Cow<'static, str>] = &[Cow::Borrowed("Arc<dyn Callback>")];
    const WORLD: MethodSignature = MethodSignature::from_static("world", WORLD_PARAMS);

    #[test]
    fn signatures_match_by_name_and_params() {
        assert!(WORLD.matches("world", &["Arc<dyn Callback>"]));
        assert!(!WORLD.matches("world", &[]));
        assert!(!WORLD.matches("hello", &["Arc<dyn Callback>"]));
        assert_eq!(
            WORLD,
            MethodSignature::new("world", ["Arc<dyn Callback>".to_string()])
        );
        assert_eq!(WORLD.to_string(), "world(Arc<dyn Callback>)");
    }

    #[test]
    fn request_survives_the_wire() {
        let envelope = Envelope::Request(InvocationRequest {
            target: Some(ObjectId::generate()),
            method: WORLD,
            args: vec![Marshaled::Optional(Some(Box::new(Marshaled::Remote(
                ObjectRef {
                    destination: Destination::anonymous(1),
                    object_id: None,
                    interface: Cow::Borrowed("tests::Callback"),
                },
            ))))],
            reply_to: Some(Destination::anonymous(0)),
            correlation: CorrelationId::new(9),
        });

        let bytes = envelope.encode().unwrap();
        assert_eq!(Envelope::decode(&bytes).unwrap(), envelope);
    }

    #[test]
    fn payloads_are_written_as_binary() {
        let payload = vec![0xff_u8; 64];
        let bytes = codec::encode(&Marshaled::Value(payload.clone())).unwrap();
        // A byte array of 0xff would take two bytes per element.
        assert!(bytes.len() < 2 * payload.len());
        assert!(bytes.windows(2).any(|window| window == [0xc4, 64]));

        let raised = codec::encode(&Outcome::Raised(payload.clone())).unwrap();
        assert!(raised.len() < 2 * payload.len());
    }

    #[test]
    fn garbage_is_not_an_envelope() {
        assert!(Envelope::decode(b"\xc1not msgpack").is_err());
    }
}
