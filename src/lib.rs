#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(rust_2018_idioms)]
#![warn(missing_debug_implementations)]
#![deny(unused_must_use)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate self as courier;

pub mod bus;
pub mod codec;
pub mod config;
pub mod error;
pub mod id;
pub mod marshal;
mod pending;
pub mod proxy;
pub mod registry;
pub mod remote;
pub mod skeleton;
pub mod system;
pub mod wire;

pub use bus::{Destination, MemoryBus, MessageBus};
#[cfg(feature = "macros")]
pub use courier_macros::{remote_interface, Remote};
pub use error::RemoteError;
pub use registry::Registry;
pub use remote::{Remote, RemoteInterface};
pub use system::{export, export_at, lookup, lookup_with_timeout, reset_system, unexport};
