mod derive_remote;
mod remote_interface;

use derive_remote::DeriveRemote;
use proc_macro::TokenStream;
use quote::ToTokens;
use remote_interface::RemoteInterface;
use syn::parse_macro_input;

/// Attribute macro turning a trait into a capability interface.
///
/// Every method must take `&self` and owned parameters, and return
/// `Result<T, E>` where `E: Serialize + DeserializeOwned + From<RemoteError>`.
/// Parameters and return values of the form `Arc<dyn I>`, where `I` is itself a capability
/// interface, are passed as remote references; `Option` and `Vec` around them are walked.
/// Every other type is serialized with serde.
///
/// The macro adds `courier::Remote` as a supertrait and generates:
/// - a `<Trait>Proxy` struct implementing the trait by forwarding calls over the bus,
/// - a skeleton dispatching requests to a local implementation,
/// - the `courier::RemoteInterface` implementation for `dyn Trait`.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
///
/// use courier::{remote_interface, RemoteError};
///
/// #[remote_interface]
/// pub trait Callback {
///     fn notify(&self, message: String) -> Result<(), RemoteError>;
/// }
///
/// #[remote_interface]
/// pub trait Service {
///     fn hello(&self) -> Result<String, RemoteError>;
///     fn world(&self, callback: Arc<dyn Callback>) -> Result<(), RemoteError>;
/// }
/// ```
///
/// <details>
/// <summary>See expanded code</summary>
///
/// ```ignore
/// pub trait Callback: ::courier::Remote {
///     fn notify(&self, message: String) -> Result<(), RemoteError>;
/// }
///
/// #[derive(Clone, Debug)]
/// pub struct CallbackProxy {
///     remote: ::courier::proxy::RemoteRef,
/// }
///
/// impl Callback for CallbackProxy {
///     fn notify(&self, __arg0: String) -> Result<(), RemoteError> {
///         // marshal `__arg0`, publish the request and block on the reply
///     }
/// }
///
/// impl ::courier::RemoteInterface for dyn Callback {
///     const NAME: &'static str = concat!(module_path!(), "::", "Callback");
///     // ...
/// }
/// ```
/// </details>
#[proc_macro_attribute]
pub fn remote_interface(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let remote_interface = parse_macro_input!(item as RemoteInterface);
    TokenStream::from(remote_interface.into_token_stream())
}

/// Derive macro implementing the `Remote` marker trait for a local implementation of a
/// capability interface.
///
/// # Example
///
/// ```ignore
/// use courier::Remote;
///
/// #[derive(Remote)]
/// struct Printer;
/// ```
#[proc_macro_derive(Remote)]
pub fn derive_remote(input: TokenStream) -> TokenStream {
    let derive_remote = parse_macro_input!(input as DeriveRemote);
    TokenStream::from(derive_remote.into_token_stream())
}
