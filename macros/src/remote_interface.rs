use proc_macro2::{Span, TokenStream};
use quote::{format_ident, quote, ToTokens};
use syn::{
    parse::{Parse, ParseStream},
    parse_quote,
    spanned::Spanned,
    FnArg, GenericArgument, Ident, ItemTrait, LitStr, PathArguments, ReturnType, TraitItem,
    TraitItemFn, Type, TypeParamBound,
};

pub struct RemoteInterface {
    item: ItemTrait,
    methods: Vec<Method>,
}

struct Method {
    ident: Ident,
    params: Vec<Param>,
    output: Type,
    ok_ty: Type,
    ok: Shape,
    returns_unit: bool,
}

struct Param {
    ty: Type,
    shape: Shape,
}

/// How a value crosses the wire.
enum Shape {
    /// Serialized with serde.
    Value(Type),
    /// `Arc<dyn I>`, sent as a remote reference to `I`.
    Remote(Type),
    /// `Option<_>` around a shape containing remote references.
    Optional(Box<Shape>),
    /// `Vec<_>` around a shape containing remote references.
    Sequence(Box<Shape>),
}

impl Shape {
    fn of(ty: &Type) -> Shape {
        match ty {
            Type::Group(group) => return Shape::of(&group.elem),
            Type::Paren(paren) => return Shape::of(&paren.elem),
            _ => {}
        }
        let Some((wrapper, inner)) = single_generic(ty) else {
            return Shape::Value(ty.clone());
        };
        if wrapper == "Arc" {
            if let Some(object) = trait_object(inner) {
                return Shape::Remote(object);
            }
            return Shape::Value(ty.clone());
        }
        let inner_shape = Shape::of(inner);
        if !inner_shape.is_remote() {
            return Shape::Value(ty.clone());
        }
        match wrapper.as_str() {
            "Option" => Shape::Optional(Box::new(inner_shape)),
            "Vec" => Shape::Sequence(Box::new(inner_shape)),
            _ => Shape::Value(ty.clone()),
        }
    }

    fn is_remote(&self) -> bool {
        !matches!(self, Shape::Value(_))
    }

    /// An expression marshaling `value`, a reference, using `?` on `RemoteError`.
    fn encode(&self, value: TokenStream, depth: usize) -> TokenStream {
        match self {
            Shape::Value(_) => quote! { __m.value(#value)? },
            Shape::Remote(object) => quote! { __m.export::<#object>(#value)? },
            Shape::Optional(inner) => {
                let item = format_ident!("__item{}", depth);
                let encoded = inner.encode(quote! { #item }, depth + 1);
                quote! {
                    ::courier::wire::Marshaled::Optional(match #value {
                        ::std::option::Option::Some(#item) => {
                            ::std::option::Option::Some(::std::boxed::Box::new(#encoded))
                        }
                        ::std::option::Option::None => ::std::option::Option::None,
                    })
                }
            }
            Shape::Sequence(inner) => {
                let item = format_ident!("__item{}", depth);
                let items = format_ident!("__items{}", depth);
                let encoded = inner.encode(quote! { #item }, depth + 1);
                quote! {
                    ::courier::wire::Marshaled::Sequence({
                        let mut #items = ::std::vec::Vec::new();
                        for #item in (#value).iter() {
                            #items.push(#encoded);
                        }
                        #items
                    })
                }
            }
        }
    }

    /// An expression decoding `value`, an owned `Marshaled`, using `?` on `RemoteError`.
    fn decode(&self, value: TokenStream, depth: usize) -> TokenStream {
        match self {
            Shape::Value(ty) => quote! { __m.decode_value::<#ty>(#value)? },
            Shape::Remote(object) => quote! { __m.rehydrate::<#object>(#value)? },
            Shape::Optional(inner) => {
                let item = format_ident!("__item{}", depth);
                let decoded = inner.decode(quote! { #item }, depth + 1);
                quote! {
                    match __m.optional(#value)? {
                        ::std::option::Option::Some(#item) => ::std::option::Option::Some(#decoded),
                        ::std::option::Option::None => ::std::option::Option::None,
                    }
                }
            }
            Shape::Sequence(inner) => {
                let item = format_ident!("__item{}", depth);
                let items = format_ident!("__items{}", depth);
                let decoded = inner.decode(quote! { #item }, depth + 1);
                quote! {
                    {
                        let mut #items = ::std::vec::Vec::new();
                        for #item in __m.sequence(#value)? {
                            #items.push(#decoded);
                        }
                        #items
                    }
                }
            }
        }
    }
}

impl Method {
    fn parse(method: &TraitItemFn) -> syn::Result<Self> {
        let sig = &method.sig;
        if let Some(asyncness) = &sig.asyncness {
            return Err(syn::Error::new(
                asyncness.span(),
                "remote methods are blocking and cannot be async",
            ));
        }
        if let Some(unsafety) = &sig.unsafety {
            return Err(syn::Error::new(
                unsafety.span(),
                "remote methods cannot be unsafe",
            ));
        }
        if !sig.generics.params.is_empty() || sig.generics.where_clause.is_some() {
            return Err(syn::Error::new(
                sig.generics.span(),
                "remote methods cannot be generic",
            ));
        }

        let mut inputs = sig.inputs.iter();
        match inputs.next() {
            Some(FnArg::Receiver(receiver))
                if receiver.reference.is_some() && receiver.mutability.is_none() => {}
            _ => {
                return Err(syn::Error::new(
                    sig.span(),
                    "remote methods must take `&self`",
                ))
            }
        }

        let mut params = Vec::new();
        for input in inputs {
            let FnArg::Typed(arg) = input else {
                return Err(syn::Error::new(input.span(), "unexpected receiver"));
            };
            if let Type::Reference(reference) = &*arg.ty {
                return Err(syn::Error::new(
                    reference.span(),
                    "remote method parameters must be owned",
                ));
            }
            params.push(Param {
                ty: (*arg.ty).clone(),
                shape: Shape::of(&arg.ty),
            });
        }

        let ReturnType::Type(_, output) = &sig.output else {
            return Err(syn::Error::new(
                sig.span(),
                "remote methods must return `Result<T, E>`",
            ));
        };
        let Some(ok_ty) = result_ok(output) else {
            return Err(syn::Error::new(
                output.span(),
                "remote methods must return `Result<T, E>`",
            ));
        };
        let returns_unit = matches!(&ok_ty, Type::Tuple(tuple) if tuple.elems.is_empty());

        Ok(Method {
            ident: sig.ident.clone(),
            params,
            output: (**output).clone(),
            ok: Shape::of(&ok_ty),
            ok_ty,
            returns_unit,
        })
    }

    fn name(&self) -> LitStr {
        LitStr::new(&self.ident.to_string(), self.ident.span())
    }

    fn param_types(&self) -> Vec<LitStr> {
        self.params
            .iter()
            .map(|param| LitStr::new(&type_name(&param.ty), Span::call_site()))
            .collect()
    }

    fn proxy_method(&self) -> TokenStream {
        let Method {
            ident,
            params,
            output,
            ok_ty,
            ok,
            returns_unit,
        } = self;
        let name = self.name();
        let param_types = self.param_types();
        let args: Vec<_> = (0..params.len()).map(|i| format_ident!("__arg{}", i)).collect();
        let tys = params.iter().map(|param| &param.ty);
        let encoded = params
            .iter()
            .zip(&args)
            .map(|(param, arg)| param.shape.encode(quote! { &#arg }, 0));
        let decode_return = if *returns_unit {
            quote! {
                |_: ::std::option::Option<::courier::wire::Marshaled>| {
                    ::std::result::Result::<(), ::courier::RemoteError>::Ok(())
                }
            }
        } else {
            let decoded = ok.decode(quote! { ::courier::proxy::returned(__value)? }, 0);
            quote! {
                |__value: ::std::option::Option<::courier::wire::Marshaled>|
                 -> ::std::result::Result<#ok_ty, ::courier::RemoteError> {
                    let __m = __remote.marshaler();
                    ::std::result::Result::Ok(#decoded)
                }
            }
        };

        quote! {
            fn #ident(&self, #( #args: #tys ),*) -> #output {
                const __PARAMS: &[::std::borrow::Cow<'static, str>] = &[
                    #( ::std::borrow::Cow::Borrowed(#param_types) ),*
                ];
                const __METHOD: ::courier::wire::MethodSignature =
                    ::courier::wire::MethodSignature::from_static(#name, __PARAMS);

                let __remote = &self.remote;
                let __response = (|| -> ::std::result::Result<
                    ::courier::proxy::Response,
                    ::courier::RemoteError,
                > {
                    let __m = __remote.marshaler();
                    let __args = ::std::vec![#( #encoded ),*];
                    __remote.invoke(&__METHOD, __args, #returns_unit)
                })();
                ::courier::proxy::complete(__response, #decode_return)
            }
        }
    }

    fn skeleton_arm(&self, trait_ident: &Ident) -> TokenStream {
        let Method {
            ident, params, ok, ..
        } = self;
        let name = self.name();
        let param_types = self.param_types();
        let arity = params.len();
        let args: Vec<_> = (0..params.len()).map(|i| format_ident!("__arg{}", i)).collect();
        let decoded = params
            .iter()
            .map(|param| param.shape.decode(quote! { __args.next()? }, 0));
        let encoded = ok.encode(quote! { &__ret }, 0);

        quote! {
            if __method.matches(#name, &[#( #param_types ),*]) {
                let mut __args = ::courier::skeleton::Arguments::new(__method, __args, #arity)?;
                #( let #args = #decoded; )*
                return match #trait_ident::#ident(&*self.target, #( #args ),*) {
                    ::std::result::Result::Ok(__ret) => ::std::result::Result::Ok(#encoded),
                    ::std::result::Result::Err(__err) => {
                        ::std::result::Result::Err(::courier::skeleton::raise(&__err))
                    }
                };
            }
        }
    }
}

impl ToTokens for RemoteInterface {
    fn to_tokens(&self, tokens: &mut TokenStream) {
        let Self { item, methods } = self;
        let vis = &item.vis;
        let ident = &item.ident;
        let proxy = format_ident!("{}Proxy", ident);
        let proxy_doc = format!("Forwards [`{ident}`] calls to a remote object.");
        let proxy_methods = methods.iter().map(Method::proxy_method);
        let skeleton_arms = methods.iter().map(|method| method.skeleton_arm(ident));

        tokens.extend(quote! {
            #item

            #[doc = #proxy_doc]
            #[derive(Clone, Debug)]
            #vis struct #proxy {
                remote: ::courier::proxy::RemoteRef,
            }

            impl #proxy {
                /// Wraps a remote reference.
                pub fn new(remote: ::courier::proxy::RemoteRef) -> Self {
                    #proxy { remote }
                }
            }

            #[automatically_derived]
            impl ::courier::Remote for #proxy {
                fn remote_ref(&self) -> ::std::option::Option<&::courier::proxy::RemoteRef> {
                    ::std::option::Option::Some(&self.remote)
                }
            }

            #[automatically_derived]
            impl #ident for #proxy {
                #( #proxy_methods )*
            }

            const _: () = {
                struct __Skeleton {
                    target: ::std::sync::Arc<dyn #ident>,
                }

                impl ::courier::skeleton::Skeleton for __Skeleton {
                    fn interface(&self) -> &'static str {
                        <dyn #ident as ::courier::RemoteInterface>::NAME
                    }

                    #[allow(unused_mut, unused_variables)]
                    fn invoke(
                        &self,
                        __m: &::courier::marshal::Marshaler<'_>,
                        __method: &::courier::wire::MethodSignature,
                        __args: ::std::vec::Vec<::courier::wire::Marshaled>,
                    ) -> ::std::result::Result<::courier::wire::Marshaled, ::courier::skeleton::Failure> {
                        #( #skeleton_arms )*
                        ::std::result::Result::Err(::courier::skeleton::Failure::Error(
                            ::courier::RemoteError::NoSuchMethod(::std::string::ToString::to_string(__method)),
                        ))
                    }
                }

                #[automatically_derived]
                impl ::courier::RemoteInterface for dyn #ident {
                    const NAME: &'static str = ::std::concat!(::std::module_path!(), "::", ::std::stringify!(#ident));

                    fn into_proxy(remote: ::courier::proxy::RemoteRef) -> ::std::sync::Arc<Self> {
                        ::std::sync::Arc::new(#proxy::new(remote))
                    }

                    fn skeleton(target: ::std::sync::Arc<Self>) -> ::std::sync::Arc<dyn ::courier::skeleton::Skeleton> {
                        ::std::sync::Arc::new(__Skeleton { target })
                    }

                    fn remote_ref(this: &Self) -> ::std::option::Option<&::courier::proxy::RemoteRef> {
                        ::courier::Remote::remote_ref(this)
                    }
                }
            };
        });
    }
}

impl Parse for RemoteInterface {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut item: ItemTrait = input.parse()?;
        if !item.generics.params.is_empty() || item.generics.where_clause.is_some() {
            return Err(syn::Error::new(
                item.generics.span(),
                "capability interfaces cannot be generic",
            ));
        }

        let mut methods = Vec::new();
        for trait_item in &item.items {
            match trait_item {
                TraitItem::Fn(method) => methods.push(Method::parse(method)?),
                other => {
                    return Err(syn::Error::new(
                        other.span(),
                        "capability interfaces may only contain methods",
                    ))
                }
            }
        }

        if item.colon_token.is_none() {
            item.colon_token = Some(Default::default());
        }
        item.supertraits.push(parse_quote!(::courier::Remote));

        Ok(RemoteInterface { item, methods })
    }
}

/// Splits `Wrapper<Inner>` into the wrapper's name and its single type argument.
fn single_generic(ty: &Type) -> Option<(String, &Type)> {
    let Type::Path(path) = ty else {
        return None;
    };
    if path.qself.is_some() {
        return None;
    }
    let segment = path.path.segments.last()?;
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    if args.args.len() != 1 {
        return None;
    }
    match args.args.first()? {
        GenericArgument::Type(inner) => Some((segment.ident.to_string(), inner)),
        _ => None,
    }
}

/// Returns `dyn I` if `ty` is a trait object of a single trait.
fn trait_object(ty: &Type) -> Option<Type> {
    match ty {
        Type::Group(group) => trait_object(&group.elem),
        Type::Paren(paren) => trait_object(&paren.elem),
        Type::TraitObject(object) => {
            let mut traits = object.bounds.iter().filter_map(|bound| match bound {
                TypeParamBound::Trait(bound) => Some(bound),
                _ => None,
            });
            let bound = traits.next()?;
            if traits.next().is_some() {
                return None;
            }
            let path = &bound.path;
            Some(parse_quote!(dyn #path))
        }
        _ => None,
    }
}

/// The `T` of a `Result<T, E>`.
fn result_ok(ty: &Type) -> Option<Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    if segment.ident != "Result" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    if args.args.len() != 2 {
        return None;
    }
    match args.args.first()? {
        GenericArgument::Type(ok) => Some(ok.clone()),
        _ => None,
    }
}

/// Renders a type as written, without the spacing `quote` inserts between tokens.
fn type_name(ty: &Type) -> String {
    let raw = ty.to_token_stream().to_string();
    let chars: Vec<char> = raw.chars().collect();
    let mut name = String::with_capacity(raw.len());
    for (i, &c) in chars.iter().enumerate() {
        if c == ' ' {
            let word = |c: Option<&char>| c.is_some_and(|c| c.is_alphanumeric() || *c == '_');
            if word(chars.get(i.wrapping_sub(1))) && word(chars.get(i + 1)) {
                name.push(' ');
            }
            continue;
        }
        name.push(c);
        if c == ',' {
            name.push(' ');
        }
    }
    name
}
