use quote::{quote, ToTokens};
use syn::{
    parse::{Parse, ParseStream},
    DeriveInput, Generics, Ident,
};

pub struct DeriveRemote {
    ident: Ident,
    generics: Generics,
}

impl ToTokens for DeriveRemote {
    fn to_tokens(&self, tokens: &mut proc_macro2::TokenStream) {
        let Self { ident, generics } = self;
        let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

        tokens.extend(quote! {
            #[automatically_derived]
            impl #impl_generics ::courier::Remote for #ident #ty_generics #where_clause {}
        });
    }
}

impl Parse for DeriveRemote {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let input: DeriveInput = input.parse()?;
        let ident = input.ident;
        let generics = input.generics;

        Ok(DeriveRemote { ident, generics })
    }
}
