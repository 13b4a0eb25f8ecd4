use std::collections::HashMap;

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{braced, Attribute, Expr, ExprLit, Ident, Lit, LitInt, LitStr, Result, Token, Visibility};

use proc_macro_crate::{crate_name, FoundCrate};

/// One catalog entry: `#[token = "sport"] Sport = 0x01`
struct Variant {
    /// Pass-through attributes (doc comments, cfgs, ...)
    attrs: Vec<Attribute>,
    token: LitStr,
    name: Ident,
    code: LitInt,
}

struct CatalogInput {
    attrs: Vec<Attribute>,
    vis: Visibility,
    name: Ident,
    variants: Vec<Variant>,
}

impl Parse for CatalogInput {
    fn parse(input: ParseStream) -> Result<Self> {
        let attrs = input.call(Attribute::parse_outer)?;
        let vis: Visibility = input.parse()?;
        input.parse::<Token![enum]>()?;
        let name: Ident = input.parse()?;
        let content;
        braced!(content in input);
        let variants = Punctuated::<Variant, Token![,]>::parse_terminated(&content)?
            .into_iter()
            .collect();
        Ok(Self {
            attrs,
            vis,
            name,
            variants,
        })
    }
}

impl Parse for Variant {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut attrs = Vec::new();
        let mut token: Option<LitStr> = None;

        for attr in input.call(Attribute::parse_outer)? {
            if !attr.path().is_ident("token") {
                attrs.push(attr);
                continue;
            }
            if token.is_some() {
                return Err(syn::Error::new_spanned(attr, "duplicate #[token] attribute"));
            }
            let value = &attr.meta.require_name_value()?.value;
            match value {
                Expr::Lit(ExprLit {
                    lit: Lit::Str(lit), ..
                }) => token = Some(lit.clone()),
                other => {
                    return Err(syn::Error::new_spanned(
                        other,
                        "expected a string literal: #[token = \"...\"]",
                    ));
                }
            }
        }

        let name: Ident = input.parse()?;
        let token = token.ok_or_else(|| {
            syn::Error::new(
                name.span(),
                format!("variant `{}` is missing #[token = \"...\"]", name),
            )
        })?;

        if !input.peek(Token![=]) {
            return Err(syn::Error::new(
                name.span(),
                format!("variant `{}` needs an explicit code, e.g. `{} = 0x01`", name, name),
            ));
        }
        input.parse::<Token![=]>()?;
        let code: LitInt = input.parse()?;

        Ok(Self {
            attrs,
            token,
            name,
            code,
        })
    }
}

// =============================================================================
// Validation (runs at macro expansion time)
// =============================================================================

/// Canonical tokens are lowercase ASCII letters, digits and `-`.
fn is_canonical_token(token: &str) -> bool {
    !token.is_empty()
        && token
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

/// Check tokens and codes; returns the parsed codes in declaration order.
fn validate(input: &CatalogInput) -> Result<Vec<u8>> {
    if input.variants.is_empty() {
        return Err(syn::Error::new(
            input.name.span(),
            "a mapping catalog needs at least one variant",
        ));
    }

    let mut tokens: HashMap<String, &Ident> = HashMap::new();
    let mut codes: HashMap<u8, &Ident> = HashMap::new();
    let mut parsed = Vec::with_capacity(input.variants.len());

    for variant in &input.variants {
        let token = variant.token.value();
        if !is_canonical_token(&token) {
            return Err(syn::Error::new(
                variant.token.span(),
                format!(
                    "token '{}' is not canonical: use lowercase ASCII letters, digits and '-'",
                    token
                ),
            ));
        }
        if let Some(existing) = tokens.insert(token.clone(), &variant.name) {
            return Err(syn::Error::new(
                variant.token.span(),
                format!("token '{}' is already used by `{}`", token, existing),
            ));
        }

        let code: u8 = variant.code.base10_parse()?;
        if let Some(existing) = codes.insert(code, &variant.name) {
            return Err(syn::Error::new(
                variant.code.span(),
                format!("code {:#04x} is already used by `{}`", code, existing),
            ));
        }
        parsed.push(code);
    }

    Ok(parsed)
}

// =============================================================================
// Crate path resolution
// =============================================================================

fn mapping_crate_path() -> TokenStream2 {
    match crate_name("bet-mapping") {
        Ok(FoundCrate::Itself) => {
            quote!(::bet_mapping)
        }
        Ok(FoundCrate::Name(name)) => {
            let ident = Ident::new(&name, Span::call_site());
            quote!(::#ident)
        }
        Err(_) => quote!(::bet_mapping),
    }
}

// =============================================================================
// Code generation
// =============================================================================

/// Generate the enum and its `Catalog`, `Display` and serde impls.
///
/// ```ignore
/// mapping_catalog! {
///     pub enum MappingType {
///         #[token = "sport"]
///         Sport = 0x01,
///         #[token = "team"]
///         Team = 0x03,
///     }
/// }
///
/// // Generates:
/// #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// #[repr(u8)]
/// pub enum MappingType { Sport = 0x01, Team = 0x03 }
///
/// impl Catalog for MappingType {
///     const ALL: &'static [Self] = &[Self::Sport, Self::Team];
///     fn token(self) -> &'static str { ... }
///     fn from_token(token: &str) -> Option<Self> { ... }   // ASCII case-insensitive
///     fn code(self) -> u8 { self as u8 }
///     fn from_code(code: u8) -> Option<Self> { ... }
/// }
/// // + Display (token), Serialize (token), Deserialize (via resolve_type)
/// ```
fn generate_catalog(input: &CatalogInput, codes: &[u8], krate: &TokenStream2) -> TokenStream2 {
    let CatalogInput {
        attrs,
        vis,
        name,
        variants,
    } = input;

    let decls = variants.iter().map(|v| {
        let Variant {
            attrs, name, code, ..
        } = v;
        quote! {
            #(#attrs)*
            #name = #code
        }
    });

    let names: Vec<&Ident> = variants.iter().map(|v| &v.name).collect();
    let tokens: Vec<&LitStr> = variants.iter().map(|v| &v.token).collect();
    let serde = quote!(#krate::__private::serde);

    quote! {
        #(#attrs)*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(u8)]
        #vis enum #name {
            #(#decls,)*
        }

        impl #krate::Catalog for #name {
            const ALL: &'static [Self] = &[#(Self::#names),*];

            fn token(self) -> &'static str {
                match self {
                    #(Self::#names => #tokens,)*
                }
            }

            fn from_token(token: &str) -> ::core::option::Option<Self> {
                #(
                    if token.eq_ignore_ascii_case(#tokens) {
                        return ::core::option::Option::Some(Self::#names);
                    }
                )*
                ::core::option::Option::None
            }

            #[inline]
            fn code(self) -> u8 {
                self as u8
            }

            fn from_code(code: u8) -> ::core::option::Option<Self> {
                match code {
                    #(#codes => ::core::option::Option::Some(Self::#names),)*
                    _ => ::core::option::Option::None,
                }
            }
        }

        impl ::core::fmt::Display for #name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(#krate::Catalog::token(*self))
            }
        }

        impl #serde::Serialize for #name {
            fn serialize<S>(&self, serializer: S) -> ::core::result::Result<S::Ok, S::Error>
            where
                S: #serde::Serializer,
            {
                serializer.serialize_str(#krate::Catalog::token(*self))
            }
        }

        impl<'de> #serde::Deserialize<'de> for #name {
            fn deserialize<D>(deserializer: D) -> ::core::result::Result<Self, D::Error>
            where
                D: #serde::Deserializer<'de>,
            {
                let token = <::std::string::String as #serde::Deserialize>::deserialize(deserializer)?;
                #krate::resolve_type::<Self>(&token)
                    .map_err(<D::Error as #serde::de::Error>::custom)
            }
        }
    }
}

/// Declare a closed set of mapping types.
///
/// Every variant needs a canonical `#[token = "..."]` (lowercase ASCII
/// letters, digits, `-`) and an explicit one-byte code. Duplicate tokens or
/// codes are compile errors.
///
/// ```ignore
/// bet_mapping::mapping_catalog! {
///     /// Esports namespaces.
///     pub enum EsportsType {
///         #[token = "game"]
///         Game = 1,
///         #[token = "org"]
///         Org = 2,
///     }
/// }
/// ```
#[proc_macro]
pub fn mapping_catalog(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as CatalogInput);
    let codes = match validate(&input) {
        Ok(codes) => codes,
        Err(err) => return err.to_compile_error().into(),
    };
    let krate = mapping_crate_path();
    generate_catalog(&input, &codes, &krate).into()
}
