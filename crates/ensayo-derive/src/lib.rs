//! Ensayo Derive Macros: string-resolvable fixture enums
//!
//! Fixture parameters such as a locator strategy arrive as strings in test
//! scripts (`"id"`, `"XPATH"`). `#[derive(FixtureEnum)]` gives a fieldless
//! enum the canonical names the binder resolves them against, so a typo in
//! a script is reported with the full list of accepted values.
//!
//! # Example
//!
//! ```ignore
//! use ensayo::FixtureEnum;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq, FixtureEnum)]
//! enum LocatorStrategy {
//!     Id,
//!     #[fixture(name = "XPATH")]
//!     XPath,
//!     Label,
//!     CssSelector,
//! }
//!
//! assert_eq!(LocatorStrategy::variant_names(), &["ID", "XPATH", "LABEL", "CSS_SELECTOR"]);
//! ```

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Attribute, Data, DeriveInput, Fields, Lit, Meta};

/// Derive `ensayo::FixtureEnum` for a fieldless enum.
///
/// Variant names default to SCREAMING_SNAKE_CASE of the identifier.
///
/// # Attributes
///
/// - `#[fixture(name = "...")]` on a variant overrides its canonical name
/// - `#[fixture(name = "...")]` on the enum overrides the type name used
///   in error messages
#[proc_macro_derive(FixtureEnum, attributes(fixture))]
pub fn derive_fixture_enum(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_fixture_enum(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand_fixture_enum(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let Data::Enum(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            name,
            "FixtureEnum can only be derived for enums",
        ));
    };
    if data.variants.is_empty() {
        return Err(syn::Error::new_spanned(
            name,
            "FixtureEnum needs at least one variant",
        ));
    }

    let mut idents = Vec::with_capacity(data.variants.len());
    let mut names = Vec::with_capacity(data.variants.len());
    for variant in &data.variants {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(syn::Error::new_spanned(
                variant,
                "FixtureEnum variants cannot carry fields",
            ));
        }
        let canonical = extract_name_attribute(&variant.attrs)
            .unwrap_or_else(|| to_screaming_snake_case(&variant.ident.to_string()));
        if names.contains(&canonical) {
            return Err(syn::Error::new_spanned(
                variant,
                format!("duplicate FixtureEnum name \"{canonical}\""),
            ));
        }
        idents.push(&variant.ident);
        names.push(canonical);
    }

    let type_name = extract_name_attribute(&input.attrs).unwrap_or_else(|| name.to_string());
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::ensayo::FixtureEnum for #name #ty_generics #where_clause {
            const TYPE_NAME: &'static str = #type_name;

            fn variant_names() -> &'static [&'static str] {
                &[#(#names),*]
            }

            fn from_variant_name(name: &str) -> ::core::option::Option<Self> {
                match name {
                    #(#names => ::core::option::Option::Some(Self::#idents),)*
                    _ => ::core::option::Option::None,
                }
            }

            fn variant_name(&self) -> &'static str {
                match self {
                    #(Self::#idents => #names,)*
                }
            }
        }
    })
}

/// Extract `name` from `#[fixture(name = "...")]`
fn extract_name_attribute(attrs: &[Attribute]) -> Option<String> {
    attrs
        .iter()
        .filter(|attr| attr.path().is_ident("fixture"))
        .find_map(|attr| match attr.parse_args::<Meta>() {
            Ok(Meta::NameValue(nv)) if nv.path.is_ident("name") => match &nv.value {
                syn::Expr::Lit(syn::ExprLit {
                    lit: Lit::Str(s), ..
                }) => Some(s.value()),
                _ => None,
            },
            _ => None,
        })
}

/// `CssSelector` → `CSS_SELECTOR`, `XPath` → `XPATH`
fn to_screaming_snake_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);
    let mut prev_lower = false;

    for c in s.chars() {
        if c.is_uppercase() {
            if prev_lower {
                result.push('_');
            }
            result.push(c);
            prev_lower = false;
        } else {
            result.push(c.to_ascii_uppercase());
            prev_lower = c != '_';
        }
    }

    result
}
