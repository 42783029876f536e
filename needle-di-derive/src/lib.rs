use crate::attributes::InjectableAttributes;
use crate::implements::expand_implements;
use crate::injectable::expand_injectable;
use crate::intercepted::expand_intercepted;
use proc_macro::TokenStream;
use syn::{parse_macro_input, Error, Item, ItemImpl, ItemTrait};

mod attributes;
mod implements;
mod injectable;
mod intercepted;

/// Makes a type or a trait injectable. On an inherent impl block, registers the type along with
/// its constructors. On a trait, makes `dyn Trait + Send + Sync` resolvable.
#[proc_macro_attribute]
pub fn injectable(args: TokenStream, input: TokenStream) -> TokenStream {
    let args = parse_macro_input!(args as InjectableAttributes);
    let item = parse_macro_input!(input as Item);
    expand_injectable(item, &args)
        .unwrap_or_else(Error::into_compile_error)
        .into()
}

/// Makes a trait injectable and its methods interceptable by generating a proxy.
#[proc_macro_attribute]
pub fn intercepted(args: TokenStream, input: TokenStream) -> TokenStream {
    if !args.is_empty() {
        return Error::new(
            proc_macro2::Span::call_site(),
            "Intercepted traits take no arguments!",
        )
        .into_compile_error()
        .into();
    }

    let item = parse_macro_input!(input as ItemTrait);
    expand_intercepted(item)
        .unwrap_or_else(Error::into_compile_error)
        .into()
}

/// Allows binding the trait implemented in given impl block to the implementing type.
#[proc_macro_attribute]
pub fn implements(args: TokenStream, input: TokenStream) -> TokenStream {
    if !args.is_empty() {
        return Error::new(
            proc_macro2::Span::call_site(),
            "Implementations take no arguments!",
        )
        .into_compile_error()
        .into();
    }

    let item = parse_macro_input!(input as ItemImpl);
    expand_implements(item)
        .unwrap_or_else(Error::into_compile_error)
        .into()
}
