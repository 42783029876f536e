use crate::injectable::generate_trait_injectable;
use itertools::Itertools;
use proc_macro2::{Ident, TokenStream};
use quote::{format_ident, quote, ToTokens};
use syn::spanned::Spanned;
use syn::{
    Error, FnArg, GenericArgument, ItemTrait, Pat, PathArguments, Result, ReturnType, TraitItem,
    TraitItemFn, Type, TypeParamBound, TypePath,
};

struct InterceptedMethod<'a> {
    method: &'a TraitItemFn,
    index: usize,
}

fn validate_supertraits(item: &ItemTrait) -> Result<()> {
    for bound in &item.supertraits {
        let is_marker = match bound {
            TypeParamBound::Trait(bound) => {
                bound.path.is_ident("Send") || bound.path.is_ident("Sync")
            }
            _ => true,
        };

        if !is_marker {
            return Err(Error::new(
                bound.span(),
                "Intercepted traits can only have Send and Sync supertraits!",
            ));
        }
    }

    Ok(())
}

fn validate_method(method: &TraitItemFn) -> Result<()> {
    let signature = &method.sig;
    let is_shared_reference = signature
        .receiver()
        .map(|receiver| receiver.reference.is_some() && receiver.mutability.is_none())
        .unwrap_or(false);

    if !is_shared_reference {
        return Err(Error::new(
            signature.span(),
            "Intercepted methods must take &self!",
        ));
    }

    if !signature.generics.params.is_empty() {
        return Err(Error::new(
            signature.generics.span(),
            "Intercepted methods cannot be generic!",
        ));
    }

    if signature.asyncness.is_some() || signature.unsafety.is_some() {
        return Err(Error::new(
            signature.span(),
            "Intercepted methods cannot be async or unsafe!",
        ));
    }

    let returns_result = match &signature.output {
        ReturnType::Type(_, ty) => is_error_ptr_result(ty),
        ReturnType::Default => false,
    };

    if !returns_result {
        return Err(Error::new(
            signature.output.span(),
            "Intercepted methods must return Result<T, ErrorPtr>!",
        ));
    }

    for argument in &signature.inputs {
        if let FnArg::Typed(argument) = argument {
            if borrows(&argument.ty) {
                return Err(Error::new(
                    argument.ty.span(),
                    "Intercepted method arguments must be owned and 'static!",
                ));
            }
        }
    }

    if let ReturnType::Type(_, ty) = &signature.output {
        if borrows(ty) {
            return Err(Error::new(
                ty.span(),
                "Intercepted method results must be owned and 'static!",
            ));
        }
    }

    Ok(())
}

fn last_segment_arguments<'a>(path: &'a TypePath, ident: &str) -> Option<&'a PathArguments> {
    path.path
        .segments
        .last()
        .filter(|segment| segment.ident == ident)
        .map(|segment| &segment.arguments)
}

fn is_error_ptr_result(ty: &Type) -> bool {
    let Type::Path(path) = ty else {
        return false;
    };

    let Some(PathArguments::AngleBracketed(arguments)) = last_segment_arguments(path, "Result")
    else {
        return false;
    };

    let types = arguments
        .args
        .iter()
        .filter_map(|argument| match argument {
            GenericArgument::Type(ty) => Some(ty),
            _ => None,
        })
        .collect_vec();

    match types.as_slice() {
        [_, Type::Path(error)] => last_segment_arguments(error, "ErrorPtr").is_some(),
        _ => false,
    }
}

/// Checks if a type holds a borrow, which cannot be moved into a join point.
fn borrows(ty: &Type) -> bool {
    match ty {
        Type::Reference(_) | Type::Ptr(_) | Type::ImplTrait(_) | Type::BareFn(_) => true,
        Type::Array(array) => borrows(&array.elem),
        Type::Slice(slice) => borrows(&slice.elem),
        Type::Group(group) => borrows(&group.elem),
        Type::Paren(paren) => borrows(&paren.elem),
        Type::Tuple(tuple) => tuple.elems.iter().any(borrows),
        Type::TraitObject(object) => object.bounds.iter().any(bound_borrows),
        Type::Path(path) => {
            path.qself.as_ref().map(|qself| borrows(&qself.ty)).unwrap_or(false)
                || path
                    .path
                    .segments
                    .iter()
                    .any(|segment| match &segment.arguments {
                        PathArguments::AngleBracketed(arguments) => {
                            arguments.args.iter().any(|argument| match argument {
                                GenericArgument::Type(ty) => borrows(ty),
                                GenericArgument::Lifetime(lifetime) => lifetime.ident != "static",
                                _ => false,
                            })
                        }
                        PathArguments::Parenthesized(arguments) => {
                            arguments.inputs.iter().any(borrows)
                        }
                        PathArguments::None => false,
                    })
        }
        _ => false,
    }
}

fn bound_borrows(bound: &TypeParamBound) -> bool {
    match bound {
        TypeParamBound::Lifetime(lifetime) => lifetime.ident != "static",
        _ => false,
    }
}

fn parameter_names(method: &TraitItemFn) -> Vec<String> {
    method
        .sig
        .inputs
        .iter()
        .filter_map(|argument| match argument {
            FnArg::Typed(argument) => Some(argument),
            FnArg::Receiver(_) => None,
        })
        .enumerate()
        .map(|(index, argument)| match argument.pat.as_ref() {
            Pat::Ident(pat) => pat.ident.to_string(),
            _ => format!("arg{index}"),
        })
        .collect()
}

fn generate_descriptor(method: &InterceptedMethod) -> TokenStream {
    let index = method.index;
    let name = method.method.sig.ident.to_string();
    let parameters = parameter_names(method.method);
    let return_type = match &method.method.sig.output {
        ReturnType::Type(_, ty) => ty.to_token_stream().to_string(),
        ReturnType::Default => "()".to_string(),
    };

    quote! {
        needle_di::aop::MethodDescriptor {
            index: #index,
            name: #name,
            parameters: &[#(#parameters),*],
            return_type: #return_type,
        }
    }
}

fn generate_proxy_method(method: &InterceptedMethod) -> TokenStream {
    let index = method.index;
    let signature = &method.method.sig;
    let ident = &signature.ident;
    let name = ident.to_string();
    let output = &signature.output;

    let (arguments, types): (Vec<Ident>, Vec<_>) = signature
        .inputs
        .iter()
        .filter_map(|argument| match argument {
            FnArg::Typed(argument) => Some(argument),
            FnArg::Receiver(_) => None,
        })
        .enumerate()
        .map(|(index, argument)| (format_ident!("arg{}", index), &argument.ty))
        .unzip();

    let body = if arguments.is_empty() {
        quote!(|_| target.#ident())
    } else {
        let next = arguments.iter().map(|_| quote!(arguments.next()?));
        quote! {
            |arguments| {
                let mut arguments = needle_di::aop::internal::MethodArguments::new(#name, arguments);
                target.#ident(#(#next),*)
            }
        }
    };

    quote! {
        fn #ident(&self, #(#arguments: #types),*) #output {
            if !self.runtime.intercepts(#index) {
                return self.target.#ident(#(#arguments),*);
            }

            let target = &self.target;
            self.runtime.invoke(
                #index,
                vec![#(Box::new(#arguments) as needle_di::aop::ArgumentValue),*],
                #body,
            )
        }
    }
}

pub fn expand_intercepted(item: ItemTrait) -> Result<TokenStream> {
    if !item.generics.params.is_empty() {
        return Err(Error::new(
            item.generics.span(),
            "Generic traits are not supported!",
        ));
    }

    validate_supertraits(&item)?;

    let methods: Vec<_> = item
        .items
        .iter()
        .enumerate()
        .map(|(index, member)| match member {
            TraitItem::Fn(method) => {
                validate_method(method)?;
                Ok(InterceptedMethod { method, index })
            }
            member => Err(Error::new(
                member.span(),
                "Intercepted traits can only contain methods!",
            )),
        })
        .try_collect()?;

    let ident = &item.ident;
    let proxy = format_ident!("{}InterceptedProxy", ident);
    let name = ident.to_string();
    let descriptors = methods.iter().map(generate_descriptor);
    let proxy_methods = methods.iter().map(generate_proxy_method);
    let injectable = generate_trait_injectable(ident, Some(quote!(&SURFACE)));

    Ok(quote! {
        #item

        const _: () = {
            struct #proxy {
                target: needle_di::instance::InstancePtr<dyn #ident + Send + Sync>,
                runtime: std::sync::Arc<needle_di::aop::ProxyRuntime>,
            }

            impl #ident for #proxy {
                #(#proxy_methods)*
            }

            fn wrap(
                instance: needle_di::instance::InstanceAnyPtr,
                runtime: std::sync::Arc<needle_di::aop::ProxyRuntime>,
            ) -> Result<needle_di::instance::InstanceAnyPtr, needle_di::instance::InstanceAnyPtr> {
                let target = <dyn #ident + Send + Sync as needle_di::instance::Injectable>::downcast(instance)?;
                let proxy: needle_di::instance::InstancePtr<dyn #ident + Send + Sync> =
                    needle_di::instance::InstancePtr::new(#proxy { target, runtime });

                Ok(<dyn #ident + Send + Sync as needle_di::instance::Injectable>::into_any(proxy))
            }

            static SURFACE: needle_di::aop::InterceptionSurface = needle_di::aop::InterceptionSurface {
                name: #name,
                methods: &[#(#descriptors),*],
                wrap,
            };

            #injectable
        };
    })
}
