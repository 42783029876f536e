use crate::attributes::{
    has_attribute, strip_attributes, InjectableAttributes, ParameterAttributes,
    DEFAULT_CONSTRUCTOR, IGNORE, INJECT, SCOPE_ATTR,
};
use proc_macro2::TokenStream;
use quote::{quote, ToTokens};
use syn::spanned::Spanned;
use syn::{
    Error, FnArg, GenericArgument, ImplItem, ImplItemFn, Item, ItemImpl, ItemTrait, Pat,
    PathArguments, Result, ReturnType, Signature, Type,
};

pub fn expand_injectable(item: Item, args: &InjectableAttributes) -> Result<TokenStream> {
    match item {
        Item::Trait(item) => {
            if !args.is_empty() {
                return Err(Error::new(
                    item.span(),
                    "Injectable traits take no arguments!",
                ));
            }

            expand_trait(&item)
        }
        Item::Impl(item) => expand_impl(item, args),
        _ => Err(Error::new(
            item.span(),
            "Only inherent impl blocks and traits can be injectable!",
        )),
    }
}

fn expand_trait(item: &ItemTrait) -> Result<TokenStream> {
    if !item.generics.params.is_empty() {
        return Err(Error::new(
            item.generics.span(),
            "Generic traits are not supported!",
        ));
    }

    let ident = &item.ident;
    let injectable = generate_trait_injectable(ident, None);
    Ok(quote! {
        #item

        #injectable
    })
}

/// Injectable implementation for `dyn Trait + Send + Sync`, optionally with an interception
/// surface.
pub fn generate_trait_injectable(ident: &syn::Ident, surface: Option<TokenStream>) -> TokenStream {
    let surface = surface.map(|surface| {
        quote! {
            #[inline]
            fn surface() -> Option<&'static needle_di::aop::InterceptionSurface> {
                Some(#surface)
            }
        }
    });

    quote! {
        #[automatically_derived]
        impl needle_di::instance::Injectable for dyn #ident + Send + Sync {
            fn downcast(
                instance: needle_di::instance::InstanceAnyPtr,
            ) -> Result<needle_di::instance::InstancePtr<Self>, needle_di::instance::InstanceAnyPtr> {
                instance
                    .downcast::<needle_di::instance::InstancePtr<Self>>()
                    .map(|instance| needle_di::instance::InstancePtr::clone(&*instance))
            }

            fn into_any(
                instance: needle_di::instance::InstancePtr<Self>,
            ) -> needle_di::instance::InstanceAnyPtr {
                needle_di::instance::InstancePtr::new(instance)
            }

            #surface
        }
    }
}

enum ReturnKind {
    Unit,
    Value,
    Fallible,
}

fn is_self_type(ty: &Type, self_ty: &Type) -> bool {
    match ty {
        Type::Path(path) if path.qself.is_none() && path.path.is_ident("Self") => true,
        ty => ty.to_token_stream().to_string() == self_ty.to_token_stream().to_string(),
    }
}

/// Returns the first generic argument of a `Result`.
fn result_ok_type(ty: &Type) -> Option<&Type> {
    let Type::Path(path) = ty else {
        return None;
    };

    let segment = path.path.segments.last()?;
    if segment.ident != "Result" {
        return None;
    }

    let PathArguments::AngleBracketed(arguments) = &segment.arguments else {
        return None;
    };

    arguments.args.iter().find_map(|argument| match argument {
        GenericArgument::Type(ty) => Some(ty),
        _ => None,
    })
}

fn constructor_kind(signature: &Signature, self_ty: &Type) -> Option<ReturnKind> {
    if signature.receiver().is_some() || !signature.generics.params.is_empty() {
        return None;
    }

    match &signature.output {
        ReturnType::Default => None,
        ReturnType::Type(_, ty) if is_self_type(ty, self_ty) => Some(ReturnKind::Value),
        ReturnType::Type(_, ty) => result_ok_type(ty)
            .filter(|ty| is_self_type(ty, self_ty))
            .map(|_| ReturnKind::Fallible),
    }
}

fn method_kind(signature: &Signature) -> ReturnKind {
    match &signature.output {
        ReturnType::Default => ReturnKind::Unit,
        ReturnType::Type(_, ty) if result_ok_type(ty).is_some() => ReturnKind::Fallible,
        ReturnType::Type(_, _) => ReturnKind::Value,
    }
}

struct Parameters {
    descriptors: Vec<TokenStream>,
    extractions: Vec<TokenStream>,
}

fn generate_parameters(signature: &Signature) -> Result<Parameters> {
    let mut descriptors = vec![];
    let mut extractions = vec![];

    for (index, argument) in signature
        .inputs
        .iter()
        .filter_map(|argument| match argument {
            FnArg::Typed(argument) => Some(argument),
            FnArg::Receiver(_) => None,
        })
        .enumerate()
    {
        let name = match argument.pat.as_ref() {
            Pat::Ident(pat) => pat.ident.to_string(),
            _ => format!("arg{index}"),
        };

        let ty = &argument.ty;
        let attributes = ParameterAttributes::try_from(argument.attrs.as_slice())?;
        if attributes.ignore {
            descriptors.push(quote! {
                needle_di::descriptor::ParameterDescriptor::ignored::<#ty>(#name)
            });
            extractions.push(quote!(arguments.ignored::<#ty>(#name)?));
            continue;
        }

        let scope_attribute = attributes.scope_attr.map(|attribute| {
            let attribute_name = attribute.name;
            let task = attribute.task;
            quote! {
                .with_scope_attribute(needle_di::descriptor::ScopeAttribute::new(#attribute_name, #task))
            }
        });

        descriptors.push(quote! {
            <#ty as needle_di::descriptor::Argument>::descriptor(#name) #scope_attribute
        });
        extractions.push(quote!(arguments.next::<#ty>(#name)?));
    }

    Ok(Parameters {
        descriptors,
        extractions,
    })
}

fn construction_error(self_ty: &Type) -> TokenStream {
    quote! {
        .map_err(|error| needle_di::error::ResolutionError::construction_failed(
            std::any::type_name::<#self_ty>(),
            error,
        ))?
    }
}

fn generate_constructor(
    method: &ImplItemFn,
    kind: ReturnKind,
    self_ty: &Type,
) -> Result<TokenStream> {
    let ident = &method.sig.ident;
    let name = ident.to_string();
    let is_default = has_attribute(&method.attrs, DEFAULT_CONSTRUCTOR);
    let Parameters {
        descriptors,
        extractions,
    } = generate_parameters(&method.sig)?;

    let map_error = match kind {
        ReturnKind::Fallible => Some(construction_error(self_ty)),
        _ => None,
    };

    Ok(quote! {
        needle_di::descriptor::ConstructorDescriptor {
            name: #name,
            parameters: vec![#(#descriptors),*],
            is_default: #is_default,
            construct: {
                #[allow(unused_mut, unused_variables)]
                fn construct(
                    arguments: Vec<needle_di::descriptor::ResolvedArgument>,
                ) -> Result<needle_di::instance::InstanceBox, needle_di::error::ResolutionError> {
                    let mut arguments = needle_di::descriptor::Arguments::new(
                        needle_di::instance::TypeKey::of::<#self_ty>(),
                        arguments,
                    );
                    let instance = <#self_ty>::#ident(#(#extractions),*) #map_error;
                    Ok(Box::new(instance) as needle_di::instance::InstanceBox)
                }

                construct
            },
        }
    })
}

fn generate_injection_method(method: &ImplItemFn, self_ty: &Type) -> Result<TokenStream> {
    let is_mutable_reference = method
        .sig
        .receiver()
        .map(|receiver| receiver.reference.is_some() && receiver.mutability.is_some())
        .unwrap_or(false);

    if !is_mutable_reference || !method.sig.generics.params.is_empty() {
        return Err(Error::new(
            method.sig.span(),
            "Injection methods must be non-generic and take &mut self!",
        ));
    }

    let ident = &method.sig.ident;
    let name = ident.to_string();
    let Parameters {
        descriptors,
        extractions,
    } = generate_parameters(&method.sig)?;

    let call = quote!(instance.#ident(#(#extractions),*));
    let call = match method_kind(&method.sig) {
        ReturnKind::Fallible => {
            let map_error = construction_error(self_ty);
            quote!(#call #map_error;)
        }
        ReturnKind::Value => quote!(let _ = #call;),
        ReturnKind::Unit => quote!(#call;),
    };

    Ok(quote! {
        needle_di::descriptor::InjectionMethodDescriptor {
            name: #name,
            parameters: vec![#(#descriptors),*],
            inject: {
                #[allow(unused_mut, unused_variables)]
                fn inject(
                    instance: &mut needle_di::instance::InstanceBox,
                    arguments: Vec<needle_di::descriptor::ResolvedArgument>,
                ) -> Result<(), needle_di::error::ResolutionError> {
                    let type_key = needle_di::instance::TypeKey::of::<#self_ty>();
                    let mut arguments = needle_di::descriptor::Arguments::new(type_key, arguments);
                    let instance = instance.downcast_mut::<#self_ty>().ok_or(
                        needle_di::error::ConfigurationError::IncompatibleInstance(type_key.name),
                    )?;

                    #call
                    Ok(())
                }

                inject
            },
        }
    })
}

fn strip_helper_attributes(method: &mut ImplItemFn) {
    strip_attributes(&mut method.attrs, &[DEFAULT_CONSTRUCTOR, INJECT]);
    for argument in method.sig.inputs.iter_mut() {
        if let FnArg::Typed(argument) = argument {
            strip_attributes(&mut argument.attrs, &[IGNORE, SCOPE_ATTR]);
        }
    }
}

fn expand_impl(mut item: ItemImpl, args: &InjectableAttributes) -> Result<TokenStream> {
    if item.trait_.is_some() {
        return Err(Error::new(
            item.span(),
            "Trait impl blocks cannot be injectable - use #[implements] instead!",
        ));
    }

    if !item.generics.params.is_empty() {
        return Err(Error::new(
            item.generics.span(),
            "Generic types are not supported!",
        ));
    }

    let self_ty = item.self_ty.as_ref().clone();

    let mut constructors = vec![];
    let mut injection_methods = vec![];

    for member in item.items.iter_mut() {
        let ImplItem::Fn(method) = member else {
            continue;
        };

        if has_attribute(&method.attrs, INJECT) {
            injection_methods.push(generate_injection_method(method, &self_ty)?);
        } else if let Some(kind) = constructor_kind(&method.sig, &self_ty) {
            constructors.push(generate_constructor(method, kind, &self_ty)?);
        } else if has_attribute(&method.attrs, DEFAULT_CONSTRUCTOR) {
            return Err(Error::new(
                method.sig.span(),
                "Default constructors must return Self or Result<Self, E>!",
            ));
        }

        strip_helper_attributes(method);
    }

    if constructors.is_empty() {
        return Err(Error::new(
            item.self_ty.span(),
            "Injectable types need at least one constructor!",
        ));
    }

    let scope = args.scope.as_ref().map(|scope| {
        quote!(.with_scope(needle_di::scope::ScopeKind::from_name(#scope)))
    });
    let explicit_constructor = args
        .constructor
        .as_ref()
        .map(|constructor| quote!(.with_explicit_constructor(#constructor)));

    let injection_methods = (!injection_methods.is_empty()).then(|| {
        quote!(.with_injection_methods(vec![#(#injection_methods),*]))
    });

    Ok(quote! {
        #item

        const _: () = {
            #[automatically_derived]
            impl needle_di::instance::Injectable for #self_ty {
                #[inline]
                fn downcast(
                    instance: needle_di::instance::InstanceAnyPtr,
                ) -> Result<needle_di::instance::InstancePtr<Self>, needle_di::instance::InstanceAnyPtr> {
                    instance.downcast::<Self>()
                }

                #[inline]
                fn into_any(
                    instance: needle_di::instance::InstancePtr<Self>,
                ) -> needle_di::instance::InstanceAnyPtr {
                    instance
                }
            }

            #[automatically_derived]
            impl needle_di::descriptor::Constructible for #self_ty {
                fn descriptor() -> needle_di::descriptor::TypeDescriptor {
                    needle_di::descriptor::TypeDescriptor::new::<Self>(vec![#(#constructors),*])
                        #injection_methods
                        #scope
                        #explicit_constructor
                }
            }

            needle_di::descriptor::internal::submit! {
                needle_di::descriptor::internal::TypeRegisterer {
                    register: <#self_ty as needle_di::descriptor::Constructible>::descriptor
                }
            }
        };
    })
}
