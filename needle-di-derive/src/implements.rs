use proc_macro2::TokenStream;
use quote::quote;
use syn::spanned::Spanned;
use syn::{Error, ItemImpl, Result};

pub fn expand_implements(item: ItemImpl) -> Result<TokenStream> {
    let Some((_, trait_path, _)) = &item.trait_ else {
        return Err(Error::new(
            item.span(),
            "Implementations must be trait impl blocks!",
        ));
    };

    if !item.generics.params.is_empty() {
        return Err(Error::new(
            item.generics.span(),
            "Generic implementations are not supported!",
        ));
    }

    let self_ty = &item.self_ty;
    Ok(quote! {
        #item

        #[automatically_derived]
        impl needle_di::instance::Upcast<dyn #trait_path + Send + Sync> for #self_ty {
            #[inline]
            fn upcast(
                instance: needle_di::instance::InstancePtr<Self>,
            ) -> needle_di::instance::InstancePtr<dyn #trait_path + Send + Sync> {
                instance
            }
        }
    })
}
