use syn::parse::{Parse, ParseStream};
use syn::{Attribute, Error, LitStr, Token};

pub const DEFAULT_CONSTRUCTOR: &str = "default_constructor";
pub const INJECT: &str = "inject";
pub const IGNORE: &str = "ignore";
pub const SCOPE_ATTR: &str = "scope_attr";

#[derive(Default)]
pub struct InjectableAttributes {
    pub scope: Option<LitStr>,
    pub constructor: Option<LitStr>,
}

impl InjectableAttributes {
    pub fn is_empty(&self) -> bool {
        self.scope.is_none() && self.constructor.is_none()
    }
}

impl Parse for InjectableAttributes {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut result = Self::default();
        while !input.is_empty() {
            let lookahead = input.lookahead1();
            if lookahead.peek(kw::scope) {
                if result.scope.is_some() {
                    return Err(Error::new(input.span(), "Scope is already defined!"));
                }

                result.scope = Some(input.parse::<LitArg<kw::scope, LitStr>>()?.value);
            } else if lookahead.peek(kw::constructor) {
                if result.constructor.is_some() {
                    return Err(Error::new(input.span(), "Constructor is already defined!"));
                }

                result.constructor = Some(input.parse::<LitArg<kw::constructor, LitStr>>()?.value);
            } else if lookahead.peek(Token![,]) {
                let _ = input.parse::<Token![,]>()?;
            } else {
                return Err(lookahead.error());
            }
        }

        Ok(result)
    }
}

struct LitArg<T, A> {
    value: A,
    _p: std::marker::PhantomData<T>,
}

impl<T: Parse, A: Parse> Parse for LitArg<T, A> {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let _ = input.parse::<T>()?;
        let _ = input.parse::<Token![=]>()?;
        let value = input.parse()?;
        Ok(Self {
            value,
            _p: std::marker::PhantomData,
        })
    }
}

mod kw {
    use syn::custom_keyword;

    custom_keyword!(scope);
    custom_keyword!(constructor);
}

/// `#[scope_attr(name = "...", task)]`
pub struct ScopeAttrAttributes {
    pub name: LitStr,
    pub task: bool,
}

impl TryFrom<&Attribute> for ScopeAttrAttributes {
    type Error = Error;

    fn try_from(value: &Attribute) -> Result<Self, Self::Error> {
        let mut name = None;
        let mut task = false;
        value.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                name = Some(meta.value().and_then(|value| value.parse())?);
            } else if meta.path.is_ident("task") {
                task = true;
            } else {
                return Err(meta.error("Unsupported scope attribute argument!"));
            }

            Ok(())
        })?;

        let name = name.ok_or_else(|| Error::new_spanned(value, "Missing attribute name!"))?;
        Ok(Self { name, task })
    }
}

/// Markers of a single constructor or injection method parameter.
#[derive(Default)]
pub struct ParameterAttributes {
    pub ignore: bool,
    pub scope_attr: Option<ScopeAttrAttributes>,
}

impl TryFrom<&[Attribute]> for ParameterAttributes {
    type Error = Error;

    fn try_from(value: &[Attribute]) -> Result<Self, Self::Error> {
        let mut result = Self::default();
        for attribute in value {
            if attribute.path().is_ident(IGNORE) {
                result.ignore = true;
            } else if attribute.path().is_ident(SCOPE_ATTR) {
                if result.scope_attr.is_some() {
                    return Err(Error::new_spanned(
                        attribute,
                        "Scope attribute is already defined!",
                    ));
                }

                result.scope_attr = Some(ScopeAttrAttributes::try_from(attribute)?);
            }
        }

        if result.ignore && result.scope_attr.is_some() {
            return Err(Error::new_spanned(
                &value[0],
                "Ignored parameters cannot be scope attributes!",
            ));
        }

        Ok(result)
    }
}

pub fn has_attribute(attributes: &[Attribute], name: &str) -> bool {
    attributes
        .iter()
        .any(|attribute| attribute.path().is_ident(name))
}

/// Removes helper attributes, which are not known to the compiler.
pub fn strip_attributes(attributes: &mut Vec<Attribute>, names: &[&str]) {
    attributes.retain(|attribute| {
        !names
            .iter()
            .any(|name| attribute.path().is_ident(name))
    });
}
