//! `#[nb_builtin]` — attribute macro that turns a plain Rust function into a
//! registered call-cell builtin (spec §4.5: "bind at parse time to a
//! function binding (name, arity, kind signature ...)").
//!
//! ```ignore
//! #[nb_builtin(name = "sqrt", signature = "d(d)", alias = "math.sqrt")]
//! fn sqrt_impl(args: &[Value]) -> Value { ... }
//! ```
//!
//! expands to the original function plus a zero-sized `Builtin` impl that
//! the builtin registry (`nodebrain-core::builtins`) collects at startup.

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{
    ItemFn, Lit, Meta, Token, meta::ParseNestedMeta, parse_macro_input, punctuated::Punctuated,
};

#[proc_macro_attribute]
pub fn nb_builtin(attr: TokenStream, item: TokenStream) -> TokenStream {
    let func_item = parse_macro_input!(item as ItemFn);

    let mut name = func_item.sig.ident.to_string();
    let mut signature = String::from("d(d)");
    let mut aliases: Vec<String> = Vec::new();
    let mut variadic = false;

    let parser = syn::meta::parser(|meta: ParseNestedMeta| {
        if meta.path.is_ident("name") {
            let lit: Lit = meta.value()?.parse()?;
            if let Lit::Str(s) = lit {
                name = s.value();
            }
        } else if meta.path.is_ident("signature") {
            let lit: Lit = meta.value()?.parse()?;
            if let Lit::Str(s) = lit {
                signature = s.value();
            }
        } else if meta.path.is_ident("alias") {
            let lit: Lit = meta.value()?.parse()?;
            if let Lit::Str(s) = lit {
                aliases.push(s.value());
            }
        } else if meta.path.is_ident("variadic") {
            variadic = true;
        }
        Ok(())
    });
    let _ = Punctuated::<Meta, Token![,]>::parse_terminated;
    parse_macro_input!(attr with parser);

    let vis = &func_item.vis;
    let user_fn_ident = &func_item.sig.ident;
    let wrapper_ident = format_ident!(
        "__NbBuiltin{}",
        user_fn_ident.to_string().to_ascii_uppercase()
    );
    let alias_tokens = aliases.iter().map(|a| quote! { #a });

    let expanded = quote! {
        #func_item

        #[doc(hidden)]
        #vis struct #wrapper_ident;

        impl crate::builtins::Builtin for #wrapper_ident {
            fn name(&self) -> &'static str { #name }
            fn signature(&self) -> &'static str { #signature }
            fn variadic(&self) -> bool { #variadic }
            fn aliases(&self) -> &'static [&'static str] { &[ #(#alias_tokens),* ] }
            fn call(&self, args: &[crate::values::Value]) -> crate::values::Value {
                #user_fn_ident(args)
            }
        }
    };

    expanded.into()
}
