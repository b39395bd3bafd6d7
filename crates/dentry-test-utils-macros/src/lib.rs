// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! `#[logged_test]`: wraps a test body in a
//! `dentry_test_utils::TestLoggerGuard` and exposes a `logger` binding.

use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::{parse_macro_input, spanned::Spanned, ItemFn, ReturnType, Type};

/// Attribute for synchronous tests.
///
/// ```ignore
/// #[dentry_test_utils::logged_test]
/// fn walks_to_root() {
///     logger.log("resolving").unwrap();
/// }
/// ```
///
/// Tests returning `Result` record the error text in the log before
/// propagating it.
#[proc_macro_attribute]
pub fn logged_test(attr: TokenStream, item: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        return compile_error(Span::call_site(), "#[logged_test] takes no arguments");
    }

    let mut input = parse_macro_input!(item as ItemFn);
    if let Some(token) = &input.sig.asyncness {
        return compile_error(token.span(), "#[logged_test] supports synchronous tests only");
    }
    if !input.sig.inputs.is_empty() {
        return compile_error(
            input.sig.inputs.span(),
            "#[logged_test] functions cannot take parameters",
        );
    }

    input.attrs.retain(|attr| !attr.path().is_ident("logged_test"));
    expand(input).into()
}

fn expand(input: ItemFn) -> TokenStream2 {
    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = input;
    let test_name = sig.ident.to_string();
    let finish = finish_tokens(&sig.output);

    quote! {
        #[::core::prelude::v1::test]
        #(#attrs)*
        #vis #sig {
            let mut __guard = ::dentry_test_utils::TestLoggerGuard::new(#test_name)
                .unwrap_or_else(|err| panic!("cannot create test log: {err}"));
            let __outcome = {
                let logger = __guard.logger();
                let _ = &logger;
                #block
            };
            #finish
        }
    }
}

fn finish_tokens(output: &ReturnType) -> TokenStream2 {
    let returns_result = match output {
        ReturnType::Type(_, ty) => is_result(ty),
        ReturnType::Default => false,
    };

    if returns_result {
        quote! {
            match __outcome {
                ::std::result::Result::Ok(value) => {
                    if let Err(err) = __guard.finish_success() {
                        panic!("cannot finalize test log: {err}");
                    }
                    ::std::result::Result::Ok(value)
                }
                ::std::result::Result::Err(err) => {
                    let reason = err.to_string();
                    if let Err(log_err) = __guard.finish_failure(&reason) {
                        eprintln!("cannot finalize test log: {log_err}");
                    }
                    ::std::result::Result::Err(err)
                }
            }
        }
    } else {
        quote! {
            if let Err(err) = __guard.finish_success() {
                panic!("cannot finalize test log: {err}");
            }
            __outcome
        }
    }
}

fn is_result(ty: &Type) -> bool {
    match ty {
        Type::Path(path) => path.path.segments.last().is_some_and(|seg| seg.ident == "Result"),
        _ => false,
    }
}

fn compile_error(span: Span, message: &str) -> TokenStream {
    syn::Error::new(span, message).to_compile_error().into()
}
