use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned, FnArg, ItemFn, Pat, Signature, Type};

#[proc_macro_attribute]
/// Provides a fresh simulated deployment to the function: a `SimClient`
/// built with the default configuration and the `Simulation` it runs
/// against, then instruments it as a synchronous `#[test]` running on its
/// own tokio runtime.
///
/// Note: this attribute requires that `SimClient` and `Simulation` resolve
/// to `crate::sim::SimClient` and `crate::sim::Simulation` at the use site,
/// and that `tokio` is available with the `rt-multi-thread` feature.
pub fn sim_test(_: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);
    let sig = item_fn.sig.clone();
    let name = sig.ident.clone();
    if let Err(err) = check_sig(sig) {
        return err.into_compile_error().into();
    }
    let new_name = format_ident!("{}_inner", name);
    item_fn.sig.ident = new_name.clone();
    quote! {
        #[test]
        fn #name() {
            #item_fn

            let simulation = crate::sim::Simulation::new();
            let client = simulation.client(crate::config::Config::default());

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .expect("failed to build test runtime");
            runtime.block_on(#new_name(client, simulation));
        }
    }
    .into()
}

fn check_sig(sig: Signature) -> Result<(), syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(
            sig.fn_token.span(),
            "The tagged function must be async",
        ));
    }

    let inputs = sig.inputs;
    if inputs.len() != 2 {
        return Err(syn::Error::new(
            inputs.span(),
            "Arguments must be a `SimClient` and a `Simulation`, in that order",
        ));
    }

    let expected = ["SimClient", "Simulation"];
    for (input, expected) in inputs.iter().zip(expected) {
        let FnArg::Typed(pat_type) = input else {
            return Err(syn::Error::new(
                input.span(),
                "Function argument must not be a receiver type",
            ));
        };
        if !matches!(&*pat_type.pat, Pat::Ident(_) | Pat::Wild(_)) {
            return Err(syn::Error::new(
                pat_type.pat.span(),
                "Function argument pattern must be an identifier",
            ));
        }
        let Type::Path(type_path) = &*pat_type.ty else {
            return Err(syn::Error::new(
                pat_type.ty.span(),
                "Function argument type must be a type identifier",
            ));
        };
        let ty_ident = type_path
            .path
            .get_ident()
            .ok_or_else(|| {
                syn::Error::new(
                    type_path.path.span(),
                    "Type must be a standalone type identifier",
                )
            })?
            .to_string();
        if ty_ident != expected {
            return Err(syn::Error::new(
                type_path.path.span(),
                format!("Expected `{expected}`, got `{ty_ident}`"),
            ));
        }
    }
    Ok(())
}
