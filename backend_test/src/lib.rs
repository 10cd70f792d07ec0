use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned, FnArg, Ident, ItemFn, Pat, Signature, Type};

/// Transform an asynchronous test into a synchronous one running against fresh
/// in-memory stores, and inject dependencies.
///
/// Injectable dependencies are [`rocket::local::asynchronous::Client`],
/// `crate::store::VotingDb` and `crate::store::RegistryDb`.
///
/// With no argument the client talks to the Voting Service. `admin` additionally
/// logs the client in as the default administrator; `registry` points the client
/// at the Registry Service instead.
#[proc_macro_attribute]
pub fn backend_test(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);

    // Extract the values to inject and reject invalid function signatures.
    let test_args = match check_sig(item_fn.sig.clone()) {
        Ok(args) => args,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    let arg = parse_macro_input!(args as Option<Ident>);
    let (rocket, maybe_login) = match arg {
        None => (
            quote! { crate::voting_rocket_for(voting_db.clone(), gateway) },
            quote! {},
        ),
        Some(arg) if arg == "admin" => (
            quote! { crate::voting_rocket_for(voting_db.clone(), gateway) },
            quote! {
                {
                let response = rocket_client
                    .post(uri!(crate::api::auth::login))
                    .header(rocket::http::ContentType::JSON)
                    .body(rocket::serde::json::json!(crate::model::api::account::LoginRequest::example_admin()).to_string())
                    .dispatch()
                    .await;
                assert_eq!(rocket::http::Status::Ok, response.status());
                }
            },
        ),
        Some(arg) if arg == "registry" => (
            quote! { crate::registry_rocket_for(registry_db.clone()) },
            quote! {},
        ),
        Some(arg) => {
            return syn::Error::new(arg.span(), "Expected `admin` or `registry`")
                .into_compile_error()
                .into();
        }
    };

    // Rewrite the test function.
    quote! {
        #[test]
        fn #name() {
            /// Test setup.
            #[allow(unused_variables)]
            async fn setup() -> (
                rocket::local::asynchronous::Client,
                crate::store::VotingDb,
                crate::store::RegistryDb,
            ) {
                log4rs_test_utils::test_logging::init_logging_once_for(
                    ["civic_election"],
                    None,
                    None,
                );

                let registry_db = crate::store::RegistryDb::new(
                    crate::store::memory::MemoryRegistryStore::new(),
                );
                let voting_db = crate::store::VotingDb::new(
                    crate::store::memory::MemoryVotingStore::new(),
                );
                let gateway = crate::gateway::Gateway::new(
                    crate::gateway::LocalGateway::new(registry_db.clone()),
                );
                let rocket_client = rocket::local::asynchronous::Client::tracked(#rocket)
                    .await
                    .unwrap();

                #maybe_login

                (rocket_client, voting_db, registry_db)
            }

            /// The test itself.
            #item_fn

            // Rocket's local client must be created and used on the same runtime.
            let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("rocket-worker-test-thread")
                .worker_threads(1)
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                #[allow(unused_variables)]
                let (rocket_client, voting_db, registry_db) = setup().await;
                #new_name(#(#test_args),*).await;
            });
        }
    }
    .into()
}

/// Ensure the wrapped test is async, extract parameters to inject, and reject unknown parameters.
fn check_sig(sig: Signature) -> Result<Vec<TokenStream2>, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut seen = Vec::new();
    let mut args = vec![];

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let Pat::Ident(_) = &*pat_type.pat {
                if let Type::Path(type_path) = &*pat_type.ty {
                    if let Some(type_ident) = type_path.path.segments.last().map(|s| &s.ident) {
                        let injected = if type_ident == "Client" {
                            Some(quote! { rocket_client })
                        } else if type_ident == "VotingDb" {
                            Some(quote! { voting_db.clone() })
                        } else if type_ident == "RegistryDb" {
                            Some(quote! { registry_db.clone() })
                        } else {
                            None
                        };
                        if let Some(injected) = injected {
                            if seen.contains(type_ident) {
                                return Err(syn::Error::new(
                                    input.span(),
                                    format!("Test cannot accept more than one `{type_ident}`"),
                                ));
                            }
                            seen.push(type_ident.clone());
                            args.push(injected);
                            continue;
                        }
                    }
                }
            }
        }

        return Err(syn::Error::new(
            input.span(),
            "Expected one of `client_ident: Client`, `db_ident: VotingDb` or `registry_ident: RegistryDb`",
        ));
    }

    Ok(args)
}
