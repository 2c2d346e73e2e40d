use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned, FnArg, Ident, ItemFn, Pat, Signature, Type};

/// Transform an asynchronous test into a synchronous one running against a
/// fresh, seeded, in-memory backend, and inject dependencies.
///
/// Injectable dependencies are [`rocket::local::asynchronous::Client`] and
/// `crate::backend::Backend` (the same backend the client's server uses).
///
/// `#[backend_test(admin)]` logs the client in as the first seeded admin;
/// `#[backend_test(voter)]` registers the example voter and logs them in.
#[proc_macro_attribute]
pub fn backend_test(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);

    // Extract the arguments to inject and reject invalid function signatures.
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

    // Log in the client as admin/voter if needed.
    let maybe_login = match parse_macro_input!(args as Option<Ident>) {
        Some(arg) if arg == "admin" => quote! {
            // The response borrows the client, which is moved out below.
            {
                let response = rocket_client
                    .post("/api/admin/login")
                    .header(rocket::http::ContentType::JSON)
                    .body(rocket::serde::json::json!(crate::model::admin::AdminLogin::example()).to_string())
                    .dispatch()
                    .await;
                assert_eq!(rocket::http::Status::Ok, response.status(), "admin login failed");
            }
        },
        Some(arg) if arg == "voter" => quote! {
            let registration = crate::model::voter::VoterRegistration::example();
            let password = registration.password.clone();
            let registered = backend
                .register_voter(registration, "admin-001")
                .await
                .unwrap();

            {
                let response = rocket_client
                    .post("/api/voters/login")
                    .header(rocket::http::ContentType::JSON)
                    .body(rocket::serde::json::json!(crate::model::voter::VoterLogin {
                        identifier: registered.voter_id,
                        password,
                    }).to_string())
                    .dispatch()
                    .await;
                assert_eq!(rocket::http::Status::Ok, response.status(), "voter login failed");
            }
        },
        Some(arg) => {
            return syn::Error::new(arg.span(), "Expected `admin` or `voter`")
                .into_compile_error()
                .into();
        }
        None => quote! {},
    };

    // Rewrite the test function.
    quote! {
        #[test]
        fn #name() {
            /// Test setup.
            async fn setup() -> (rocket::local::asynchronous::Client, crate::backend::Backend) {
                let config = crate::config::Config::example();
                let backend = crate::backend::Backend::in_memory(&config);
                crate::seed::seed_defaults(&backend).await.unwrap();
                let rocket_client = rocket::local::asynchronous::Client::tracked(
                    crate::rocket_for_backend(backend.clone(), config),
                )
                .await
                .unwrap();

                #maybe_login

                (rocket_client, backend)
            }

            /// The test itself.
            #item_fn

            let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("rocket-worker-test-thread")
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                let (rocket_client, backend) = setup().await;
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

    let mut has_client = false;
    let mut has_backend = false;
    let mut args = vec![];

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let (Pat::Ident(_), Type::Path(type_path)) = (&*pat_type.pat, &*pat_type.ty) {
                // The last path segment names the type however it was imported.
                let type_ident = type_path.path.segments.last().map(|s| s.ident.clone());
                match type_ident {
                    Some(ident) if ident == "Client" => {
                        if has_client {
                            return Err(syn::Error::new(
                                input.span(),
                                "Test cannot accept more than one `rocket::local::asynchronous::Client`",
                            ));
                        }
                        has_client = true;
                        args.push(quote! { rocket_client });
                        continue;
                    }
                    Some(ident) if ident == "Backend" => {
                        if has_backend {
                            return Err(syn::Error::new(
                                input.span(),
                                "Test cannot accept more than one `Backend`",
                            ));
                        }
                        has_backend = true;
                        args.push(quote! { backend.clone() });
                        continue;
                    }
                    _ => {}
                }
            }
        }

        return Err(syn::Error::new(
            input.span(),
            "Expected one of `client_ident: Client` or `backend_ident: Backend`",
        ));
    }

    Ok(args)
}
