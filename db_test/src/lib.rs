use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned, FnArg, ItemFn, Pat, Signature, Type};

/// Environment variable holding the MongoDB URI tests connect to.
const DB_URI_VAR: &str = "EVOTE_TEST_DB_URI";

#[proc_macro_attribute]
/// Run an async test against a fresh MongoDB database, injecting a
/// [`mongodb::Client`] and/or [`mongodb::Database`].
///
/// The database gets a unique name and the crate's indexes, and is dropped
/// WHETHER OR NOT the test passes; a panic is "rethrown" after cleanup.
///
/// Ledger commits use multi-document transactions, so the server must be a
/// replica set. Tests are `#[ignore]`d and run with
/// `EVOTE_TEST_DB_URI=mongodb://... cargo test -- --ignored`.
pub fn db_test(_: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);
    let test_args = match check_sig(item_fn.sig.clone()) {
        Ok(args) => args,
        Err(err) => return err.into_compile_error().into(),
    };

    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_test", name);
    item_fn.sig.ident = new_name.clone();

    quote! {
        #[test]
        #[ignore = "needs a MongoDB replica set at EVOTE_TEST_DB_URI"]
        fn #name() {
            #item_fn

            let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .worker_threads(4)
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                let uri = std::env::var(#DB_URI_VAR)
                    .expect(concat!(#DB_URI_VAR, " must be set for database tests"));
                let db_client = mongodb::Client::with_uri_str(&uri).await.unwrap();
                let db = db_client.database(&format!("evote_test_{:016x}", rand::random::<u64>()));
                crate::model::mongodb::ensure_indexes_exist(&db).await.unwrap();

                let result = rocket::futures::FutureExt::catch_unwind(
                    std::panic::AssertUnwindSafe(#new_name(#(#test_args),*)),
                )
                .await;

                db.drop(None).await.unwrap();

                if let Err(cause) = result {
                    std::panic::resume_unwind(cause);
                }
            });
        }
    }
    .into()
}

/// Ensure the wrapped test is async and only asks for `Client` and `Database`.
fn check_sig(sig: Signature) -> Result<Vec<TokenStream2>, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut args = vec![];
    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let (Pat::Ident(_), Type::Path(type_path)) = (&*pat_type.pat, &*pat_type.ty) {
                let type_ident = type_path.path.segments.last().map(|s| s.ident.to_string());
                match type_ident.as_deref() {
                    Some("Client") => {
                        args.push(quote! { db_client.clone() });
                        continue;
                    }
                    Some("Database") => {
                        args.push(quote! { db.clone() });
                        continue;
                    }
                    _ => {}
                }
            }
        }

        return Err(syn::Error::new(
            input.span(),
            "Expected `client_ident: mongodb::Client` or `db_ident: mongodb::Database`",
        ));
    }

    Ok(args)
}
