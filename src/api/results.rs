use rocket::{serde::json::Json, Route, State};

use crate::{
    backend::Backend,
    error::Result,
    model::{admin::Admin, auth::AuthToken, results::ResultView, voter::Voter},
};

pub fn routes() -> Vec<Route> {
    routes![admin_results, voter_results, finalize]
}

#[get("/api/results", rank = 1)]
async fn admin_results(
    _token: AuthToken<Admin>,
    backend: &State<Backend>,
) -> Result<Json<ResultView>> {
    Ok(Json(backend.finalizer.results().await?))
}

#[get("/api/results", rank = 2)]
async fn voter_results(
    _token: AuthToken<Voter>,
    backend: &State<Backend>,
) -> Result<Json<ResultView>> {
    Ok(Json(backend.finalizer.results().await?))
}

/// Publish the current ledger tally, replacing any earlier publication.
#[post("/api/results/finalize")]
async fn finalize(
    token: AuthToken<Admin>,
    backend: &State<Backend>,
) -> Result<Json<ResultView>> {
    let snapshot = backend.finalizer.finalize(Some(token.rights)).await?;
    Ok(Json(Some(snapshot).into()))
}
