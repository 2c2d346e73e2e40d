use rocket::{serde::json::Json, Route, State};

use crate::{
    backend::Backend,
    error::Result,
    ledger::LedgerCandidate,
    model::{
        admin::{Admin, AdminProfile},
        auth::AuthToken,
        candidate::Candidate,
    },
    reconcile::ReconciliationReport,
};

use super::auth::current_admin;

pub fn routes() -> Vec<Route> {
    routes![me, create_candidate, reconcile]
}

#[get("/api/admin/me")]
async fn me(token: AuthToken<Admin>, backend: &State<Backend>) -> Result<Json<AdminProfile>> {
    let admin = current_admin(&token, backend).await?;
    Ok(Json(admin.profile()))
}

#[post("/api/admin/candidates", data = "<candidate>", format = "json")]
async fn create_candidate(
    _token: AuthToken<Admin>,
    candidate: Json<Candidate>,
    backend: &State<Backend>,
) -> Result<Json<LedgerCandidate>> {
    Ok(Json(backend.register_candidate(candidate.0).await?))
}

#[get("/api/admin/reconcile")]
async fn reconcile(
    _token: AuthToken<Admin>,
    backend: &State<Backend>,
) -> Result<Json<ReconciliationReport>> {
    Ok(Json(backend.reconcile().await?))
}
