use rocket::{serde::json::Json, Route, State};

use crate::{
    backend::Backend,
    error::Result,
    model::{
        admin::Admin,
        auth::AuthToken,
        voter::{RegisteredVoter, Voter, VoterProfile, VoterRegistration},
    },
};

use super::auth::current_voter;

pub fn routes() -> Vec<Route> {
    routes![register, me]
}

#[post("/api/voters/register", data = "<registration>", format = "json")]
async fn register(
    token: AuthToken<Admin>,
    registration: Json<VoterRegistration>,
    backend: &State<Backend>,
) -> Result<Json<RegisteredVoter>> {
    Ok(Json(backend.register_voter(registration.0, &token.id).await?))
}

#[get("/api/voters/me")]
async fn me(token: AuthToken<Voter>, backend: &State<Backend>) -> Result<Json<VoterProfile>> {
    let voter = current_voter(&token, backend).await?;
    let has_voted = backend.guard.has_voted(&voter.voter_id).await?;
    Ok(Json(voter.profile(has_voted)))
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::serde_json::json,
    };

    use crate::error::ErrorBody;

    use super::*;

    #[backend_test(admin)]
    async fn register_voter_valid(client: Client, backend: Backend) {
        let response = client
            .post("/api/voters/register")
            .header(ContentType::JSON)
            .body(json!(VoterRegistration::example()).to_string())
            .dispatch()
            .await;

        assert_eq!(Status::Ok, response.status());
        let registered = response.into_json::<RegisteredVoter>().await.unwrap();
        assert_eq!(registered.voter_id.len(), 20);
        assert_eq!(registered.full_name, "Priya Raman");

        let voter = backend
            .registry
            .find_voter(&registered.voter_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(voter.registered_by, "admin-001");
        assert!(!backend.contract.query_voter(&registered.voter_id).await.unwrap().voted);
    }

    #[backend_test(admin)]
    async fn register_voter_twice(client: Client) {
        let mut statuses = Vec::new();
        for _ in 0..2 {
            let response = client
                .post("/api/voters/register")
                .header(ContentType::JSON)
                .body(json!(VoterRegistration::example()).to_string())
                .dispatch()
                .await;
            statuses.push(response.status());
        }
        assert_eq!(statuses, vec![Status::Ok, Status::Conflict]);

        // Same national id, different everything else.
        let mut again = VoterRegistration::example2();
        again.national_id = VoterRegistration::example().national_id;
        let response = client
            .post("/api/voters/register")
            .header(ContentType::JSON)
            .body(json!(again).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Conflict, response.status());
        let body = response.into_json::<ErrorBody>().await.unwrap();
        assert_eq!(body.error, "AlreadyExists");
    }

    #[backend_test(admin)]
    async fn register_voter_without_image(client: Client) {
        let mut registration = VoterRegistration::example();
        registration.image = "not base64!".to_string();
        let response = client
            .post("/api/voters/register")
            .header(ContentType::JSON)
            .body(json!(registration).to_string())
            .dispatch()
            .await;

        assert_eq!(Status::BadRequest, response.status());
    }

    #[backend_test]
    async fn register_voter_requires_admin(client: Client) {
        let response = client
            .post("/api/voters/register")
            .header(ContentType::JSON)
            .body(json!(VoterRegistration::example()).to_string())
            .dispatch()
            .await;

        assert_eq!(Status::Unauthorized, response.status());
    }

    #[backend_test(voter)]
    async fn voter_sees_own_profile(client: Client) {
        let response = client.get("/api/voters/me").dispatch().await;

        assert_eq!(Status::Ok, response.status());
        let profile = response.into_json::<VoterProfile>().await.unwrap();
        assert_eq!(profile.full_name, "Priya Raman");
        assert!(!profile.face_verified);
        assert!(!profile.has_voted);
    }

    #[backend_test(admin)]
    async fn admins_have_no_voter_profile(client: Client) {
        let response = client.get("/api/voters/me").dispatch().await;

        assert_eq!(Status::Forbidden, response.status());
    }
}
