use rocket::{serde::json::Json, Route, State};

use crate::{
    backend::Backend,
    error::Result,
    ledger::{Tally, VoteReceipt},
    model::{
        admin::Admin,
        auth::AuthToken,
        candidate::Candidate,
        voter::{decode_image, BallotRequest, Voter},
    },
};

pub fn routes() -> Vec<Route> {
    routes![candidates, cast, tally]
}

/// The public roster.
#[get("/api/votes/candidates")]
async fn candidates(backend: &State<Backend>) -> Result<Json<Vec<Candidate>>> {
    Ok(Json(backend.registry.candidates().await?))
}

#[post("/api/votes/cast", data = "<ballot>", format = "json")]
async fn cast(
    token: AuthToken<Voter>,
    ballot: Json<BallotRequest>,
    backend: &State<Backend>,
) -> Result<Json<VoteReceipt>> {
    let probe = decode_image("image", &ballot.image)?;
    let receipt = backend
        .cast_vote(&token.id, &ballot.candidate_id, &probe)
        .await?;
    Ok(Json(receipt))
}

/// Live counts straight from the ledger.
#[get("/api/votes/tally")]
async fn tally(_token: AuthToken<Admin>, backend: &State<Backend>) -> Result<Json<Tally>> {
    Ok(Json(backend.contract.query_results().await?))
}

#[cfg(test)]
mod tests {
    use data_encoding::BASE64;
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::{Client, LocalResponse},
        serde::json::serde_json::json,
    };

    use crate::{
        error::ErrorBody,
        model::{candidate::default_roster, voter::VoterProfile},
    };

    use super::*;

    async fn cast_ballot(client: &Client, ballot: BallotRequest) -> LocalResponse<'_> {
        client
            .post("/api/votes/cast")
            .header(ContentType::JSON)
            .body(json!(ballot).to_string())
            .dispatch()
            .await
    }

    #[backend_test]
    async fn roster_is_public(client: Client) {
        let response = client.get("/api/votes/candidates").dispatch().await;

        assert_eq!(Status::Ok, response.status());
        let roster = response.into_json::<Vec<Candidate>>().await.unwrap();
        assert_eq!(roster, default_roster());
    }

    #[backend_test(voter)]
    async fn cast_vote_once(client: Client, backend: Backend) {
        let response = cast_ballot(&client, BallotRequest::example("C1")).await;
        assert_eq!(Status::Ok, response.status());
        let receipt = response.into_json::<VoteReceipt>().await.unwrap();
        assert_eq!(receipt.candidate_votes, 1);
        assert_eq!(receipt.aggregate_total, 1);

        let response = cast_ballot(&client, BallotRequest::example("C2")).await;
        assert_eq!(Status::Conflict, response.status());
        let body = response.into_json::<ErrorBody>().await.unwrap();
        assert_eq!(body.error, "DuplicateVote");

        let profile = client
            .get("/api/voters/me")
            .dispatch()
            .await
            .into_json::<VoterProfile>()
            .await
            .unwrap();
        assert!(profile.has_voted);
        assert!(profile.face_verified);

        let tally = backend.contract.query_results().await.unwrap();
        assert_eq!(tally.aggregate_total, 1);
        assert_eq!(tally.candidate_sum(), 1);
    }

    #[backend_test(voter)]
    async fn cast_vote_wrong_face(client: Client, backend: Backend) {
        let ballot = BallotRequest {
            candidate_id: "C1".to_string(),
            image: BASE64.encode(b"not the enrolled face"),
        };
        let response = cast_ballot(&client, ballot).await;

        assert_eq!(Status::UnprocessableEntity, response.status());
        let body = response.into_json::<ErrorBody>().await.unwrap();
        assert_eq!(body.error, "VerificationFailed");
        assert_eq!(backend.contract.query_results().await.unwrap().aggregate_total, 0);
        assert_eq!(backend.guard.count().await.unwrap().total(), 0);

        // Still free to vote with the right face.
        let response = cast_ballot(&client, BallotRequest::example("C1")).await;
        assert_eq!(Status::Ok, response.status());
    }

    #[backend_test(voter)]
    async fn cast_vote_unknown_candidate(client: Client) {
        let response = cast_ballot(&client, BallotRequest::example("C404")).await;

        assert_eq!(Status::NotFound, response.status());
        let body = response.into_json::<ErrorBody>().await.unwrap();
        assert_eq!(body.error, "NotFound");
    }

    #[backend_test(admin)]
    async fn admins_cannot_vote(client: Client) {
        let response = cast_ballot(&client, BallotRequest::example("C1")).await;

        assert_eq!(Status::Forbidden, response.status());
    }

    #[backend_test]
    async fn voting_requires_login(client: Client) {
        let response = cast_ballot(&client, BallotRequest::example("C1")).await;

        assert_eq!(Status::Unauthorized, response.status());
    }

    #[backend_test(admin)]
    async fn admin_sees_live_tally(client: Client, backend: Backend) {
        backend.contract.cast_vote(None, "C3").await.unwrap();

        let response = client.get("/api/votes/tally").dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let tally = response.into_json::<Tally>().await.unwrap();
        assert_eq!(tally.aggregate_total, 1);
        let votes: Vec<(String, u64)> = tally
            .candidates
            .into_iter()
            .map(|c| (c.candidate_id, c.votes))
            .collect();
        assert_eq!(
            votes,
            vec![
                ("C1".to_string(), 0),
                ("C2".to_string(), 0),
                ("C3".to_string(), 1)
            ]
        );
    }

    #[backend_test(voter)]
    async fn voters_cannot_see_live_tally(client: Client) {
        let response = client.get("/api/votes/tally").dispatch().await;

        assert_eq!(Status::Forbidden, response.status());
    }
}
