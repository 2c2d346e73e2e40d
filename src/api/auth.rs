use chrono::Utc;
use log::info;
use mongodb::bson::DateTime as BsonDateTime;
use rocket::{
    http::{CookieJar, Status},
    serde::json::Json,
    Route, State,
};

use crate::{
    backend::Backend,
    config::Config,
    error::{Error, Result},
    model::{
        admin::{Admin, AdminLogin, AdminProfile},
        auth::{AuthToken, AUTH_TOKEN_COOKIE},
        password::verify_password,
        voter::{Voter, VoterLogin, VoterProfile},
    },
};

pub fn routes() -> Vec<Route> {
    routes![admin_login, voter_login, logout]
}

fn invalid_credentials() -> Error {
    Error::Unauthorized("Invalid credentials".to_string())
}

#[post("/api/admin/login", data = "<credentials>", format = "json")]
pub async fn admin_login(
    cookies: &CookieJar<'_>,
    credentials: Json<AdminLogin>,
    backend: &State<Backend>,
    config: &State<Config>,
) -> Result<Json<AdminProfile>> {
    let admin = match (&credentials.admin_id, &credentials.email) {
        (Some(admin_id), _) => backend.registry.find_admin(admin_id.trim()).await?,
        (None, Some(email)) => {
            backend
                .registry
                .find_admin_by_email(&email.trim().to_lowercase())
                .await?
        }
        (None, None) => {
            return Err(Error::Validation("adminId or email is required".to_string()))
        }
    };
    let mut admin = admin
        .filter(|admin| admin.verify_password(&credentials.password))
        .ok_or_else(invalid_credentials)?;

    let now = Utc::now();
    backend.registry.touch_admin_login(&admin.admin_id, now).await?;
    admin.last_login_at = Some(BsonDateTime::from_chrono(now));

    cookies.add(AuthToken::new(&admin).into_cookie(config)?);
    info!("Admin {} logged in", admin.admin_id);
    Ok(Json(admin.profile()))
}

#[post("/api/voters/login", data = "<credentials>", format = "json")]
pub async fn voter_login(
    cookies: &CookieJar<'_>,
    credentials: Json<VoterLogin>,
    backend: &State<Backend>,
    config: &State<Config>,
) -> Result<Json<VoterProfile>> {
    let identifier = credentials.identifier.trim();
    if identifier.is_empty() {
        return Err(Error::Validation("identifier is required".to_string()));
    }

    // The identifier is either the voter id or the national id.
    let voter = match backend.registry.find_voter(identifier).await? {
        Some(voter) => Some(voter),
        None => {
            let national_id_hmac = backend.national_id_hmac(identifier)?;
            backend
                .registry
                .find_voter_by_national_id(&national_id_hmac)
                .await?
        }
    };
    let voter: Voter = voter
        .filter(|voter| verify_password(&voter.password_hash, &credentials.password))
        .ok_or_else(invalid_credentials)?;

    cookies.add(AuthToken::new(&voter).into_cookie(config)?);
    let has_voted = backend.guard.has_voted(&voter.voter_id).await?;
    info!("Voter {} logged in", voter.voter_id);
    Ok(Json(voter.profile(has_voted)))
}

#[post("/api/auth/logout")]
pub fn logout(cookies: &CookieJar<'_>) -> Status {
    cookies.remove(AUTH_TOKEN_COOKIE);
    Status::Ok
}

/// The admin behind a token, which may have been removed since it was issued.
pub(crate) async fn current_admin(token: &AuthToken<Admin>, backend: &Backend) -> Result<Admin> {
    backend
        .registry
        .find_admin(&token.id)
        .await?
        .ok_or_else(|| Error::Unauthorized(format!("Admin {} no longer exists", token.id)))
}

/// The voter behind a token.
pub(crate) async fn current_voter(token: &AuthToken<Voter>, backend: &Backend) -> Result<Voter> {
    backend
        .registry
        .find_voter(&token.id)
        .await?
        .ok_or_else(|| Error::Unauthorized(format!("Voter {} no longer exists", token.id)))
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::ContentType,
        local::asynchronous::Client,
        serde::json::serde_json::json,
    };

    use crate::model::voter::VoterRegistration;

    use super::*;

    #[backend_test]
    async fn admin_login_by_email(client: Client) {
        let response = client
            .post("/api/admin/login")
            .header(ContentType::JSON)
            .body(json!(AdminLogin::example()).to_string())
            .dispatch()
            .await;

        assert_eq!(Status::Ok, response.status());
        assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_some());
        let profile = response.into_json::<AdminProfile>().await.unwrap();
        assert_eq!(profile.admin_id, "admin-001");
        assert!(profile.last_login_at.is_some());
    }

    #[backend_test]
    async fn admin_login_by_id(client: Client, backend: Backend) {
        let response = client
            .post("/api/admin/login")
            .header(ContentType::JSON)
            .body(json!(AdminLogin::example_by_id()).to_string())
            .dispatch()
            .await;

        assert_eq!(Status::Ok, response.status());
        let admin = backend.registry.find_admin("admin-002").await.unwrap().unwrap();
        assert!(admin.last_login_at.is_some());
    }

    #[backend_test]
    async fn admin_login_invalid(client: Client) {
        // No identifier at all.
        let response = client
            .post("/api/admin/login")
            .header(ContentType::JSON)
            .body(json!(AdminLogin::empty()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());

        // Wrong password.
        let response = client
            .post("/api/admin/login")
            .header(ContentType::JSON)
            .body(json!({ "email": "alpha@evote.local", "password": "wrong" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());
        assert_eq!(None, client.cookies().get(AUTH_TOKEN_COOKIE));

        // Unknown admin.
        let response = client
            .post("/api/admin/login")
            .header(ContentType::JSON)
            .body(json!({ "adminId": "admin-404", "password": "AlphaSecure#2025" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());
    }

    #[backend_test]
    async fn voter_login_by_either_id(client: Client, backend: Backend) {
        let registration = VoterRegistration::example();
        let registered = backend
            .register_voter(registration.clone(), "admin-001")
            .await
            .unwrap();

        for identifier in [registered.voter_id.clone(), registration.national_id.clone()] {
            let response = client
                .post("/api/voters/login")
                .header(ContentType::JSON)
                .body(json!({ "identifier": identifier, "password": registration.password }).to_string())
                .dispatch()
                .await;
            assert_eq!(Status::Ok, response.status());
            let profile = response.into_json::<VoterProfile>().await.unwrap();
            assert_eq!(profile.voter_id, registered.voter_id);
            assert!(!profile.has_voted);
        }

        let response = client
            .post("/api/voters/login")
            .header(ContentType::JSON)
            .body(json!({ "identifier": registered.voter_id, "password": "wrong" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());
    }

    #[backend_test(admin)]
    async fn logout_admin(client: Client) {
        assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_some());
        let response = client.post("/api/auth/logout").dispatch().await;

        assert_eq!(Status::Ok, response.status());
        assert_eq!(None, client.cookies().get(AUTH_TOKEN_COOKIE));
    }

    #[backend_test(voter)]
    async fn logout_voter(client: Client) {
        let response = client.post("/api/auth/logout").dispatch().await;

        assert_eq!(Status::Ok, response.status());
        assert_eq!(None, client.cookies().get(AUTH_TOKEN_COOKIE));
        let response = client.get("/api/voters/me").dispatch().await;
        assert_eq!(Status::Unauthorized, response.status());
    }

    #[backend_test]
    async fn logout_not_logged_in(client: Client) {
        let response = client.post("/api/auth/logout").dispatch().await;

        assert_eq!(Status::Ok, response.status());
    }
}
