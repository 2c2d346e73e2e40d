use std::marker::PhantomData;

use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation};
use log::debug;
use rocket::{
    http::{Cookie, SameSite, Status},
    request::{FromRequest, Outcome},
    time::Duration,
    Request,
};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Error, Result};

use super::user::{Rights, User};

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

/// An authentication token representing a specific user with specific rights.
#[derive(Serialize, Deserialize)]
pub struct AuthToken<U> {
    pub id: String,
    #[serde(rename = "rgt")]
    pub rights: Rights,
    #[serde(skip)]
    phantom: PhantomData<U>,
}

impl<U> AuthToken<U> {
    /// Does this token permit the given rights?
    pub fn permits(&self, target: Rights) -> bool {
        self.rights == target
    }
}

impl<U> AuthToken<U>
where
    U: User,
{
    /// Create a new [`AuthToken`] for the given user, with the correct rights for that user type.
    pub fn new(user: &U) -> Self {
        Self {
            id: user.id().to_string(),
            rights: U::RIGHTS,
            phantom: PhantomData,
        }
    }

    /// Serialize this token into a cookie.
    pub fn into_cookie(self, config: &Config) -> Result<Cookie<'static>> {
        let claims = Claims {
            token: self,
            expire_at: Utc::now() + config.auth_ttl(),
        };

        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )?;

        Ok(Cookie::build((AUTH_TOKEN_COOKIE, token))
            .path("/")
            .max_age(Duration::seconds(config.auth_ttl().num_seconds()))
            .http_only(true)
            .same_site(SameSite::Strict)
            .build())
    }

    /// Deserialize a token from a cookie.
    pub fn from_cookie(cookie: &Cookie<'static>, config: &Config) -> Result<Self> {
        let token = jsonwebtoken::decode(
            cookie.value(),
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|claims: TokenData<Claims<U>>| claims.claims.token)?;
        Ok(token)
    }
}

/// Cookie claims: the token itself plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims<U> {
    #[serde(flatten, bound = "")]
    token: AuthToken<U>,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

#[rocket::async_trait]
impl<'r, U> FromRequest<'r> for AuthToken<U>
where
    U: User + Send,
{
    type Error = Error;

    /// Get an AuthToken from the cookie and verify that it has the correct rights
    /// for this user type.
    ///
    /// A missing or invalid token fails with 401. A valid token for another
    /// kind of user forwards with 403, so a lower-ranked route for that kind
    /// of user can still match.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let config = match req.rocket().state::<Config>() {
            Some(config) => config,
            None => {
                return Outcome::Error((
                    Status::InternalServerError,
                    Error::Internal("Config is not managed".to_string()),
                ))
            }
        };

        let cookie = match req.cookies().get(AUTH_TOKEN_COOKIE) {
            Some(cookie) => cookie,
            None => {
                return Outcome::Error((
                    Status::Unauthorized,
                    Error::Unauthorized("Authentication required".to_string()),
                ))
            }
        };

        let token = match Self::from_cookie(cookie, config) {
            Ok(token) => token,
            Err(err) => {
                debug!("Rejected auth token: {err}");
                return Outcome::Error((Status::Unauthorized, err));
            }
        };

        if token.permits(U::RIGHTS) {
            Outcome::Success(token)
        } else {
            Outcome::Forward(Status::Forbidden)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{admin::Admin, voter::Voter};

    fn admin() -> Admin {
        Admin {
            admin_id: "admin-001".to_string(),
            name: "Alpha".to_string(),
            email: "alpha@evote.local".to_string(),
            password_hash: String::new(),
            roles: Vec::new(),
            last_login_at: None,
        }
    }

    #[test]
    fn cookie_round_trip_keeps_identity_and_rights() {
        let config = Config::example();
        let cookie = AuthToken::new(&admin()).into_cookie(&config).unwrap();
        assert_eq!(cookie.name(), AUTH_TOKEN_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));

        let token = AuthToken::<Admin>::from_cookie(&cookie, &config).unwrap();
        assert_eq!(token.id, "admin-001");
        assert!(token.permits(Rights::Admin));
        assert!(!token.permits(Rights::Voter));

        // Decoding as another user type keeps the original rights.
        let token = AuthToken::<Voter>::from_cookie(&cookie, &config).unwrap();
        assert_eq!(token.rights, Rights::Admin);
    }

    #[test]
    fn tampered_cookies_are_rejected() {
        let config = Config::example();
        let cookie = AuthToken::new(&admin()).into_cookie(&config).unwrap();
        let forged = Cookie::new(AUTH_TOKEN_COOKIE, format!("{}x", cookie.value()));
        assert!(matches!(
            AuthToken::<Admin>::from_cookie(&forged, &config),
            Err(Error::Jwt(_))
        ));
    }
}
