use std::marker::PhantomData;

use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation};
use rocket::{
    http::{Cookie, SameSite, Status},
    outcome::{try_outcome, IntoOutcome},
    request::{FromRequest, Outcome},
    time::Duration,
    Request, State,
};
use serde::{Deserialize, Serialize};

use crate::config::VotingConfig;
use crate::error::{Error, Result};
use crate::model::{common::role::Role, db::account::Account, mongodb::Id};
use crate::store::VotingDb;

use super::user::User;

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

/// An authentication token representing a specific account with a specific role.
#[derive(Serialize, Deserialize)]
pub struct AuthToken<U> {
    pub id: Id,
    #[serde(rename = "rol")]
    pub role: Role,
    #[serde(skip)]
    phantom: PhantomData<U>,
}

impl<U> AuthToken<U> {
    /// Create a new [`AuthToken`] for the given account, carrying its role.
    pub fn for_account(account: &Account) -> Self {
        Self {
            id: account.id,
            role: account.role,
            phantom: PhantomData,
        }
    }

    /// Does this token permit the given role?
    pub fn permits(&self, target: Role) -> bool {
        self.role == target
    }

    /// Serialize this token into a cookie.
    pub fn into_cookie(self, config: &VotingConfig) -> Result<Cookie<'static>> {
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
            .max_age(Duration::seconds(config.auth_ttl().num_seconds()))
            .http_only(true)
            .same_site(SameSite::Strict)
            .build())
    }

    /// Deserialize a token from a cookie value.
    pub fn from_cookie_value(value: &str, config: &VotingConfig) -> Result<Self> {
        let token = jsonwebtoken::decode(
            value,
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

    /// Get an [`AuthToken`] from the cookie and verify that it has the correct role for this user
    /// type.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let config = try_outcome!(req
            .guard::<&State<VotingConfig>>()
            .await
            .map_error(|(status, _)| (status, Error::Failure("Config not managed".to_string()))));

        // Forward to any routes that do not require an authentication token.
        let cookie = try_outcome!(req
            .cookies()
            .get(AUTH_TOKEN_COOKIE)
            .or_forward(Status::Unauthorized));

        // Decode the token.
        let token: Self = try_outcome!(
            Self::from_cookie_value(cookie.value(), config).or_forward(Status::Unauthorized)
        );

        // Check it represents the correct role.
        if !token.permits(U::ROLE) {
            return Outcome::Forward(Status::Forbidden);
        }

        // Check the account actually still exists.
        let db = match req.rocket().state::<VotingDb>() {
            Some(db) => db,
            None => {
                return Outcome::Error((
                    Status::InternalServerError,
                    Error::Failure("Voting store not managed".to_string()),
                ))
            }
        };
        match db.account_by_id(token.id).await {
            Ok(Some(account)) if account.role == token.role => Outcome::Success(token),
            Ok(_) => Outcome::Forward(Status::Unauthorized),
            Err(e) => Outcome::Error((Status::InternalServerError, e)),
        }
    }
}
