use rocket::{
    http::{Cookie, CookieJar, Status},
    serde::json::Json,
    Route, State,
};

use crate::config::VotingConfig;
use crate::error::Result;
use crate::gateway::Gateway;
use crate::model::api::{
    account::{
        AccountDescription, CandidateRegistrationRequest, LoginRequest, VoterRegistrationRequest,
    },
    AnyUser, AuthToken, AUTH_TOKEN_COOKIE,
};
use crate::service::registration;
use crate::store::VotingDb;

pub fn routes() -> Vec<Route> {
    routes![register_voter, register_candidate, login, logout]
}

#[post("/auth/voters/register", data = "<request>", format = "json")]
pub async fn register_voter(
    request: Json<VoterRegistrationRequest>,
    db: VotingDb,
    gateway: Gateway,
    config: &State<VotingConfig>,
) -> Result<(Status, Json<AccountDescription>)> {
    let account =
        registration::register_voter(&db, &gateway, config.hmac_secret(), request.into_inner())
            .await?;
    Ok((Status::Created, Json(AccountDescription::from(&account))))
}

#[post("/auth/candidates/register", data = "<request>", format = "json")]
pub async fn register_candidate(
    request: Json<CandidateRegistrationRequest>,
    db: VotingDb,
    gateway: Gateway,
    config: &State<VotingConfig>,
) -> Result<(Status, Json<AccountDescription>)> {
    let account = registration::register_candidate(
        &db,
        &gateway,
        config.hmac_secret(),
        request.into_inner(),
    )
    .await?;
    Ok((Status::Created, Json(AccountDescription::from(&account))))
}

#[post("/auth/login", data = "<credentials>", format = "json")]
pub async fn login(
    cookies: &CookieJar<'_>,
    credentials: Json<LoginRequest>,
    db: VotingDb,
    config: &State<VotingConfig>,
) -> Result<Json<AccountDescription>> {
    let account = registration::login(&db, &credentials).await?;
    let token = AuthToken::<AnyUser>::for_account(&account);
    cookies.add(token.into_cookie(config)?);
    Ok(Json(AccountDescription::from(&account)))
}

#[delete("/auth")]
pub fn logout(cookies: &CookieJar<'_>) -> Status {
    cookies.remove(Cookie::from(AUTH_TOKEN_COOKIE));
    Status::Ok
}
