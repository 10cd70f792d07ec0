use rocket::{http::Status, serde::json::Json, Route, State};

use crate::config::VotingConfig;
use crate::error::Result;
use crate::gateway::Gateway;
use crate::model::{
    api::{
        ballot::{CastVoteRequest, VoteReceipt},
        candidate::{CandidateDescription, NominationRequest},
        AuthToken, Candidate, Voter,
    },
    mongodb::Id,
};
use crate::service::{casting, nomination};
use crate::store::VotingDb;

use super::account_for;

pub fn routes() -> Vec<Route> {
    routes![nominate, cast_vote]
}

#[post("/elections/<election_id>/candidates", data = "<request>", format = "json")]
pub async fn nominate(
    token: AuthToken<Candidate>,
    election_id: Id,
    request: Json<NominationRequest>,
    db: VotingDb,
    gateway: Gateway,
    config: &State<VotingConfig>,
) -> Result<(Status, Json<CandidateDescription>)> {
    let candidate = account_for(&db, &token).await?;
    let profile = nomination::nominate(
        &db,
        &gateway,
        config.hmac_secret(),
        &candidate,
        election_id,
        request.into_inner(),
    )
    .await?;
    Ok((Status::Created, Json(profile.into())))
}

#[post("/elections/<election_id>/vote", data = "<ballot>", format = "json")]
pub async fn cast_vote(
    token: AuthToken<Voter>,
    election_id: Id,
    ballot: Json<CastVoteRequest>,
    db: VotingDb,
    gateway: Gateway,
    config: &State<VotingConfig>,
) -> Result<(Status, Json<VoteReceipt>)> {
    let voter = account_for(&db, &token).await?;
    let receipt = casting::cast_vote(
        &db,
        &gateway,
        config.hmac_secret(),
        &voter,
        election_id,
        ballot.into_inner(),
    )
    .await?;
    Ok((Status::Created, Json(receipt)))
}
