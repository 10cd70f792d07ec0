use rocket::{serde::json::Json, Route};

use crate::error::{Error, Result};
use crate::model::{
    api::{
        candidate::CandidateDescription,
        election::ElectionDescription,
        logs::PublicVoteLogDescription,
        pagination::{Paginated, PaginationRequest},
        results::ElectionResults,
    },
    common::governorate::Governorate,
    db::election::Election,
    mongodb::Id,
};
use crate::service::results;
use crate::store::VotingDb;

pub fn routes() -> Vec<Route> {
    routes![
        elections,
        current_election,
        election,
        candidates,
        candidate,
        vote_logs,
        vote_log,
        election_results,
    ]
}

async fn load_election(db: &VotingDb, election_id: Id) -> Result<Election> {
    db.election_by_id(election_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Election with ID '{election_id}'")))
}

#[get("/elections")]
pub async fn elections(db: VotingDb) -> Result<Json<Vec<ElectionDescription>>> {
    let elections = db.elections().await?;
    Ok(Json(elections.into_iter().map(Into::into).collect()))
}

#[get("/elections/current")]
pub async fn current_election(db: VotingDb) -> Result<Json<ElectionDescription>> {
    let election = db
        .active_election()
        .await?
        .ok_or_else(|| Error::not_found("Active election"))?;
    Ok(Json(election.into()))
}

#[get("/elections/<election_id>")]
pub async fn election(election_id: Id, db: VotingDb) -> Result<Json<ElectionDescription>> {
    Ok(Json(load_election(&db, election_id).await?.into()))
}

#[get("/elections/<election_id>/candidates?<governorate>&<pagination..>")]
pub async fn candidates(
    election_id: Id,
    governorate: Option<Governorate>,
    pagination: PaginationRequest,
    db: VotingDb,
) -> Result<Json<Paginated<CandidateDescription>>> {
    pagination.validate()?;
    let election = load_election(&db, election_id).await?;
    let (profiles, total) = db
        .profiles_page(
            election.id,
            governorate,
            pagination.skip(),
            pagination.limit(),
        )
        .await?;
    let profiles = profiles.into_iter().map(Into::into).collect();
    Ok(Json(pagination.to_paginated(total, profiles)?))
}

#[get("/elections/<election_id>/candidates/<profile_id>")]
pub async fn candidate(
    election_id: Id,
    profile_id: Id,
    db: VotingDb,
) -> Result<Json<CandidateDescription>> {
    let profile = db
        .profile_by_id(profile_id)
        .await?
        .filter(|profile| profile.election_id == election_id)
        .ok_or_else(|| Error::not_found(format!("Candidate with ID '{profile_id}'")))?;
    Ok(Json(profile.into()))
}

#[get("/elections/<election_id>/vote-logs?<pagination..>")]
pub async fn vote_logs(
    election_id: Id,
    pagination: PaginationRequest,
    db: VotingDb,
) -> Result<Json<Paginated<PublicVoteLogDescription>>> {
    pagination.validate()?;
    let election = load_election(&db, election_id).await?;
    let (logs, total) = db
        .public_logs_page(election.id, pagination.skip(), pagination.limit())
        .await?;
    let logs = logs.into_iter().map(Into::into).collect();
    Ok(Json(pagination.to_paginated(total, logs)?))
}

#[get("/elections/<election_id>/vote-logs/<vote_id>")]
pub async fn vote_log(
    election_id: Id,
    vote_id: Id,
    db: VotingDb,
) -> Result<Json<PublicVoteLogDescription>> {
    let log = db
        .public_log(election_id, vote_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Vote with ID '{vote_id}'")))?;
    Ok(Json(log.into()))
}

#[get("/elections/<election_id>/results")]
pub async fn election_results(election_id: Id, db: VotingDb) -> Result<Json<ElectionResults>> {
    Ok(Json(results::results(&db, election_id).await?))
}
