//! Election Lifecycle Manager.
//!
//! Elections move strictly forwards through
//! `Upcoming -> Nomination -> PreVoting -> Voting -> Completed`, and each step is
//! a conditional write on the election's status and version so that a transition
//! based on a stale read is rejected.

use chrono::Utc;
use log::info;

use crate::error::{Error, Result};
use crate::gateway::Gateway;
use crate::model::{
    api::election::ElectionSpec,
    common::{audit::ActionType, election::ElectionStatus},
    db::{account::Account, election::Election, logs::SystemAuditLog},
    mongodb::Id,
};
use crate::store::VotingDb;

use super::record_audit;

/// Create a new `Upcoming` election.
pub async fn create(db: &VotingDb, actor: &Account, spec: ElectionSpec) -> Result<Election> {
    spec.validate(Utc::now())?;
    if db.election_by_name(spec.name.trim()).await?.is_some() {
        return Err(Error::Validation(format!(
            "An election named {} already exists",
            spec.name.trim()
        )));
    }
    if let Some(active) = db.active_election().await? {
        return Err(Error::Conflict(format!(
            "Election {} has not completed yet",
            active.name
        )));
    }

    let election = spec.into_election();
    db.insert_election(election.clone()).await?;
    info!("Election {} ({}) created", election.name, election.id);

    record_audit(
        db,
        SystemAuditLog::new(actor.id, actor.username.clone(), ActionType::ElectionCreated)
            .election(election.id, election.name.clone())
            .details(format!(
                "Nomination {} to {}, voting {} to {}",
                election.nomination_start,
                election.nomination_end,
                election.voting_start,
                election.voting_end
            )),
    )
    .await;
    Ok(election)
}

fn action_for(target: ElectionStatus) -> Option<ActionType> {
    match target {
        ElectionStatus::Upcoming => None,
        ElectionStatus::Nomination => Some(ActionType::NominationStarted),
        ElectionStatus::PreVoting => Some(ActionType::PreVotingStarted),
        ElectionStatus::Voting => Some(ActionType::VotingStarted),
        ElectionStatus::Completed => Some(ActionType::ElectionCompleted),
    }
}

/// Move an election into `target`, which must directly follow its current phase.
pub async fn advance(
    db: &VotingDb,
    actor: &Account,
    election_id: Id,
    target: ElectionStatus,
) -> Result<Election> {
    let (expected, action) = match (target.predecessor(), action_for(target)) {
        (Some(expected), Some(action)) => (expected, action),
        _ => {
            return Err(Error::Conflict(format!(
                "InvalidTransition: no election can move into {}",
                target.name()
            )))
        }
    };

    let election = db
        .election_by_id(election_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Election with ID '{election_id}'")))?;
    if election.status != expected {
        return Err(Error::Conflict(format!(
            "InvalidTransition: election is {}, not {}",
            election.status.name(),
            expected.name()
        )));
    }

    let advanced = db
        .transition_election(&election, target)
        .await?
        .ok_or_else(|| {
            Error::Conflict("InvalidTransition: election changed concurrently".to_string())
        })?;
    info!(
        "Election {} moved from {} to {}",
        advanced.id,
        expected.name(),
        target.name()
    );

    record_audit(
        db,
        SystemAuditLog::new(actor.id, actor.username.clone(), action)
            .election(advanced.id, advanced.name.clone())
            .details(format!("{} -> {}", expected.name(), target.name())),
    )
    .await;
    Ok(advanced)
}

pub async fn start_nomination(db: &VotingDb, actor: &Account, election_id: Id) -> Result<Election> {
    advance(db, actor, election_id, ElectionStatus::Nomination).await
}

pub async fn start_pre_voting(db: &VotingDb, actor: &Account, election_id: Id) -> Result<Election> {
    advance(db, actor, election_id, ElectionStatus::PreVoting).await
}

pub async fn start_voting(db: &VotingDb, actor: &Account, election_id: Id) -> Result<Election> {
    advance(db, actor, election_id, ElectionStatus::Voting).await
}

pub async fn complete(db: &VotingDb, actor: &Account, election_id: Id) -> Result<Election> {
    advance(db, actor, election_id, ElectionStatus::Completed).await
}

/// Clear every voter's `voted` flag at the Registry so the next cycle can start.
/// Refused while an election is taking votes.
pub async fn reset_vote_status(db: &VotingDb, gateway: &Gateway, actor: &Account) -> Result<u64> {
    if let Some(active) = db.active_election().await? {
        if active.status == ElectionStatus::Voting {
            return Err(Error::Conflict(format!(
                "Election {} is still taking votes",
                active.name
            )));
        }
    }

    let reset = gateway.reset_all_voted().await?;
    info!("Vote status reset for {reset} voters");
    record_audit(
        db,
        SystemAuditLog::new(actor.id, actor.username.clone(), ActionType::VoteStatusReset)
            .details(format!("Cleared the voted flag on {reset} voter records")),
    )
    .await;
    Ok(reset)
}
