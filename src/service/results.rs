use std::cmp::Reverse;

use crate::error::{Error, Result};
use crate::model::{
    api::results::{CandidateTotal, ElectionResults, GovernorateTurnout, Reconciliation},
    common::{election::ElectionStatus, governorate::Governorate},
    db::election::Election,
    mongodb::Id,
};
use crate::store::VotingDb;

async fn load(db: &VotingDb, election_id: Id) -> Result<Election> {
    db.election_by_id(election_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Election with ID '{election_id}'")))
}

/// Totals of a completed election.
pub async fn results(db: &VotingDb, election_id: Id) -> Result<ElectionResults> {
    let election = load(db, election_id).await?;
    if election.status != ElectionStatus::Completed {
        return Err(Error::Conflict(format!(
            "Results of {} are published once it has completed",
            election.name
        )));
    }

    let tally = db.tally(election.id).await?;
    let mut candidates: Vec<_> = db
        .profiles_for_election(election.id)
        .await?
        .into_iter()
        .map(|profile| CandidateTotal {
            votes: tally.choices.get(&profile.id).copied().unwrap_or(0),
            candidate_profile_id: profile.id.into(),
            full_name: profile.full_name,
            governorate: profile.governorate,
        })
        .collect();
    candidates.sort_by(|a, b| {
        (Reverse(a.votes), &a.full_name).cmp(&(Reverse(b.votes), &b.full_name))
    });

    let turnout = Governorate::ALL
        .iter()
        .filter_map(|&governorate| {
            let ballots = tally.turnout.get(&governorate).copied()?;
            Some(GovernorateTurnout {
                governorate,
                governorate_name: governorate.name().to_string(),
                ballots,
            })
        })
        .collect();

    Ok(ElectionResults {
        election_id: election.id.into(),
        election_name: election.election.name,
        total_ballots: tally.ballots,
        candidates,
        turnout,
    })
}

/// Ballots committed versus casts that failed after the Registry flag flipped.
pub async fn reconciliation(db: &VotingDb, election_id: Id) -> Result<Reconciliation> {
    let election = load(db, election_id).await?;
    let tally = db.tally(election.id).await?;
    let failed_commits = db.count_failed_logs(election.id).await?;
    let pending_casts = db.count_cast_intents(election.id).await?;
    Ok(Reconciliation {
        election_id: election.id.into(),
        ballots: tally.ballots,
        failed_commits,
        pending_casts,
    })
}
