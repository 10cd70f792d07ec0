use chrono::Utc;
use log::info;

use crate::error::{Error, Result};
use crate::gateway::Gateway;
use crate::model::{
    api::candidate::NominationRequest,
    common::{audit::ActionType, election::ElectionStatus},
    db::{account::Account, candidate::CandidateProfile, logs::SystemAuditLog},
    mongodb::Id,
};
use crate::store::VotingDb;

use super::record_audit;

/// Nominate a registered candidate for an election in its nomination phase.
///
/// The Registry re-checks the nomination token and eligibility every time, so a
/// revoked token or a withdrawn eligibility stops later nominations.
pub async fn nominate(
    db: &VotingDb,
    gateway: &Gateway,
    hmac_secret: &[u8],
    candidate: &Account,
    election_id: Id,
    request: NominationRequest,
) -> Result<CandidateProfile> {
    request.validate()?;
    let election = db
        .election_by_id(election_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Election with ID '{election_id}'")))?;
    if election.status != ElectionStatus::Nomination {
        return Err(Error::Conflict(format!(
            "Election {} is not accepting nominations",
            election.name
        )));
    }

    let citizen = candidate.citizen_profile()?;
    if citizen.national_id_hmac != request.national_id.to_hmac(hmac_secret) {
        return Err(Error::Forbidden(
            "The national ID does not belong to this account".to_string(),
        ));
    }
    let summary = gateway
        .verify_candidate(&request.national_id, &request.nomination_token)
        .await?;
    if !summary.eligible {
        return Err(Error::Unauthorized("NotEligible".to_string()));
    }
    if !summary.is_registered {
        return Err(Error::Conflict("NotRegistered".to_string()));
    }

    let profile = CandidateProfile {
        id: Id::new(),
        user_id: candidate.id,
        election_id: election.id,
        full_name: citizen.full_name.clone(),
        governorate: citizen.governorate,
        goals: request.goals.trim().to_string(),
        nomination_reasons: request.nomination_reasons.trim().to_string(),
        photo_url: request.photo_url.filter(|url| !url.trim().is_empty()),
        created_at: Utc::now(),
    };
    db.insert_profile(profile.clone()).await?;
    info!(
        "Candidate profile {} created in election {}",
        profile.id, election.id
    );

    record_audit(
        db,
        SystemAuditLog::new(
            candidate.id,
            candidate.username.clone(),
            ActionType::CandidateNominated,
        )
        .election(election.id, election.name.clone())
        .candidate_profile(profile.id),
    )
    .await;
    Ok(profile)
}
