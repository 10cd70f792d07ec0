//! Vote Casting Core.
//!
//! The Registry's `voted` flag is flipped first with a compare-and-set, then the
//! ballot is written locally in one atomic unit: the participation marker, the
//! vote, its choices, the public log entry and the audit entry. The participation
//! marker is unique per voter and election, so at most one ballot can ever commit
//! even when an interrupted cast is resumed.
//!
//! A cast intent is stored before the flip, and only while the Registry still
//! reports the flag clear. An already-set flag is final unless such an intent
//! exists for this voter and election. A flag left over from an earlier election
//! therefore blocks voting until an administrator resets vote status.

use chrono::Utc;
use log::{error, info, warn};

use crate::error::{Error, Result};
use crate::gateway::Gateway;
use crate::model::{
    api::ballot::{CastVoteRequest, VoteReceipt},
    common::{
        audit::ActionType,
        citizen::age_on,
        election::{ElectionStatus, CHOICES_PER_BALLOT},
    },
    db::{
        account::Account,
        logs::{PublicVoteLog, SystemAuditLog},
        vote::{CastIntent, Participation, Vote, VoteChoice},
    },
    mongodb::Id,
};
use crate::store::{BallotCommit, VotingDb};

const ALREADY_VOTED: &str = "AlreadyVoted";

fn already_voted() -> Error {
    Error::Conflict(ALREADY_VOTED.to_string())
}

pub async fn cast_vote(
    db: &VotingDb,
    gateway: &Gateway,
    hmac_secret: &[u8],
    voter: &Account,
    election_id: Id,
    request: CastVoteRequest,
) -> Result<VoteReceipt> {
    // 1. The election must be taking votes.
    let election = db
        .election_by_id(election_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("Election with ID '{election_id}'")))?;
    if election.status != ElectionStatus::Voting {
        return Err(Error::Conflict(format!(
            "Election {} is not in its voting phase",
            election.name
        )));
    }

    // 2. Five distinct candidates of this election.
    let candidate_ids = request.distinct_choices()?;
    let profiles = db.profiles_by_ids(election.id, &candidate_ids).await?;
    if profiles.len() != CHOICES_PER_BALLOT {
        return Err(Error::not_found(
            "One or more selected candidates in this election",
        ));
    }

    // 3. The account's own password, and its own national ID.
    if !voter.credentials.verify_password(&request.password)? {
        return Err(Error::Unauthorized("Invalid password".to_string()));
    }
    let citizen = voter.citizen_profile()?;
    if citizen.national_id_hmac != request.national_id.to_hmac(hmac_secret) {
        return Err(Error::Forbidden(
            "The national ID does not belong to this account".to_string(),
        ));
    }
    if db.has_participated(voter.id, election.id).await? {
        return Err(already_voted());
    }

    // 4. Fresh eligibility from the Registry.
    let summary = gateway
        .verify_voter(&request.national_id, &request.voting_token)
        .await?;
    if !summary.is_registered {
        return Err(Error::Conflict("NotRegistered".to_string()));
    }
    if summary.voted {
        if !db.has_cast_intent(voter.id, election.id).await? {
            return Err(already_voted());
        }
    } else {
        db.record_cast_intent(CastIntent::new(voter.id, election.id))
            .await?;
    }

    // 5. Exactly-once flip at the Registry.
    match gateway
        .mark_voted(&request.national_id, &request.voting_token)
        .await
    {
        Ok(()) => {}
        Err(Error::Conflict(detail)) if detail == ALREADY_VOTED => {
            if db.has_participated(voter.id, election.id).await?
                || !db.has_cast_intent(voter.id, election.id).await?
            {
                return Err(already_voted());
            }
            // An earlier attempt flipped the flag but never committed its ballot.
            warn!(
                "Resuming an interrupted ballot commit in election {}",
                election.id
            );
        }
        Err(err) => return Err(err),
    }

    // 6. One atomic local write.
    let now = Utc::now();
    let vote = Vote {
        id: Id::new(),
        election_id: election.id,
        governorate: summary.governorate,
        voter_age: age_on(summary.birth_date, now.date_naive()),
        voter_gender: summary.gender,
        timestamp: now,
    };
    let choices = profiles
        .iter()
        .map(|profile| VoteChoice {
            id: Id::new(),
            vote_id: vote.id,
            election_id: election.id,
            candidate_profile_id: profile.id,
        })
        .collect();
    let public_log = PublicVoteLog::success(
        vote.id,
        election.id,
        election.name.clone(),
        vote.governorate,
        now,
    );
    // Identifies the voter, so it must not lead back to the ballot.
    let audit_log = SystemAuditLog::new(voter.id, voter.username.clone(), ActionType::VoteCast)
        .election(election.id, election.name.clone())
        .details(format!("Ballot cast in {}", vote.governorate));
    let receipt = VoteReceipt {
        vote_id: vote.id.into(),
        election_id: election.id.into(),
        election_name: election.name.clone(),
        governorate: vote.governorate,
        governorate_name: vote.governorate.name().to_string(),
        timestamp: now,
    };
    let ballot = BallotCommit {
        participation: Participation {
            id: Id::new(),
            user_id: voter.id,
            election_id: election.id,
        },
        vote,
        choices,
        public_log,
        audit_log,
    };

    match db.commit_ballot(ballot).await {
        Ok(()) => {}
        Err(Error::Conflict(_)) => return Err(already_voted()),
        Err(err) => {
            error!(
                "Ballot commit failed in election {} after the Registry recorded the vote: {err}",
                election.id
            );
            let failure = PublicVoteLog::failure(
                election.id,
                election.name.clone(),
                summary.governorate,
                "Ballot could not be recorded".to_string(),
            );
            if let Err(log_err) = db.append_public_log(failure).await {
                error!("Failed to record the failed ballot commit: {log_err}");
            }
            return Err(err);
        }
    }

    // 7. Nothing identifying in the receipt or the log line.
    info!(
        "Vote {} recorded in election {}",
        receipt.vote_id, election.id
    );
    Ok(receipt)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rocket::tokio;

    use super::*;
    use crate::error::ErrorKind;
    use crate::gateway::LocalGateway;
    use crate::model::{
        api::{account::VoterRegistrationRequest, logs::AuditLogFilter},
        common::{
            citizen::{NationalId, Token},
            governorate::Governorate,
        },
        db::{
            candidate::CandidateProfile,
            election::Election,
            registry::{RecordKind, RegistryRecord},
        },
    };
    use crate::service::registration;
    use crate::store::{
        memory::{MemoryRegistryStore, MemoryVotingStore},
        RegistryDb, VotingStore,
    };

    const SECRET: &[u8] = b"hmac-secret";

    struct Scenario {
        store: Arc<MemoryVotingStore>,
        db: VotingDb,
        registry: RegistryDb,
        local: Arc<LocalGateway>,
        gateway: Gateway,
        election: Election,
        candidates: Vec<Id>,
        record: RegistryRecord,
        voter: Account,
    }

    impl Scenario {
        /// A registered voter and an election in its voting phase with ten
        /// candidates in Giza.
        async fn new() -> Self {
            let store = Arc::new(MemoryVotingStore::new());
            let db = VotingDb::from_arc(store.clone() as Arc<dyn VotingStore>);
            let registry = RegistryDb::new(MemoryRegistryStore::new());
            let local = Arc::new(LocalGateway::new(registry.clone()));
            let gateway = Gateway::from_arc(local.clone());

            let record = RegistryRecord::example();
            registry
                .insert_record(RecordKind::Voter, record.clone())
                .await
                .unwrap();
            let voter = registration::register_voter(
                &db,
                &gateway,
                SECRET,
                VoterRegistrationRequest {
                    national_id: record.national_id.clone(),
                    voting_token: record.token.clone(),
                    username: "alice".to_string(),
                    password: "voter-password".to_string(),
                },
            )
            .await
            .unwrap();

            let election = Election::example_in(ElectionStatus::Voting);
            db.insert_election(election.clone()).await.unwrap();
            let mut candidates = Vec::new();
            for n in 0..10 {
                let profile = CandidateProfile::example(election.id, Governorate::Giza, n);
                candidates.push(profile.id);
                db.insert_profile(profile).await.unwrap();
            }

            Self {
                store,
                db,
                registry,
                local,
                gateway,
                election,
                candidates,
                record,
                voter,
            }
        }

        fn request(&self) -> CastVoteRequest {
            CastVoteRequest::example(
                &self.candidates[..5],
                self.record.national_id.clone(),
                self.record.token.clone(),
            )
        }

        async fn cast(&self, request: CastVoteRequest) -> Result<VoteReceipt> {
            cast_vote(
                &self.db,
                &self.gateway,
                SECRET,
                &self.voter,
                self.election.id,
                request,
            )
            .await
        }

        async fn registry_voted(&self) -> bool {
            self.registry
                .record(RecordKind::Voter, &self.record.national_id)
                .await
                .unwrap()
                .unwrap()
                .voted
        }
    }

    #[rocket::async_test]
    async fn successful_cast_writes_anonymous_ballot_and_logs() {
        let scenario = Scenario::new().await;
        let receipt = scenario.cast(scenario.request()).await.unwrap();

        assert_eq!(receipt.governorate, Governorate::Giza);
        assert_eq!(receipt.election_name, scenario.election.name);
        assert!(scenario.registry_voted().await);

        let ballots = scenario.store.ballots().await;
        assert_eq!(ballots.len(), 1);
        let (vote, choices) = &ballots[0];
        assert_eq!(Id::from(receipt.vote_id), vote.id);
        assert_eq!(choices.len(), CHOICES_PER_BALLOT);
        assert!(choices
            .iter()
            .all(|c| c.election_id == scenario.election.id
                && scenario.candidates[..5].contains(&c.candidate_profile_id)));

        let public = scenario
            .db
            .public_log(scenario.election.id, vote.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(public.governorate, Governorate::Giza);
        assert!(public.error_message.is_none());

        let filter = AuditLogFilter {
            action: Some(ActionType::VoteCast),
            ..Default::default()
        };
        let (audits, total) = scenario.db.audit_logs_page(&filter, 0, 10).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(audits[0].user_id, scenario.voter.id);
        assert!(audits[0].candidate_profile_id.is_none());
        assert!(!audits[0].details.contains(&vote.id.to_string()));
    }

    #[rocket::async_test]
    async fn repeated_cast_conflicts() {
        let scenario = Scenario::new().await;
        scenario.cast(scenario.request()).await.unwrap();

        let err = scenario.cast(scenario.request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.detail(), "AlreadyVoted");
        assert_eq!(scenario.store.ballots().await.len(), 1);
    }

    #[rocket::async_test]
    async fn concurrent_casts_commit_exactly_one_ballot() {
        let scenario = Scenario::new().await;
        let (first, second) = tokio::join!(
            scenario.cast(scenario.request()),
            scenario.cast(scenario.request())
        );

        let successes = [&first, &second].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        let failure = first.err().or(second.err()).unwrap();
        assert_eq!(failure.kind(), ErrorKind::Conflict);
        assert_eq!(scenario.store.ballots().await.len(), 1);
    }

    #[rocket::async_test]
    async fn invalid_selections_are_rejected_without_flipping() {
        let scenario = Scenario::new().await;

        let mut request = scenario.request();
        request.candidate_ids[4] = request.candidate_ids[0];
        let err = scenario.cast(request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let mut request = scenario.request();
        request.candidate_ids[4] = Id::new().into();
        let err = scenario.cast(request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let mut request = scenario.request();
        request.password = "wrong-password".to_string();
        let err = scenario.cast(request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let mut request = scenario.request();
        request.voting_token = Token::try_from("WRONG".to_string()).unwrap();
        let err = scenario.cast(request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let mut request = scenario.request();
        request.national_id = NationalId::example2();
        let err = scenario.cast(request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        assert!(!scenario.registry_voted().await);
        assert!(scenario.store.ballots().await.is_empty());
    }

    #[rocket::async_test]
    async fn casting_outside_voting_phase_conflicts() {
        let scenario = Scenario::new().await;
        scenario
            .db
            .transition_election(&scenario.election, ElectionStatus::Completed)
            .await
            .unwrap()
            .unwrap();

        let err = scenario.cast(scenario.request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(!scenario.registry_voted().await);
    }

    #[rocket::async_test]
    async fn unreachable_registry_is_a_failure() {
        let scenario = Scenario::new().await;
        scenario.local.set_offline(true);

        let err = scenario.cast(scenario.request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Failure);
        assert_eq!(err.detail(), crate::gateway::UNREACHABLE);
        assert!(scenario.store.ballots().await.is_empty());
    }

    #[rocket::async_test]
    async fn failed_commit_is_logged_and_retry_resumes() {
        let scenario = Scenario::new().await;
        scenario.store.fail_next_commit();

        let err = scenario.cast(scenario.request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Failure);
        assert!(scenario.registry_voted().await);
        assert!(scenario.store.ballots().await.is_empty());
        assert_eq!(
            scenario
                .db
                .count_failed_logs(scenario.election.id)
                .await
                .unwrap(),
            1
        );

        // The Registry already says voted; the retry commits the missing ballot once.
        scenario.cast(scenario.request()).await.unwrap();
        assert_eq!(scenario.store.ballots().await.len(), 1);
        let err = scenario.cast(scenario.request()).await.unwrap_err();
        assert_eq!(err.detail(), "AlreadyVoted");
    }

    /// Completes the scenario's election and opens a second one, in its voting
    /// phase, with five Giza candidates.
    async fn next_election(scenario: &Scenario) -> (Election, Vec<Id>) {
        scenario
            .db
            .transition_election(&scenario.election, ElectionStatus::Completed)
            .await
            .unwrap()
            .unwrap();
        let mut election = Election::example_in(ElectionStatus::Voting);
        election.name = "Parliament 2031".to_string();
        scenario.db.insert_election(election.clone()).await.unwrap();
        let mut candidates = Vec::new();
        for n in 0..5 {
            let profile = CandidateProfile::example(election.id, Governorate::Giza, n);
            candidates.push(profile.id);
            scenario.db.insert_profile(profile).await.unwrap();
        }
        (election, candidates)
    }

    async fn cast_in(
        scenario: &Scenario,
        election: &Election,
        candidates: &[Id],
    ) -> Result<VoteReceipt> {
        cast_vote(
            &scenario.db,
            &scenario.gateway,
            SECRET,
            &scenario.voter,
            election.id,
            CastVoteRequest::example(
                candidates,
                scenario.record.national_id.clone(),
                scenario.record.token.clone(),
            ),
        )
        .await
    }

    #[rocket::async_test]
    async fn voted_flag_from_earlier_election_blocks_until_reset() {
        let scenario = Scenario::new().await;
        scenario.cast(scenario.request()).await.unwrap();
        let (second, candidates) = next_election(&scenario).await;

        let err = cast_in(&scenario, &second, &candidates).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.detail(), "AlreadyVoted");
        assert_eq!(scenario.store.ballots().await.len(), 1);
        assert!(!scenario
            .db
            .has_cast_intent(scenario.voter.id, second.id)
            .await
            .unwrap());

        scenario.registry.reset_all_voted().await.unwrap();
        cast_in(&scenario, &second, &candidates).await.unwrap();
        assert_eq!(scenario.store.ballots().await.len(), 2);
        assert!(scenario.registry_voted().await);
    }

    #[rocket::async_test]
    async fn commit_clears_cast_intent() {
        let scenario = Scenario::new().await;
        scenario.store.fail_next_commit();
        scenario.cast(scenario.request()).await.unwrap_err();
        assert_eq!(
            scenario
                .db
                .count_cast_intents(scenario.election.id)
                .await
                .unwrap(),
            1
        );

        scenario.cast(scenario.request()).await.unwrap();
        assert_eq!(
            scenario
                .db
                .count_cast_intents(scenario.election.id)
                .await
                .unwrap(),
            0
        );
    }
}
