//! In-memory stores. Each compound write happens under a single lock acquisition,
//! which gives the same all-or-nothing and compare-and-set behaviour as the
//! conditional writes and transactions of the MongoDB stores.

use std::collections::HashMap;
#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};

use rocket::tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::model::{
    api::logs::AuditLogFilter,
    common::{
        citizen::{NationalId, Token},
        election::ElectionStatus,
        governorate::Governorate,
        role::Role,
    },
    db::{
        account::Account,
        candidate::CandidateProfile,
        election::Election,
        logs::{PublicVoteLog, SystemAuditLog},
        registry::{RecordKind, RegistryRecord},
        vote::{CastIntent, Participation, Vote, VoteChoice},
    },
    mongodb::Id,
};

use super::{BallotCommit, RegistryStore, Tally, VotingStore};

fn page<T: Clone>(items: &[T], skip: u64, limit: u64) -> Vec<T> {
    let skip = usize::try_from(skip).unwrap_or(usize::MAX);
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    items.iter().skip(skip).take(limit).cloned().collect()
}

#[derive(Default)]
pub struct MemoryRegistryStore {
    records: Mutex<HashMap<RecordKind, Vec<RegistryRecord>>>,
}

impl MemoryRegistryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[rocket::async_trait]
impl RegistryStore for MemoryRegistryStore {
    async fn insert_record(&self, kind: RecordKind, record: RegistryRecord) -> Result<()> {
        let mut records = self.records.lock().await;
        let records = records.entry(kind).or_default();
        if records
            .iter()
            .any(|r| r.national_id == record.national_id || r.token == record.token)
        {
            return Err(Error::Conflict(format!(
                "{} {} already exists",
                kind.noun(),
                record.national_id
            )));
        }
        records.push(record);
        Ok(())
    }

    async fn record(
        &self,
        kind: RecordKind,
        national_id: &NationalId,
    ) -> Result<Option<RegistryRecord>> {
        let records = self.records.lock().await;
        Ok(records
            .get(&kind)
            .and_then(|records| records.iter().find(|r| &r.national_id == national_id))
            .cloned())
    }

    async fn try_mark_registered(
        &self,
        kind: RecordKind,
        national_id: &NationalId,
        token: &Token,
        username: &str,
    ) -> Result<bool> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(&kind)
            .and_then(|records| records.iter_mut().find(|r| &r.national_id == national_id));
        match record {
            Some(record) if record.check_can_register(token).is_ok() => {
                record.is_registered = true;
                record.registered_username = Some(username.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn try_mark_voted(&self, national_id: &NationalId, token: &Token) -> Result<bool> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(&RecordKind::Voter)
            .and_then(|records| records.iter_mut().find(|r| &r.national_id == national_id));
        match record {
            Some(record) if record.check_can_vote(token).is_ok() => {
                record.voted = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reset_all_voted(&self) -> Result<u64> {
        let mut records = self.records.lock().await;
        let mut reset = 0;
        for record in records.entry(RecordKind::Voter).or_default() {
            if record.voted {
                record.voted = false;
                reset += 1;
            }
        }
        Ok(reset)
    }

    async fn replace_token(
        &self,
        kind: RecordKind,
        national_id: &NationalId,
        token: &Token,
    ) -> Result<bool> {
        let mut records = self.records.lock().await;
        let records = records.entry(kind).or_default();
        if records
            .iter()
            .any(|r| &r.token == token && &r.national_id != national_id)
        {
            return Err(Error::Conflict("Token already issued".to_string()));
        }
        match records.iter_mut().find(|r| &r.national_id == national_id) {
            Some(record) => {
                record.token = token.clone();
                record.valid_token = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke_token(&self, kind: RecordKind, national_id: &NationalId) -> Result<bool> {
        let mut records = self.records.lock().await;
        match records
            .entry(kind)
            .or_default()
            .iter_mut()
            .find(|r| &r.national_id == national_id)
        {
            Some(record) => {
                record.valid_token = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_eligibility(
        &self,
        kind: RecordKind,
        national_id: &NationalId,
        eligible: bool,
    ) -> Result<bool> {
        let mut records = self.records.lock().await;
        match records
            .entry(kind)
            .or_default()
            .iter_mut()
            .find(|r| &r.national_id == national_id)
        {
            Some(record) => {
                record.eligible = eligible;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[derive(Default)]
struct VotingState {
    accounts: Vec<Account>,
    elections: Vec<Election>,
    profiles: Vec<CandidateProfile>,
    votes: Vec<Vote>,
    choices: Vec<VoteChoice>,
    participations: Vec<Participation>,
    intents: Vec<CastIntent>,
    public_logs: Vec<PublicVoteLog>,
    audit_logs: Vec<SystemAuditLog>,
}

#[derive(Default)]
pub struct MemoryVotingStore {
    state: Mutex<VotingState>,
    #[cfg(test)]
    fail_next_commit: AtomicBool,
}

impl MemoryVotingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `commit_ballot` fail as if the database went away mid-write.
    #[cfg(test)]
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Every stored ballot with its choices, for invariant checks in tests.
    #[cfg(test)]
    pub async fn ballots(&self) -> Vec<(Vote, Vec<VoteChoice>)> {
        let state = self.state.lock().await;
        state
            .votes
            .iter()
            .map(|vote| {
                let choices = state
                    .choices
                    .iter()
                    .filter(|c| c.vote_id == vote.id)
                    .cloned()
                    .collect();
                (vote.clone(), choices)
            })
            .collect()
    }
}

#[rocket::async_trait]
impl VotingStore for MemoryVotingStore {
    async fn insert_account(&self, account: Account) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.accounts.iter().any(|a| a.username == account.username) {
            return Err(Error::Conflict(format!(
                "Username {} is already taken",
                account.username
            )));
        }
        if let Some(citizen) = &account.citizen {
            let taken = state.accounts.iter().any(|a| {
                a.role == account.role
                    && a.citizen
                        .as_ref()
                        .map_or(false, |c| c.national_id_hmac == citizen.national_id_hmac)
            });
            if taken {
                return Err(Error::Conflict(format!(
                    "This citizen already has a {} account",
                    account.role
                )));
            }
        }
        state.accounts.push(account);
        Ok(())
    }

    async fn account_by_id(&self, id: Id) -> Result<Option<Account>> {
        let state = self.state.lock().await;
        Ok(state.accounts.iter().find(|a| a.id == id).cloned())
    }

    async fn account_by_username(&self, username: &str) -> Result<Option<Account>> {
        let state = self.state.lock().await;
        Ok(state
            .accounts
            .iter()
            .find(|a| a.username == username)
            .cloned())
    }

    async fn citizen_account(
        &self,
        role: Role,
        national_id_hmac: &str,
    ) -> Result<Option<Account>> {
        let state = self.state.lock().await;
        Ok(state
            .accounts
            .iter()
            .find(|a| {
                a.role == role
                    && a.citizen
                        .as_ref()
                        .map_or(false, |c| c.national_id_hmac == national_id_hmac)
            })
            .cloned())
    }

    async fn admin_exists(&self) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state.accounts.iter().any(|a| a.role == Role::Admin))
    }

    async fn insert_election(&self, election: Election) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.elections.iter().any(|e| e.name == election.name) {
            return Err(Error::Conflict(format!(
                "Election name {} is already taken",
                election.name
            )));
        }
        if state.elections.iter().any(|e| e.status.is_active()) {
            return Err(Error::Conflict(
                "Another election has not completed yet".to_string(),
            ));
        }
        state.elections.push(election);
        Ok(())
    }

    async fn election_by_id(&self, id: Id) -> Result<Option<Election>> {
        let state = self.state.lock().await;
        Ok(state.elections.iter().find(|e| e.id == id).cloned())
    }

    async fn election_by_name(&self, name: &str) -> Result<Option<Election>> {
        let state = self.state.lock().await;
        Ok(state.elections.iter().find(|e| e.name == name).cloned())
    }

    async fn active_election(&self) -> Result<Option<Election>> {
        let state = self.state.lock().await;
        Ok(state
            .elections
            .iter()
            .find(|e| e.status.is_active())
            .cloned())
    }

    async fn elections(&self) -> Result<Vec<Election>> {
        let state = self.state.lock().await;
        let mut elections = state.elections.clone();
        elections.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(elections)
    }

    async fn transition_election(
        &self,
        current: &Election,
        next: ElectionStatus,
    ) -> Result<Option<Election>> {
        let mut state = self.state.lock().await;
        let stored = state.elections.iter_mut().find(|e| {
            e.id == current.id && e.status == current.status && e.version == current.version
        });
        Ok(stored.map(|stored| {
            *stored = stored.advanced_to(next);
            stored.clone()
        }))
    }

    async fn insert_profile(&self, profile: CandidateProfile) -> Result<()> {
        let mut state = self.state.lock().await;
        if state
            .profiles
            .iter()
            .any(|p| p.user_id == profile.user_id && p.election_id == profile.election_id)
        {
            return Err(Error::Conflict(
                "Candidate is already nominated for this election".to_string(),
            ));
        }
        state.profiles.push(profile);
        Ok(())
    }

    async fn profile_by_id(&self, id: Id) -> Result<Option<CandidateProfile>> {
        let state = self.state.lock().await;
        Ok(state.profiles.iter().find(|p| p.id == id).cloned())
    }

    async fn profiles_by_ids(
        &self,
        election_id: Id,
        ids: &[Id],
    ) -> Result<Vec<CandidateProfile>> {
        let state = self.state.lock().await;
        Ok(state
            .profiles
            .iter()
            .filter(|p| p.election_id == election_id && ids.contains(&p.id))
            .cloned()
            .collect())
    }

    async fn profiles_page(
        &self,
        election_id: Id,
        governorate: Option<Governorate>,
        skip: u64,
        limit: u64,
    ) -> Result<(Vec<CandidateProfile>, u64)> {
        let state = self.state.lock().await;
        let matching: Vec<_> = state
            .profiles
            .iter()
            .filter(|p| p.election_id == election_id)
            .filter(|p| governorate.map_or(true, |g| p.governorate == g))
            .cloned()
            .collect();
        Ok((page(&matching, skip, limit), matching.len() as u64))
    }

    async fn profiles_for_election(&self, election_id: Id) -> Result<Vec<CandidateProfile>> {
        let state = self.state.lock().await;
        Ok(state
            .profiles
            .iter()
            .filter(|p| p.election_id == election_id)
            .cloned()
            .collect())
    }

    async fn has_participated(&self, user_id: Id, election_id: Id) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state
            .participations
            .iter()
            .any(|p| p.user_id == user_id && p.election_id == election_id))
    }

    async fn record_cast_intent(&self, intent: CastIntent) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state
            .intents
            .iter()
            .any(|i| i.user_id == intent.user_id && i.election_id == intent.election_id)
        {
            state.intents.push(intent);
        }
        Ok(())
    }

    async fn has_cast_intent(&self, user_id: Id, election_id: Id) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state
            .intents
            .iter()
            .any(|i| i.user_id == user_id && i.election_id == election_id))
    }

    async fn count_cast_intents(&self, election_id: Id) -> Result<u64> {
        let state = self.state.lock().await;
        Ok(state
            .intents
            .iter()
            .filter(|i| i.election_id == election_id)
            .count() as u64)
    }

    async fn commit_ballot(&self, ballot: BallotCommit) -> Result<()> {
        let mut state = self.state.lock().await;
        let participation = &ballot.participation;
        if state.participations.iter().any(|p| {
            p.user_id == participation.user_id && p.election_id == participation.election_id
        }) {
            return Err(Error::Conflict("AlreadyVoted".to_string()));
        }
        #[cfg(test)]
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(Error::Failure("Simulated storage outage".to_string()));
        }
        let (user_id, election_id) = (participation.user_id, participation.election_id);
        state
            .intents
            .retain(|i| i.user_id != user_id || i.election_id != election_id);
        state.participations.push(ballot.participation);
        state.votes.push(ballot.vote);
        state.choices.extend(ballot.choices);
        state.public_logs.push(ballot.public_log);
        state.audit_logs.push(ballot.audit_log);
        Ok(())
    }

    async fn tally(&self, election_id: Id) -> Result<Tally> {
        let state = self.state.lock().await;
        let mut tally = Tally::default();
        for vote in state.votes.iter().filter(|v| v.election_id == election_id) {
            tally.ballots += 1;
            *tally.turnout.entry(vote.governorate).or_default() += 1;
        }
        for choice in state.choices.iter().filter(|c| c.election_id == election_id) {
            *tally.choices.entry(choice.candidate_profile_id).or_default() += 1;
        }
        Ok(tally)
    }

    async fn append_public_log(&self, log: PublicVoteLog) -> Result<()> {
        self.state.lock().await.public_logs.push(log);
        Ok(())
    }

    async fn public_log(&self, election_id: Id, vote_id: Id) -> Result<Option<PublicVoteLog>> {
        let state = self.state.lock().await;
        Ok(state
            .public_logs
            .iter()
            .find(|l| l.election_id == election_id && l.vote_id == Some(vote_id))
            .cloned())
    }

    async fn public_logs_page(
        &self,
        election_id: Id,
        skip: u64,
        limit: u64,
    ) -> Result<(Vec<PublicVoteLog>, u64)> {
        let state = self.state.lock().await;
        let matching: Vec<_> = state
            .public_logs
            .iter()
            .filter(|l| l.election_id == election_id)
            .cloned()
            .collect();
        Ok((page(&matching, skip, limit), matching.len() as u64))
    }

    async fn count_failed_logs(&self, election_id: Id) -> Result<u64> {
        let state = self.state.lock().await;
        Ok(state
            .public_logs
            .iter()
            .filter(|l| l.election_id == election_id && l.error_message.is_some())
            .count() as u64)
    }

    async fn append_audit(&self, log: SystemAuditLog) -> Result<()> {
        self.state.lock().await.audit_logs.push(log);
        Ok(())
    }

    async fn audit_logs_page(
        &self,
        filter: &AuditLogFilter,
        skip: u64,
        limit: u64,
    ) -> Result<(Vec<SystemAuditLog>, u64)> {
        let state = self.state.lock().await;
        let mut matching: Vec<_> = state
            .audit_logs
            .iter()
            .rev()
            .filter(|l| filter.matches(l))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok((page(&matching, skip, limit), matching.len() as u64))
    }
}
