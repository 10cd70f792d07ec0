//! Persistence for both services.
//!
//! Each service talks to its store through a trait so that the same handlers run
//! against MongoDB in production and against in-memory state in tests and local
//! development. Every compound write that must be atomic is a single trait method.

use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

use rocket::{
    http::Status,
    request::{self, FromRequest, Request},
    State,
};

use crate::error::Result;
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

pub mod memory;
pub mod mongo;

/// The Registry's record store.
#[rocket::async_trait]
pub trait RegistryStore: Send + Sync {
    /// Insert a new record. `Conflict` if the national ID is already present.
    async fn insert_record(&self, kind: RecordKind, record: RegistryRecord) -> Result<()>;

    async fn record(&self, kind: RecordKind, national_id: &NationalId)
        -> Result<Option<RegistryRecord>>;

    /// Set `is_registered` iff the token matches and is valid, the person is eligible,
    /// and they are not yet registered. Returns whether the flag was flipped.
    async fn try_mark_registered(
        &self,
        kind: RecordKind,
        national_id: &NationalId,
        token: &Token,
        username: &str,
    ) -> Result<bool>;

    /// Set `voted` on a voter iff every eligibility condition holds, they are
    /// registered, and they have not voted. Returns whether the flag was flipped.
    async fn try_mark_voted(&self, national_id: &NationalId, token: &Token) -> Result<bool>;

    /// Clear `voted` on every voter record. Returns how many were cleared.
    async fn reset_all_voted(&self) -> Result<u64>;

    /// Replace the token and mark it valid. Returns false if there is no such record.
    async fn replace_token(
        &self,
        kind: RecordKind,
        national_id: &NationalId,
        token: &Token,
    ) -> Result<bool>;

    /// Mark the current token invalid. Returns false if there is no such record.
    async fn revoke_token(&self, kind: RecordKind, national_id: &NationalId) -> Result<bool>;

    /// Returns false if there is no such record.
    async fn set_eligibility(
        &self,
        kind: RecordKind,
        national_id: &NationalId,
        eligible: bool,
    ) -> Result<bool>;
}

/// Everything a successful vote writes, committed as one unit.
#[derive(Debug, Clone)]
pub struct BallotCommit {
    pub participation: Participation,
    pub vote: Vote,
    pub choices: Vec<VoteChoice>,
    pub public_log: PublicVoteLog,
    pub audit_log: SystemAuditLog,
}

/// Aggregated ballots of one election.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    pub ballots: u64,
    /// Votes per candidate profile.
    pub choices: HashMap<Id, u64>,
    /// Ballots per governorate.
    pub turnout: HashMap<Governorate, u64>,
}

/// The Voting Service's store.
#[rocket::async_trait]
pub trait VotingStore: Send + Sync {
    /// `Conflict` if the username or the citizen is already taken.
    async fn insert_account(&self, account: Account) -> Result<()>;
    async fn account_by_id(&self, id: Id) -> Result<Option<Account>>;
    async fn account_by_username(&self, username: &str) -> Result<Option<Account>>;
    /// The account of the given role belonging to the citizen with this national ID hash.
    async fn citizen_account(&self, role: Role, national_id_hmac: &str)
        -> Result<Option<Account>>;
    async fn admin_exists(&self) -> Result<bool>;

    /// `Conflict` if a non-Completed election exists or the name is taken.
    async fn insert_election(&self, election: Election) -> Result<()>;
    async fn election_by_id(&self, id: Id) -> Result<Option<Election>>;
    async fn election_by_name(&self, name: &str) -> Result<Option<Election>>;
    /// The single non-Completed election, if any.
    async fn active_election(&self) -> Result<Option<Election>>;
    /// All elections, newest first.
    async fn elections(&self) -> Result<Vec<Election>>;
    /// Move `current` to `next` iff its status and version are unchanged since it was
    /// read. Returns `None` when the stored election has moved on.
    async fn transition_election(
        &self,
        current: &Election,
        next: ElectionStatus,
    ) -> Result<Option<Election>>;

    /// `Conflict` if the candidate already has a profile for this election.
    async fn insert_profile(&self, profile: CandidateProfile) -> Result<()>;
    async fn profile_by_id(&self, id: Id) -> Result<Option<CandidateProfile>>;
    /// The profiles among `ids` that belong to the election.
    async fn profiles_by_ids(&self, election_id: Id, ids: &[Id])
        -> Result<Vec<CandidateProfile>>;
    async fn profiles_page(
        &self,
        election_id: Id,
        governorate: Option<Governorate>,
        skip: u64,
        limit: u64,
    ) -> Result<(Vec<CandidateProfile>, u64)>;
    async fn profiles_for_election(&self, election_id: Id) -> Result<Vec<CandidateProfile>>;

    async fn has_participated(&self, user_id: Id, election_id: Id) -> Result<bool>;
    /// Keep the first intent for `(user_id, election_id)`; later ones are no-ops.
    async fn record_cast_intent(&self, intent: CastIntent) -> Result<()>;
    async fn has_cast_intent(&self, user_id: Id, election_id: Id) -> Result<bool>;
    /// Intents of the election whose ballot never committed.
    async fn count_cast_intents(&self, election_id: Id) -> Result<u64>;
    /// Write a whole ballot atomically and drop the voter's cast intent.
    /// `Conflict("AlreadyVoted")` if the participation already exists; nothing is
    /// written in that case.
    async fn commit_ballot(&self, ballot: BallotCommit) -> Result<()>;
    async fn tally(&self, election_id: Id) -> Result<Tally>;

    async fn append_public_log(&self, log: PublicVoteLog) -> Result<()>;
    async fn public_log(&self, election_id: Id, vote_id: Id) -> Result<Option<PublicVoteLog>>;
    async fn public_logs_page(
        &self,
        election_id: Id,
        skip: u64,
        limit: u64,
    ) -> Result<(Vec<PublicVoteLog>, u64)>;
    async fn count_failed_logs(&self, election_id: Id) -> Result<u64>;

    async fn append_audit(&self, log: SystemAuditLog) -> Result<()>;
    async fn audit_logs_page(
        &self,
        filter: &AuditLogFilter,
        skip: u64,
        limit: u64,
    ) -> Result<(Vec<SystemAuditLog>, u64)>;
}

/// Handle on the Voting Service store, kept in managed state.
#[derive(Clone)]
pub struct VotingDb(Arc<dyn VotingStore>);

impl VotingDb {
    pub fn new(store: impl VotingStore + 'static) -> Self {
        Self(Arc::new(store))
    }

    /// Wrap a store that is also held elsewhere.
    pub fn from_arc(store: Arc<dyn VotingStore>) -> Self {
        Self(store)
    }
}

impl Deref for VotingDb {
    type Target = dyn VotingStore;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

/// Handle on the Registry store, kept in managed state.
#[derive(Clone)]
pub struct RegistryDb(Arc<dyn RegistryStore>);

impl RegistryDb {
    pub fn new(store: impl RegistryStore + 'static) -> Self {
        Self(Arc::new(store))
    }

    /// Wrap a store that is also held elsewhere.
    pub fn from_arc(store: Arc<dyn RegistryStore>) -> Self {
        Self(store)
    }
}

impl Deref for RegistryDb {
    type Target = dyn RegistryStore;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for VotingDb {
    type Error = ();

    /// Fails iff the store is not managed by [`rocket::Rocket`].
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        match req.guard::<&State<VotingDb>>().await {
            request::Outcome::Success(db) => request::Outcome::Success(db.inner().clone()),
            _ => request::Outcome::Error((Status::InternalServerError, ())),
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RegistryDb {
    type Error = ();

    /// Fails iff the store is not managed by [`rocket::Rocket`].
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        match req.guard::<&State<RegistryDb>>().await {
            request::Outcome::Success(db) => request::Outcome::Success(db.inner().clone()),
            _ => request::Outcome::Error((Status::InternalServerError, ())),
        }
    }
}
