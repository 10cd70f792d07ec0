//! MongoDB-backed stores. Atomicity comes from conditional single-document
//! updates, unique indexes, and multi-document transactions.

use log::{debug, warn};
use mongodb::{
    bson::{doc, from_document, Document},
    error::Error as DbError,
    options::FindOptions,
    Client, ClientSession, Collection, Database,
};
use rocket::futures::TryStreamExt;
use serde::{de::DeserializeOwned, Deserialize};

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
    mongodb::{is_duplicate_key_error, Coll, Id},
};

use super::{BallotCommit, RegistryStore, Tally, VotingStore};

/// Turn a duplicate key error into a `Conflict` with the given detail.
fn conflict_on_duplicate(err: DbError, detail: impl Into<String>) -> Error {
    if is_duplicate_key_error(&err) {
        Error::Conflict(detail.into())
    } else {
        err.into()
    }
}

fn page_options(sort: Document, skip: u64, limit: u64) -> FindOptions {
    FindOptions::builder()
        .sort(sort)
        .skip(skip)
        .limit(i64::try_from(limit).unwrap_or(i64::MAX))
        .build()
}

/// Escape a user-supplied string for literal use inside a `$regex`.
fn escape_regex(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if "\\^$.|?*+()[]{}".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// One row of a `$group` stage counting documents per key.
#[derive(Deserialize)]
struct GroupCount<K> {
    #[serde(rename = "_id")]
    key: K,
    count: i64,
}

async fn count_by<K, T>(
    coll: &Collection<T>,
    election_id: Id,
    field: &str,
) -> Result<Vec<(K, u64)>>
where
    K: DeserializeOwned,
    T: Send + Sync,
{
    let pipeline = [
        doc! { "$match": { "election_id": election_id } },
        doc! { "$group": { "_id": format!("${field}"), "count": { "$sum": 1 } } },
    ];
    let groups: Vec<Document> = coll.aggregate(pipeline, None).await?.try_collect().await?;
    groups
        .into_iter()
        .map(|group| {
            let group: GroupCount<K> = from_document(group)
                .map_err(|err| Error::Failure(format!("Malformed tally row: {err}")))?;
            Ok((group.key, u64::try_from(group.count).unwrap_or(0)))
        })
        .collect()
}

pub struct MongoRegistryStore {
    db: Database,
}

impl MongoRegistryStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn records(&self, kind: RecordKind) -> Coll<RegistryRecord> {
        Coll::for_kind(&self.db, kind)
    }
}

#[rocket::async_trait]
impl RegistryStore for MongoRegistryStore {
    async fn insert_record(&self, kind: RecordKind, record: RegistryRecord) -> Result<()> {
        let national_id = record.national_id.clone();
        self.records(kind)
            .insert_one(record, None)
            .await
            .map_err(|err| {
                conflict_on_duplicate(err, format!("{} {national_id} already exists", kind.noun()))
            })?;
        Ok(())
    }

    async fn record(
        &self,
        kind: RecordKind,
        national_id: &NationalId,
    ) -> Result<Option<RegistryRecord>> {
        Ok(self
            .records(kind)
            .find_one(doc! { "national_id": national_id }, None)
            .await?)
    }

    async fn try_mark_registered(
        &self,
        kind: RecordKind,
        national_id: &NationalId,
        token: &Token,
        username: &str,
    ) -> Result<bool> {
        let filter = doc! {
            "national_id": national_id,
            "token": token,
            "valid_token": true,
            "eligible": true,
            "is_registered": false,
        };
        let update = doc! {
            "$set": { "is_registered": true, "registered_username": username },
        };
        let result = self.records(kind).update_one(filter, update, None).await?;
        Ok(result.modified_count == 1)
    }

    async fn try_mark_voted(&self, national_id: &NationalId, token: &Token) -> Result<bool> {
        let filter = doc! {
            "national_id": national_id,
            "token": token,
            "valid_token": true,
            "eligible": true,
            "is_registered": true,
            "voted": false,
        };
        let update = doc! { "$set": { "voted": true } };
        let result = self
            .records(RecordKind::Voter)
            .update_one(filter, update, None)
            .await?;
        Ok(result.modified_count == 1)
    }

    async fn reset_all_voted(&self) -> Result<u64> {
        let result = self
            .records(RecordKind::Voter)
            .update_many(doc! { "voted": true }, doc! { "$set": { "voted": false } }, None)
            .await?;
        Ok(result.modified_count)
    }

    async fn replace_token(
        &self,
        kind: RecordKind,
        national_id: &NationalId,
        token: &Token,
    ) -> Result<bool> {
        let update = doc! { "$set": { "token": token, "valid_token": true } };
        let result = self
            .records(kind)
            .update_one(doc! { "national_id": national_id }, update, None)
            .await
            .map_err(|err| conflict_on_duplicate(err, "Token already issued"))?;
        Ok(result.matched_count == 1)
    }

    async fn revoke_token(&self, kind: RecordKind, national_id: &NationalId) -> Result<bool> {
        let update = doc! { "$set": { "valid_token": false } };
        let result = self
            .records(kind)
            .update_one(doc! { "national_id": national_id }, update, None)
            .await?;
        Ok(result.matched_count == 1)
    }

    async fn set_eligibility(
        &self,
        kind: RecordKind,
        national_id: &NationalId,
        eligible: bool,
    ) -> Result<bool> {
        let update = doc! { "$set": { "eligible": eligible } };
        let result = self
            .records(kind)
            .update_one(doc! { "national_id": national_id }, update, None)
            .await?;
        Ok(result.matched_count == 1)
    }
}

pub struct MongoVotingStore {
    client: Client,
    db: Database,
}

impl MongoVotingStore {
    pub fn new(client: Client, db: Database) -> Self {
        Self { client, db }
    }

    fn coll<T: crate::model::mongodb::MongoCollection>(&self) -> Coll<T> {
        Coll::from_db(&self.db)
    }

    /// All inserts of a ballot, inside the caller's transaction.
    async fn write_ballot(
        &self,
        ballot: &BallotCommit,
        session: &mut ClientSession,
    ) -> std::result::Result<(), DbError> {
        self.coll::<Participation>()
            .insert_one_with_session(&ballot.participation, None, session)
            .await?;
        self.coll::<Vote>()
            .insert_one_with_session(&ballot.vote, None, session)
            .await?;
        self.coll::<VoteChoice>()
            .insert_many_with_session(&ballot.choices, None, session)
            .await?;
        self.coll::<PublicVoteLog>()
            .insert_one_with_session(&ballot.public_log, None, session)
            .await?;
        self.coll::<SystemAuditLog>()
            .insert_one_with_session(&ballot.audit_log, None, session)
            .await?;
        let participation = &ballot.participation;
        self.coll::<CastIntent>()
            .delete_one_with_session(
                doc! {
                    "user_id": participation.user_id,
                    "election_id": participation.election_id,
                },
                None,
                session,
            )
            .await?;
        Ok(())
    }
}

#[rocket::async_trait]
impl VotingStore for MongoVotingStore {
    async fn insert_account(&self, account: Account) -> Result<()> {
        let username = account.username.clone();
        self.coll::<Account>()
            .insert_one(account, None)
            .await
            .map_err(|err| {
                conflict_on_duplicate(
                    err,
                    format!("Username {username} or this citizen is already registered"),
                )
            })?;
        Ok(())
    }

    async fn account_by_id(&self, id: Id) -> Result<Option<Account>> {
        Ok(self.coll::<Account>().find_one(id.as_doc(), None).await?)
    }

    async fn account_by_username(&self, username: &str) -> Result<Option<Account>> {
        Ok(self
            .coll::<Account>()
            .find_one(doc! { "username": username }, None)
            .await?)
    }

    async fn citizen_account(
        &self,
        role: Role,
        national_id_hmac: &str,
    ) -> Result<Option<Account>> {
        let filter = doc! { "role": role, "citizen.national_id_hmac": national_id_hmac };
        Ok(self.coll::<Account>().find_one(filter, None).await?)
    }

    async fn admin_exists(&self) -> Result<bool> {
        let admins = self
            .coll::<Account>()
            .count_documents(doc! { "role": Role::Admin }, None)
            .await?;
        Ok(admins > 0)
    }

    async fn insert_election(&self, election: Election) -> Result<()> {
        self.coll::<Election>()
            .insert_one(election, None)
            .await
            .map_err(|err| {
                conflict_on_duplicate(
                    err,
                    "Election name is taken or another election has not completed yet",
                )
            })?;
        Ok(())
    }

    async fn election_by_id(&self, id: Id) -> Result<Option<Election>> {
        Ok(self.coll::<Election>().find_one(id.as_doc(), None).await?)
    }

    async fn election_by_name(&self, name: &str) -> Result<Option<Election>> {
        Ok(self
            .coll::<Election>()
            .find_one(doc! { "name": name }, None)
            .await?)
    }

    async fn active_election(&self) -> Result<Option<Election>> {
        Ok(self
            .coll::<Election>()
            .find_one(doc! { "status": { "$ne": ElectionStatus::Completed } }, None)
            .await?)
    }

    async fn elections(&self) -> Result<Vec<Election>> {
        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1 })
            .build();
        Ok(self
            .coll::<Election>()
            .find(None, options)
            .await?
            .try_collect()
            .await?)
    }

    async fn transition_election(
        &self,
        current: &Election,
        next: ElectionStatus,
    ) -> Result<Option<Election>> {
        let filter = doc! {
            "_id": current.id,
            "status": current.status,
            "version": i64::from(current.version),
        };
        let mut update = doc! {
            "$set": { "status": next },
            "$inc": { "version": 1 },
        };
        if !next.is_active() {
            update.insert("$unset", doc! { "active_slot": "" });
        }
        let result = self
            .coll::<Election>()
            .update_one(filter, update, None)
            .await?;
        if result.modified_count == 1 {
            Ok(Some(current.advanced_to(next)))
        } else {
            debug!(
                "Stale transition of election {} from {:?} (version {})",
                current.id, current.status, current.version
            );
            Ok(None)
        }
    }

    async fn insert_profile(&self, profile: CandidateProfile) -> Result<()> {
        self.coll::<CandidateProfile>()
            .insert_one(profile, None)
            .await
            .map_err(|err| {
                conflict_on_duplicate(err, "Candidate is already nominated for this election")
            })?;
        Ok(())
    }

    async fn profile_by_id(&self, id: Id) -> Result<Option<CandidateProfile>> {
        Ok(self
            .coll::<CandidateProfile>()
            .find_one(id.as_doc(), None)
            .await?)
    }

    async fn profiles_by_ids(
        &self,
        election_id: Id,
        ids: &[Id],
    ) -> Result<Vec<CandidateProfile>> {
        let filter = doc! {
            "election_id": election_id,
            "_id": { "$in": ids.iter().copied().collect::<Vec<_>>() },
        };
        Ok(self
            .coll::<CandidateProfile>()
            .find(filter, None)
            .await?
            .try_collect()
            .await?)
    }

    async fn profiles_page(
        &self,
        election_id: Id,
        governorate: Option<Governorate>,
        skip: u64,
        limit: u64,
    ) -> Result<(Vec<CandidateProfile>, u64)> {
        let mut filter = doc! { "election_id": election_id };
        if let Some(governorate) = governorate {
            filter.insert("governorate", governorate);
        }
        let profiles = self.coll::<CandidateProfile>();
        let total = profiles.count_documents(filter.clone(), None).await?;
        let items = profiles
            .find(filter, page_options(doc! { "created_at": 1 }, skip, limit))
            .await?
            .try_collect()
            .await?;
        Ok((items, total))
    }

    async fn profiles_for_election(&self, election_id: Id) -> Result<Vec<CandidateProfile>> {
        Ok(self
            .coll::<CandidateProfile>()
            .find(doc! { "election_id": election_id }, None)
            .await?
            .try_collect()
            .await?)
    }

    async fn has_participated(&self, user_id: Id, election_id: Id) -> Result<bool> {
        let count = self
            .coll::<Participation>()
            .count_documents(doc! { "user_id": user_id, "election_id": election_id }, None)
            .await?;
        Ok(count > 0)
    }

    async fn record_cast_intent(&self, intent: CastIntent) -> Result<()> {
        match self.coll::<CastIntent>().insert_one(intent, None).await {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key_error(&err) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn has_cast_intent(&self, user_id: Id, election_id: Id) -> Result<bool> {
        let count = self
            .coll::<CastIntent>()
            .count_documents(doc! { "user_id": user_id, "election_id": election_id }, None)
            .await?;
        Ok(count > 0)
    }

    async fn count_cast_intents(&self, election_id: Id) -> Result<u64> {
        Ok(self
            .coll::<CastIntent>()
            .count_documents(doc! { "election_id": election_id }, None)
            .await?)
    }

    async fn commit_ballot(&self, ballot: BallotCommit) -> Result<()> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        if let Err(err) = self.write_ballot(&ballot, &mut session).await {
            if let Err(abort_err) = session.abort_transaction().await {
                warn!("Failed to abort ballot transaction: {abort_err}");
            }
            return Err(conflict_on_duplicate(err, "AlreadyVoted"));
        }

        session.commit_transaction().await?;
        Ok(())
    }

    async fn tally(&self, election_id: Id) -> Result<Tally> {
        let votes = self.coll::<Vote>();
        let choices = self.coll::<VoteChoice>();
        let turnout: Vec<(Governorate, u64)> =
            count_by(&*votes, election_id, "governorate").await?;
        let per_candidate: Vec<(Id, u64)> =
            count_by(&*choices, election_id, "candidate_profile_id").await?;
        Ok(Tally {
            ballots: turnout.iter().map(|(_, count)| count).sum(),
            choices: per_candidate.into_iter().collect(),
            turnout: turnout.into_iter().collect(),
        })
    }

    async fn append_public_log(&self, log: PublicVoteLog) -> Result<()> {
        self.coll::<PublicVoteLog>().insert_one(log, None).await?;
        Ok(())
    }

    async fn public_log(&self, election_id: Id, vote_id: Id) -> Result<Option<PublicVoteLog>> {
        Ok(self
            .coll::<PublicVoteLog>()
            .find_one(doc! { "election_id": election_id, "vote_id": vote_id }, None)
            .await?)
    }

    async fn public_logs_page(
        &self,
        election_id: Id,
        skip: u64,
        limit: u64,
    ) -> Result<(Vec<PublicVoteLog>, u64)> {
        let filter = doc! { "election_id": election_id };
        let logs = self.coll::<PublicVoteLog>();
        let total = logs.count_documents(filter.clone(), None).await?;
        let items = logs
            .find(filter, page_options(doc! { "timestamp": 1, "_id": 1 }, skip, limit))
            .await?
            .try_collect()
            .await?;
        Ok((items, total))
    }

    async fn count_failed_logs(&self, election_id: Id) -> Result<u64> {
        let filter = doc! {
            "election_id": election_id,
            "error_message": { "$type": "string" },
        };
        Ok(self
            .coll::<PublicVoteLog>()
            .count_documents(filter, None)
            .await?)
    }

    async fn append_audit(&self, log: SystemAuditLog) -> Result<()> {
        self.coll::<SystemAuditLog>().insert_one(log, None).await?;
        Ok(())
    }

    async fn audit_logs_page(
        &self,
        filter: &AuditLogFilter,
        skip: u64,
        limit: u64,
    ) -> Result<(Vec<SystemAuditLog>, u64)> {
        let mut query = Document::new();
        if let Some(action) = filter.action {
            query.insert("action", action);
        }
        if let Some(election_id) = filter.election_id {
            query.insert("election_id", election_id);
        }
        if let Some(user_id) = filter.user_id {
            query.insert("user_id", user_id);
        }
        if let Some(text) = filter.filter.as_deref().filter(|text| !text.is_empty()) {
            let pattern = doc! { "$regex": escape_regex(text), "$options": "i" };
            query.insert(
                "$or",
                vec![
                    doc! { "username": pattern.clone() },
                    doc! { "details": pattern },
                ],
            );
        }

        let logs = self.coll::<SystemAuditLog>();
        let total = logs.count_documents(query.clone(), None).await?;
        let items = logs
            .find(query, page_options(doc! { "timestamp": -1, "_id": -1 }, skip, limit))
            .await?
            .try_collect()
            .await?;
        Ok((items, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regex_metacharacters_are_escaped() {
        assert_eq!(escape_regex("a.b*(c)"), r"a\.b\*\(c\)");
        assert_eq!(escape_regex("plain"), "plain");
    }
}
