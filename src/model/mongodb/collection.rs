use std::ops::Deref;

use log::debug;
use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};

use crate::model::db::{
    account::Account,
    candidate::CandidateProfile,
    election::Election,
    logs::{PublicVoteLog, SystemAuditLog},
    registry::{RecordKind, RegistryRecord},
    vote::{CastIntent, Participation, Vote, VoteChoice},
};

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

impl Coll<RegistryRecord> {
    /// Voter and candidate records share a shape but live in separate collections.
    pub fn for_kind(db: &Database, kind: RecordKind) -> Self {
        Self(db.collection(registry_collection(kind)))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// Registry collections
const REGISTRY_VOTERS: &str = "registry_voters";
const REGISTRY_CANDIDATES: &str = "registry_candidates";

pub const fn registry_collection(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Voter => REGISTRY_VOTERS,
        RecordKind::Candidate => REGISTRY_CANDIDATES,
    }
}

// Voting Service collections
impl MongoCollection for Account {
    const NAME: &'static str = "accounts";
}

impl MongoCollection for Election {
    const NAME: &'static str = "elections";
}

impl MongoCollection for CandidateProfile {
    const NAME: &'static str = "candidate_profiles";
}

impl MongoCollection for Vote {
    const NAME: &'static str = "votes";
}

impl MongoCollection for VoteChoice {
    const NAME: &'static str = "vote_choices";
}

impl MongoCollection for Participation {
    const NAME: &'static str = "participations";
}

impl MongoCollection for CastIntent {
    const NAME: &'static str = "cast_intents";
}

impl MongoCollection for PublicVoteLog {
    const NAME: &'static str = "public_vote_logs";
}

impl MongoCollection for SystemAuditLog {
    const NAME: &'static str = "system_audit_logs";
}

fn unique_index(keys: mongodb::bson::Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

/// Ensure that the Registry's indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_registry_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring registry collection indexes exist");

    for kind in [RecordKind::Voter, RecordKind::Candidate] {
        let records = Coll::for_kind(db, kind);
        records
            .create_index(unique_index(doc! {"national_id": 1}), None)
            .await?;
        records
            .create_index(unique_index(doc! {"token": 1}), None)
            .await?;
    }

    Ok(())
}

/// Ensure that the Voting Service's indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_voting_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring voting collection indexes exist");

    let accounts = Coll::<Account>::from_db(db);
    accounts
        .create_index(unique_index(doc! {"username": 1}), None)
        .await?;
    let citizen_index = IndexModel::builder()
        .keys(doc! {"role": 1, "citizen.national_id_hmac": 1})
        .options(
            IndexOptions::builder()
                .unique(true)
                .partial_filter_expression(doc! {"citizen": {"$type": "object"}})
                .build(),
        )
        .build();
    accounts.create_index(citizen_index, None).await?;

    let elections = Coll::<Election>::from_db(db);
    elections
        .create_index(unique_index(doc! {"name": 1}), None)
        .await?;
    let active_index = IndexModel::builder()
        .keys(doc! {"active_slot": 1})
        .options(IndexOptions::builder().unique(true).sparse(true).build())
        .build();
    elections.create_index(active_index, None).await?;

    Coll::<CandidateProfile>::from_db(db)
        .create_index(unique_index(doc! {"user_id": 1, "election_id": 1}), None)
        .await?;

    Coll::<VoteChoice>::from_db(db)
        .create_index(
            unique_index(doc! {"vote_id": 1, "candidate_profile_id": 1}),
            None,
        )
        .await?;

    Coll::<Participation>::from_db(db)
        .create_index(unique_index(doc! {"user_id": 1, "election_id": 1}), None)
        .await?;

    Coll::<CastIntent>::from_db(db)
        .create_index(unique_index(doc! {"user_id": 1, "election_id": 1}), None)
        .await?;

    Coll::<PublicVoteLog>::from_db(db)
        .create_index(
            IndexModel::builder()
                .keys(doc! {"election_id": 1, "vote_id": 1})
                .build(),
            None,
        )
        .await?;

    Ok(())
}
