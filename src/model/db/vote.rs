use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{citizen::Gender, governorate::Governorate},
    mongodb::Id,
};

/// An immutable ballot. Deliberately carries nothing that identifies the voter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    #[serde(rename = "_id")]
    pub id: Id,
    pub election_id: Id,
    pub governorate: Governorate,
    pub voter_age: u32,
    pub voter_gender: Gender,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub timestamp: DateTime<Utc>,
}

/// One selected candidate on a ballot. Unique per `(vote_id, candidate_profile_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteChoice {
    #[serde(rename = "_id")]
    pub id: Id,
    pub vote_id: Id,
    pub election_id: Id,
    pub candidate_profile_id: Id,
}

/// The fact that an account has taken part in an election, with no link to the
/// ballot. Unique per `(user_id, election_id)`; this is the local exactly-once guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participation {
    #[serde(rename = "_id")]
    pub id: Id,
    pub user_id: Id,
    pub election_id: Id,
}

/// Written just before a cast flips the Registry's `voted` flag, while that flag is
/// still clear, and removed when the ballot commits. Unique per `(user_id, election_id)`.
///
/// A leftover intent means the flag was flipped by this election's cast but the ballot
/// never landed, so a retry may commit it. Without one, a set flag is final.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastIntent {
    #[serde(rename = "_id")]
    pub id: Id,
    pub user_id: Id,
    pub election_id: Id,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl CastIntent {
    pub fn new(user_id: Id, election_id: Id) -> Self {
        Self {
            id: Id::new(),
            user_id,
            election_id,
            created_at: Utc::now(),
        }
    }
}
