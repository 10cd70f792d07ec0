use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{audit::ActionType, governorate::Governorate},
    mongodb::Id,
};

/// Anonymised, publicly readable proof that a vote event happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicVoteLog {
    #[serde(rename = "_id")]
    pub id: Id,
    /// Absent when the attempt failed before a ballot existed.
    pub vote_id: Option<Id>,
    pub election_id: Id,
    pub election_name: String,
    pub governorate: Governorate,
    pub governorate_name: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub timestamp: DateTime<Utc>,
    pub error_message: Option<String>,
}

impl PublicVoteLog {
    pub fn success(
        vote_id: Id,
        election_id: Id,
        election_name: String,
        governorate: Governorate,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Id::new(),
            vote_id: Some(vote_id),
            election_id,
            election_name,
            governorate,
            governorate_name: governorate.name().to_string(),
            timestamp,
            error_message: None,
        }
    }

    pub fn failure(
        election_id: Id,
        election_name: String,
        governorate: Governorate,
        error_message: String,
    ) -> Self {
        Self {
            id: Id::new(),
            vote_id: None,
            election_id,
            election_name,
            governorate,
            governorate_name: governorate.name().to_string(),
            timestamp: Utc::now(),
            error_message: Some(error_message),
        }
    }
}

/// Identifying, administrator-only accountability record. Never holds ballot content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemAuditLog {
    #[serde(rename = "_id")]
    pub id: Id,
    pub user_id: Id,
    /// Snapshot at the time of the action.
    pub username: String,
    pub action: ActionType,
    pub election_id: Option<Id>,
    pub election_name: Option<String>,
    pub candidate_profile_id: Option<Id>,
    pub details: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub timestamp: DateTime<Utc>,
}

impl SystemAuditLog {
    pub fn new(user_id: Id, username: impl Into<String>, action: ActionType) -> Self {
        Self {
            id: Id::new(),
            user_id,
            username: username.into(),
            action,
            election_id: None,
            election_name: None,
            candidate_profile_id: None,
            details: String::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn election(mut self, id: Id, name: impl Into<String>) -> Self {
        self.election_id = Some(id);
        self.election_name = Some(name.into());
        self
    }

    pub fn candidate_profile(mut self, id: Id) -> Self {
        self.candidate_profile_id = Some(id);
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}
