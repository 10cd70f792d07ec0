use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{common::governorate::Governorate, mongodb::Id};

/// A candidate's nomination for one election. Unique per `(user_id, election_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateProfile {
    #[serde(rename = "_id")]
    pub id: Id,
    pub user_id: Id,
    pub election_id: Id,
    pub full_name: String,
    pub governorate: Governorate,
    pub goals: String,
    pub nomination_reasons: String,
    pub photo_url: Option<String>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl CandidateProfile {
        pub fn example(election_id: Id, governorate: Governorate, n: u32) -> Self {
            Self {
                id: Id::new(),
                user_id: Id::new(),
                election_id,
                full_name: format!("Candidate {n}"),
                governorate,
                goals: "Clean water for every village".to_string(),
                nomination_reasons: "Twenty years of public service".to_string(),
                photo_url: None,
                created_at: Utc::now(),
            }
        }
    }
}
