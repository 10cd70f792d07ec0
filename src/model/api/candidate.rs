use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    api::id::ApiId,
    common::{
        citizen::{NationalId, Token},
        governorate::Governorate,
    },
    db::candidate::CandidateProfile,
};

const MAX_TEXT_LENGTH: usize = 4000;

/// A candidate's nomination for the election currently in its nomination phase.
/// The Registry credentials are re-checked on every nomination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NominationRequest {
    pub national_id: NationalId,
    pub nomination_token: Token,
    pub goals: String,
    pub nomination_reasons: String,
    #[serde(default)]
    pub photo_url: Option<String>,
}

impl NominationRequest {
    pub fn validate(&self) -> Result<()> {
        for (field, text) in [
            ("goals", &self.goals),
            ("nominationReasons", &self.nomination_reasons),
        ] {
            if text.trim().is_empty() {
                return Err(Error::Validation(format!("{field} must not be empty")));
            }
            if text.len() > MAX_TEXT_LENGTH {
                return Err(Error::Validation(format!(
                    "{field} must be at most {MAX_TEXT_LENGTH} bytes"
                )));
            }
        }
        Ok(())
    }
}

/// A candidate profile, as shown to the public.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateDescription {
    pub id: ApiId,
    pub election_id: ApiId,
    pub full_name: String,
    pub governorate: Governorate,
    pub governorate_name: String,
    pub goals: String,
    pub nomination_reasons: String,
    pub photo_url: Option<String>,
    pub nominated_at: DateTime<Utc>,
}

impl From<CandidateProfile> for CandidateDescription {
    fn from(profile: CandidateProfile) -> Self {
        Self {
            id: profile.id.into(),
            election_id: profile.election_id.into(),
            full_name: profile.full_name,
            governorate: profile.governorate,
            governorate_name: profile.governorate.name().to_string(),
            goals: profile.goals,
            nomination_reasons: profile.nomination_reasons,
            photo_url: profile.photo_url,
            nominated_at: profile.created_at,
        }
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl NominationRequest {
        pub fn example(national_id: NationalId, nomination_token: Token) -> Self {
            Self {
                national_id,
                nomination_token,
                goals: "Better schools".to_string(),
                nomination_reasons: "Former headteacher".to_string(),
                photo_url: None,
            }
        }
    }
}
