//! Wire types of the Registry's cross-service and management APIs.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{
        citizen::{Gender, NationalId, Token},
        governorate::Governorate,
    },
    db::registry::RegistryRecord,
};

/// Body of every verify and mark-voted call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub national_id: NationalId,
    pub token: Token,
}

/// Body of a mark-registered call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkRegisteredRequest {
    pub national_id: NationalId,
    pub token: Token,
    pub username: String,
}

/// What the Registry tells the Voting Service about a person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationSummary {
    pub national_id: NationalId,
    pub full_name: String,
    pub governorate: Governorate,
    pub birth_date: NaiveDate,
    pub gender: Gender,
    pub eligible: bool,
    pub valid_token: bool,
    pub is_registered: bool,
    pub voted: bool,
}

impl From<&RegistryRecord> for VerificationSummary {
    fn from(record: &RegistryRecord) -> Self {
        Self {
            national_id: record.national_id.clone(),
            full_name: record.full_name.clone(),
            governorate: record.governorate,
            birth_date: record.birth_date,
            gender: record.gender,
            eligible: record.eligible,
            valid_token: record.valid_token,
            is_registered: record.is_registered,
            voted: record.voted,
        }
    }
}

/// Result of the bulk vote-status reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetResult {
    pub reset: u64,
}

/// Admin request to create a Registry record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRecordRequest {
    pub national_id: NationalId,
    pub full_name: String,
    pub governorate: Governorate,
    pub birth_date: NaiveDate,
    pub gender: Gender,
    #[serde(default = "eligible_by_default")]
    pub eligible: bool,
}

fn eligible_by_default() -> bool {
    true
}

/// A token handed out once, on issue or rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub national_id: NationalId,
    pub token: Token,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityUpdate {
    pub eligible: bool,
}
