use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    api::id::ApiId,
    common::{audit::ActionType, governorate::Governorate},
    db::logs::{PublicVoteLog, SystemAuditLog},
    mongodb::Id,
};

/// Public proof-of-vote entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicVoteLogDescription {
    pub id: ApiId,
    pub vote_id: Option<ApiId>,
    pub election_id: ApiId,
    pub election_name: String,
    pub governorate: Governorate,
    pub governorate_name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<PublicVoteLog> for PublicVoteLogDescription {
    fn from(log: PublicVoteLog) -> Self {
        Self {
            id: log.id.into(),
            vote_id: log.vote_id.map(ApiId::from),
            election_id: log.election_id.into(),
            election_name: log.election_name,
            governorate: log.governorate,
            governorate_name: log.governorate_name,
            timestamp: log.timestamp,
            error_message: log.error_message,
        }
    }
}

/// Administrator view of an audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogDescription {
    pub id: ApiId,
    pub user_id: ApiId,
    pub username: String,
    pub action: ActionType,
    pub action_name: String,
    pub election_id: Option<ApiId>,
    pub election_name: Option<String>,
    pub candidate_profile_id: Option<ApiId>,
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

impl From<SystemAuditLog> for AuditLogDescription {
    fn from(log: SystemAuditLog) -> Self {
        Self {
            id: log.id.into(),
            user_id: log.user_id.into(),
            username: log.username,
            action: log.action,
            action_name: log.action.display().to_string(),
            election_id: log.election_id.map(ApiId::from),
            election_name: log.election_name,
            candidate_profile_id: log.candidate_profile_id.map(ApiId::from),
            details: log.details,
            timestamp: log.timestamp,
        }
    }
}

/// Audit log query. All given criteria must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, FromForm)]
pub struct AuditLogFilter {
    pub action: Option<ActionType>,
    #[field(name = "electionId")]
    pub election_id: Option<Id>,
    #[field(name = "userId")]
    pub user_id: Option<Id>,
    /// Case-insensitive substring of the username or details.
    pub filter: Option<String>,
}

impl AuditLogFilter {
    pub fn matches(&self, log: &SystemAuditLog) -> bool {
        if self.action.map_or(false, |action| action != log.action) {
            return false;
        }
        if self.election_id.is_some() && self.election_id != log.election_id {
            return false;
        }
        if self.user_id.map_or(false, |user| user != log.user_id) {
            return false;
        }
        match self.filter.as_deref().map(str::to_lowercase) {
            Some(needle) if !needle.is_empty() => {
                log.username.to_lowercase().contains(&needle)
                    || log.details.to_lowercase().contains(&needle)
            }
            _ => true,
        }
    }
}
