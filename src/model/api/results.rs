use serde::{Deserialize, Serialize};

use crate::model::{api::id::ApiId, common::governorate::Governorate};

/// Vote total for one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateTotal {
    pub candidate_profile_id: ApiId,
    pub full_name: String,
    pub governorate: Governorate,
    pub votes: u64,
}

/// Ballots cast per governorate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernorateTurnout {
    pub governorate: Governorate,
    pub governorate_name: String,
    pub ballots: u64,
}

/// Results of a completed election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionResults {
    pub election_id: ApiId,
    pub election_name: String,
    pub total_ballots: u64,
    /// Sorted by descending votes, then name.
    pub candidates: Vec<CandidateTotal>,
    pub turnout: Vec<GovernorateTurnout>,
}

/// Ballots recorded versus vote attempts that failed after the Registry flag flipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconciliation {
    pub election_id: ApiId,
    pub ballots: u64,
    pub failed_commits: u64,
    /// Casts that got as far as the Registry but have no ballot yet.
    pub pending_casts: u64,
}
