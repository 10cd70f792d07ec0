use std::fmt::{Display, Formatter};

use mongodb::bson::{to_bson, Bson};
use rocket::form::{self, FromFormField, ValueField};
use serde::{Deserialize, Serialize};

/// Kinds of action recorded in the system audit log.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    ElectionCreated,
    NominationStarted,
    PreVotingStarted,
    VotingStarted,
    ElectionCompleted,
    VoterRegistered,
    CandidateRegistered,
    CandidateNominated,
    VoteCast,
    VoteStatusReset,
}

impl ActionType {
    pub const ALL: [ActionType; 10] = [
        Self::ElectionCreated,
        Self::NominationStarted,
        Self::PreVotingStarted,
        Self::VotingStarted,
        Self::ElectionCompleted,
        Self::VoterRegistered,
        Self::CandidateRegistered,
        Self::CandidateNominated,
        Self::VoteCast,
        Self::VoteStatusReset,
    ];

    /// Display text shown to administrators.
    pub const fn display(self) -> &'static str {
        match self {
            Self::ElectionCreated => "Election created",
            Self::NominationStarted => "Nomination started",
            Self::PreVotingStarted => "Pre-voting started",
            Self::VotingStarted => "Voting started",
            Self::ElectionCompleted => "Election completed",
            Self::VoterRegistered => "Voter registered",
            Self::CandidateRegistered => "Candidate registered",
            Self::CandidateNominated => "Candidate nominated",
            Self::VoteCast => "Vote cast",
            Self::VoteStatusReset => "Vote status reset",
        }
    }

    /// Serialised variant name, as used in query strings and documents.
    pub const fn code(self) -> &'static str {
        match self {
            Self::ElectionCreated => "ElectionCreated",
            Self::NominationStarted => "NominationStarted",
            Self::PreVotingStarted => "PreVotingStarted",
            Self::VotingStarted => "VotingStarted",
            Self::ElectionCompleted => "ElectionCompleted",
            Self::VoterRegistered => "VoterRegistered",
            Self::CandidateRegistered => "CandidateRegistered",
            Self::CandidateNominated => "CandidateNominated",
            Self::VoteCast => "VoteCast",
            Self::VoteStatusReset => "VoteStatusReset",
        }
    }
}

impl Display for ActionType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

impl From<ActionType> for Bson {
    fn from(action: ActionType) -> Self {
        to_bson(&action).expect("Serialisation is infallible")
    }
}

#[rocket::async_trait]
impl<'r> FromFormField<'r> for ActionType {
    fn from_value(field: ValueField<'r>) -> form::Result<'r, Self> {
        Self::ALL
            .into_iter()
            .find(|action| action.code() == field.value)
            .ok_or_else(|| form::Error::validation("unknown action type").into())
    }
}

#[cfg(test)]
mod tests {
    use rocket::serde::json::serde_json;

    use super::*;

    #[test]
    fn code_matches_serialised_name() {
        for action in ActionType::ALL {
            let json = serde_json::to_string(&action).unwrap();
            assert_eq!(json, format!("\"{}\"", action.code()));
        }
    }
}
