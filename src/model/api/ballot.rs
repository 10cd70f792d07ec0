use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    api::id::ApiId,
    common::{
        citizen::{NationalId, Token},
        election::CHOICES_PER_BALLOT,
        governorate::Governorate,
    },
    mongodb::Id,
};

/// A voter's ballot submission.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastVoteRequest {
    pub candidate_ids: Vec<ApiId>,
    pub national_id: NationalId,
    pub voting_token: Token,
    pub password: String,
}

impl CastVoteRequest {
    /// Exactly `CHOICES_PER_BALLOT` pairwise-distinct candidate IDs.
    pub fn distinct_choices(&self) -> Result<Vec<Id>> {
        if self.candidate_ids.len() != CHOICES_PER_BALLOT {
            return Err(Error::Validation(format!(
                "A ballot must select exactly {CHOICES_PER_BALLOT} candidates, got {}",
                self.candidate_ids.len()
            )));
        }
        let distinct: HashSet<_> = self.candidate_ids.iter().collect();
        if distinct.len() != self.candidate_ids.len() {
            return Err(Error::Validation(
                "Candidate selections must be distinct".to_string(),
            ));
        }
        Ok(self.candidate_ids.iter().map(|id| Id::from(*id)).collect())
    }
}

/// Returned after a successful cast. Reveals neither the voter nor the selections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteReceipt {
    pub vote_id: ApiId,
    pub election_id: ApiId,
    pub election_name: String,
    pub governorate: Governorate,
    pub governorate_name: String,
    pub timestamp: DateTime<Utc>,
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl CastVoteRequest {
        pub fn example(candidate_ids: &[Id], national_id: NationalId, token: Token) -> Self {
            Self {
                candidate_ids: candidate_ids.iter().map(|id| ApiId::from(*id)).collect(),
                national_id,
                voting_token: token,
                password: "voter-password".to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<Id> {
        (0..n).map(|_| Id::new()).collect()
    }

    #[test]
    fn five_distinct_ids_are_accepted() {
        let request = CastVoteRequest::example(&ids(5), NationalId::example(), Token::example());
        assert_eq!(request.distinct_choices().unwrap().len(), 5);
    }

    #[test]
    fn wrong_count_or_duplicates_are_rejected() {
        for n in [0, 4, 6] {
            let request =
                CastVoteRequest::example(&ids(n), NationalId::example(), Token::example());
            assert!(matches!(
                request.distinct_choices(),
                Err(Error::Validation(_))
            ));
        }

        let mut choices = ids(4);
        choices.push(choices[0]);
        let request = CastVoteRequest::example(&choices, NationalId::example(), Token::example());
        assert!(matches!(
            request.distinct_choices(),
            Err(Error::Validation(_))
        ));
    }
}
