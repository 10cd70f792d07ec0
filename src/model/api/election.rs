use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    api::id::ApiId,
    common::election::ElectionStatus,
    db::election::Election,
};

/// An election specification, as submitted by an administrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionSpec {
    pub name: String,
    pub nomination_start: DateTime<Utc>,
    pub nomination_end: DateTime<Utc>,
    pub voting_start: DateTime<Utc>,
    pub voting_end: DateTime<Utc>,
}

impl ElectionSpec {
    /// Check the name and the schedule
    /// `now < nominationStart < nominationEnd <= votingStart < votingEnd`.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("Election name must not be empty".to_string()));
        }
        if self.nomination_start <= now {
            return Err(Error::Validation(
                "Nomination start must be in the future".to_string(),
            ));
        }
        if self.nomination_start >= self.nomination_end {
            return Err(Error::Validation(
                "Nomination start must be before nomination end".to_string(),
            ));
        }
        if self.nomination_end > self.voting_start {
            return Err(Error::Validation(
                "Voting start must not be before nomination end".to_string(),
            ));
        }
        if self.voting_start >= self.voting_end {
            return Err(Error::Validation(
                "Voting start must be before voting end".to_string(),
            ));
        }
        Ok(())
    }

    /// Convert this spec into a new `Upcoming` election.
    pub fn into_election(self) -> Election {
        Election::new(
            self.name.trim().to_string(),
            self.nomination_start,
            self.nomination_end,
            self.voting_start,
            self.voting_end,
        )
    }
}

/// An election, as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionDescription {
    pub id: ApiId,
    pub name: String,
    pub nomination_start: DateTime<Utc>,
    pub nomination_end: DateTime<Utc>,
    pub voting_start: DateTime<Utc>,
    pub voting_end: DateTime<Utc>,
    pub status: ElectionStatus,
    pub version: u32,
}

impl From<Election> for ElectionDescription {
    fn from(election: Election) -> Self {
        Self {
            id: election.id.into(),
            name: election.election.name,
            nomination_start: election.election.nomination_start,
            nomination_end: election.election.nomination_end,
            voting_start: election.election.voting_start,
            voting_end: election.election.voting_end,
            status: election.election.status,
            version: election.election.version,
        }
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use chrono::Duration;

    use super::*;

    impl ElectionSpec {
        /// Nomination opens tomorrow for four days; voting follows immediately for five.
        pub fn example(now: DateTime<Utc>) -> Self {
            Self {
                name: "Parliament 2026".to_string(),
                nomination_start: now + Duration::days(1),
                nomination_end: now + Duration::days(5),
                voting_start: now + Duration::days(5),
                voting_end: now + Duration::days(10),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use crate::error::ErrorKind;

    use super::*;

    #[test]
    fn valid_schedule_passes() {
        let now = Utc::now();
        assert!(ElectionSpec::example(now).validate(now).is_ok());
    }

    #[test]
    fn voting_before_nomination_end_fails() {
        let now = Utc::now();
        let mut spec = ElectionSpec::example(now);
        spec.voting_start = now + Duration::days(4);
        assert_eq!(spec.validate(now).unwrap_err().kind(), ErrorKind::Validation);
    }

    #[test]
    fn each_ordering_rule_is_enforced() {
        let now = Utc::now();

        let mut spec = ElectionSpec::example(now);
        spec.nomination_start = now;
        assert!(spec.validate(now).is_err());

        let mut spec = ElectionSpec::example(now);
        spec.nomination_end = spec.nomination_start;
        assert!(spec.validate(now).is_err());

        let mut spec = ElectionSpec::example(now);
        spec.voting_end = spec.voting_start;
        assert!(spec.validate(now).is_err());

        let mut spec = ElectionSpec::example(now);
        spec.name = "   ".to_string();
        assert!(spec.validate(now).is_err());
    }
}
