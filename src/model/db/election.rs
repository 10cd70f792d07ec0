use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{common::election::ElectionStatus, mongodb::Id};

/// Value of `active_slot` on every non-Completed election. A sparse unique index
/// over this field means at most one such election can exist.
pub const ACTIVE_SLOT: i32 = 1;

/// Core election data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionCore {
    /// Unique election name.
    pub name: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub nomination_start: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub nomination_end: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub voting_start: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub voting_end: DateTime<Utc>,
    pub status: ElectionStatus,
    /// Bumped on every transition; transitions are conditional on it.
    pub version: u32,
    /// `Some(ACTIVE_SLOT)` until the election completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_slot: Option<i32>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

/// An election from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Election {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub election: ElectionCore,
}

impl Election {
    /// A fresh `Upcoming` election.
    pub fn new(
        name: String,
        nomination_start: DateTime<Utc>,
        nomination_end: DateTime<Utc>,
        voting_start: DateTime<Utc>,
        voting_end: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Id::new(),
            election: ElectionCore {
                name,
                nomination_start,
                nomination_end,
                voting_start,
                voting_end,
                status: ElectionStatus::Upcoming,
                version: 0,
                active_slot: Some(ACTIVE_SLOT),
                created_at: Utc::now(),
            },
        }
    }

    /// This election after moving to `status`.
    pub fn advanced_to(&self, status: ElectionStatus) -> Self {
        let mut next = self.clone();
        next.status = status;
        next.version += 1;
        next.active_slot = status.is_active().then_some(ACTIVE_SLOT);
        next
    }
}

impl Deref for Election {
    type Target = ElectionCore;

    fn deref(&self) -> &Self::Target {
        &self.election
    }
}

impl DerefMut for Election {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.election
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use chrono::Duration;

    use super::*;

    impl Election {
        pub fn example() -> Self {
            let start = Utc::now() + Duration::days(1);
            Self::new(
                "Parliament 2026".to_string(),
                start,
                start + Duration::days(4),
                start + Duration::days(4),
                start + Duration::days(9),
            )
        }

        /// An example election already in the given phase.
        pub fn example_in(status: ElectionStatus) -> Self {
            let mut election = Self::example();
            while election.status != status {
                let next = election.status.successor().unwrap();
                election = election.advanced_to(next);
            }
            election
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advancing_bumps_version_and_releases_slot() {
        let election = Election::example();
        assert_eq!(election.active_slot, Some(ACTIVE_SLOT));

        let nominating = election.advanced_to(ElectionStatus::Nomination);
        assert_eq!(nominating.version, 1);
        assert_eq!(nominating.active_slot, Some(ACTIVE_SLOT));

        let completed = Election::example_in(ElectionStatus::Completed);
        assert_eq!(completed.version, 4);
        assert_eq!(completed.active_slot, None);
    }
}
